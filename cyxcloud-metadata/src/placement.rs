//! Placement Planner: selects replica targets for new writes and filters
//! placement for reads by liveness.
//!
//! Selection is a uniform random shuffle of the live node set, truncated to
//! the target replica count. This avoids hot-spotting any particular node
//! and keeps replica placement unpredictable to a client.

use std::sync::Arc;

use cyxcloud_core::config::num_chunks;
use cyxcloud_core::error::{CoordinatorError, Result};
use rand::seq::SliceRandom;
use tracing::{info, warn};

use crate::liveness::LivenessTracker;
use crate::models::{ChunkReplica, File};
use crate::store::MetadataStore;

pub struct PlacementPlanner {
    store: Arc<MetadataStore>,
    liveness: Arc<LivenessTracker>,
    replication_factor: usize,
    min_replicas: usize,
}

impl PlacementPlanner {
    pub fn new(
        store: Arc<MetadataStore>,
        liveness: Arc<LivenessTracker>,
        replication_factor: usize,
        min_replicas: usize,
    ) -> Self {
        Self {
            store,
            liveness,
            replication_factor,
            min_replicas,
        }
    }

    /// Plan chunk placement for a new upload of `size` bytes.
    pub async fn plan_upload(&self, file_id: &str, size: u64) -> Result<File> {
        let mut live = self.liveness.alive_urls().await;
        if live.is_empty() {
            return Err(CoordinatorError::NoCapacity {
                alive: 0,
                required: self.min_replicas,
            });
        }

        let target = self.replication_factor.min(live.len());
        if target < self.min_replicas {
            return Err(CoordinatorError::NoCapacity {
                alive: live.len(),
                required: self.min_replicas,
            });
        }
        if target < self.replication_factor {
            warn!(
                file_id,
                alive = live.len(),
                target,
                "planning upload in degraded mode (fewer than the replication factor of live nodes)"
            );
        }

        let mut file = File::new(file_id, size);
        let num_chunks = num_chunks(size);
        let mut rng = rand::thread_rng();
        for chunk_index in 0..num_chunks {
            live.shuffle(&mut rng);
            for (ordinal, url) in live.iter().take(target).enumerate() {
                file.chunks.push(ChunkReplica {
                    chunk_index,
                    node_url: url.clone(),
                    replica_ordinal: ordinal as u32,
                });
            }
        }

        self.store.put(file.clone()).await?;
        info!(file_id, num_chunks, replicas_per_chunk = target, "planned upload");
        Ok(file)
    }

    /// Fetch a file's metadata and drop replicas on dead nodes.
    pub async fn filter_for_read(&self, file_id: &str) -> Result<File> {
        let file = self.store.get(file_id).await?;
        let mut filtered = file.clone();
        let mut kept = Vec::with_capacity(filtered.chunks.len());
        for replica in filtered.chunks {
            if self.liveness.is_alive(&replica.node_url).await {
                kept.push(replica);
            }
        }
        filtered.chunks = kept;

        for chunk_index in 0..filtered.num_chunks() {
            if filtered.replicas_for(chunk_index).next().is_none() {
                return Err(CoordinatorError::DataUnavailable {
                    file_id: file_id.to_string(),
                    chunk_index,
                });
            }
        }
        Ok(filtered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::channel;
    use crate::models::{HeartbeatReport, HeartbeatStatus};
    use std::collections::HashMap;
    use std::time::Duration;

    async fn alive_tracker(urls: &[&str]) -> Arc<LivenessTracker> {
        let (tx, _rx) = channel();
        let tracker = Arc::new(LivenessTracker::new(tx, Duration::from_secs(30)));
        for url in urls {
            tracker
                .heartbeat(HeartbeatReport {
                    id: url.to_string(),
                    url: url.to_string(),
                    status: HeartbeatStatus::Up,
                    timestamp: 0,
                    inventory: HashMap::new(),
                    total_chunks: 0,
                    storage_used_mb: 0.0,
                    free_space_mb: 0,
                    can_write: true,
                })
                .await
                .unwrap();
        }
        tracker
    }

    #[tokio::test]
    async fn plan_upload_spans_distinct_nodes() {
        let store = Arc::new(MetadataStore::in_memory());
        let liveness = alive_tracker(&["http://a", "http://b", "http://c", "http://d"]).await;
        let planner = PlacementPlanner::new(store, liveness, 3, 1);
        let file = planner.plan_upload("img1", 70_000).await.unwrap();
        assert_eq!(file.num_chunks(), 3);
        for chunk_index in 0..file.num_chunks() {
            let urls: std::collections::HashSet<_> =
                file.replicas_for(chunk_index).map(|r| &r.node_url).collect();
            assert_eq!(urls.len(), 3);
        }
    }

    #[tokio::test]
    async fn plan_upload_degrades_below_replication_factor() {
        let store = Arc::new(MetadataStore::in_memory());
        let liveness = alive_tracker(&["http://a", "http://b"]).await;
        let planner = PlacementPlanner::new(store, liveness, 3, 1);
        let file = planner.plan_upload("img2", 1000).await.unwrap();
        assert_eq!(file.num_chunks(), 1);
        assert_eq!(file.replicas_for(0).count(), 2);
    }

    #[tokio::test]
    async fn plan_upload_fails_with_no_live_nodes() {
        let store = Arc::new(MetadataStore::in_memory());
        let liveness = alive_tracker(&[]).await;
        let planner = PlacementPlanner::new(store, liveness, 3, 1);
        let err = planner.plan_upload("img3", 100).await.unwrap_err();
        assert!(matches!(err, CoordinatorError::NoCapacity { .. }));
    }

    #[tokio::test]
    async fn filter_for_read_drops_dead_replicas() {
        let store = Arc::new(MetadataStore::in_memory());
        let liveness = alive_tracker(&["http://a", "http://b", "http://c"]).await;
        let planner = PlacementPlanner::new(store.clone(), liveness.clone(), 3, 1);
        planner.plan_upload("img1", 70_000).await.unwrap();

        // Mark http://a dead by letting it time out.
        liveness.detect_timeouts().await; // no-op, still fresh
        // Simulate death directly via shutdown heartbeat.
        liveness
            .heartbeat(HeartbeatReport {
                id: "http://a".into(),
                url: "http://a".into(),
                status: HeartbeatStatus::Shutdown,
                timestamp: 0,
                inventory: HashMap::new(),
                total_chunks: 0,
                storage_used_mb: 0.0,
                free_space_mb: 0,
                can_write: true,
            })
            .await
            .unwrap();

        let filtered = planner.filter_for_read("img1").await.unwrap();
        for chunk_index in 0..filtered.num_chunks() {
            assert!(!filtered.replicas_for(chunk_index).any(|r| r.node_url == "http://a"));
            assert!(filtered.replicas_for(chunk_index).count() >= 1);
        }
    }

    #[tokio::test]
    async fn filter_for_read_fails_when_chunk_fully_dead() {
        let store = Arc::new(MetadataStore::in_memory());
        let liveness = alive_tracker(&["http://a"]).await;
        let planner = PlacementPlanner::new(store.clone(), liveness.clone(), 3, 1);
        planner.plan_upload("img1", 100).await.unwrap();

        liveness
            .heartbeat(HeartbeatReport {
                id: "http://a".into(),
                url: "http://a".into(),
                status: HeartbeatStatus::Shutdown,
                timestamp: 0,
                inventory: HashMap::new(),
                total_chunks: 0,
                storage_used_mb: 0.0,
                free_space_mb: 0,
                can_write: true,
            })
            .await
            .unwrap();

        let err = planner.filter_for_read("img1").await.unwrap_err();
        assert!(matches!(err, CoordinatorError::DataUnavailable { .. }));
    }
}
