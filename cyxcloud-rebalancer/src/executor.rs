//! Re-replication Loop: the per-tick repair/trim executor.
//!
//! Scheduling is file-level, bounded by `MAX_CONCURRENT_REPAIRS` concurrent
//! repairs. Each tick dispatches at most one repair task per degraded file,
//! so a single file's chunks never race each other across ticks.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use cyxcloud_core::config::CoordinatorConfig;
use cyxcloud_metadata::{File, LivenessTracker, MetadataStore};
use tokio::sync::{Mutex, Semaphore};
use tokio::time::Instant;
use tracing::{info, instrument, warn};

use crate::detector::scan;
use crate::node_client::NodeClient;
use crate::planner::{plan_repairs, plan_trims};

/// Read-only snapshot of the loop's ambient counters, for the `/stats`
/// endpoint.
#[derive(Debug, Clone, Copy, Default)]
pub struct RebalancerStats {
    pub total_repair_attempts: u64,
    pub total_trim_attempts: u64,
}

/// Drives the Re-replication Loop: scans the Metadata Store every
/// `check_interval`, dispatches bounded-concurrency repair/trim tasks.
///
/// At most one repair or trim task is active per file at a time: a single
/// tick only ever dispatches one task per `file_id`, and the next tick
/// doesn't start until this one's tasks have joined.
pub struct ReReplicationLoop {
    store: Arc<MetadataStore>,
    liveness: Arc<LivenessTracker>,
    node_client: Arc<NodeClient>,
    config: CoordinatorConfig,
    semaphore: Arc<Semaphore>,
    last_repair_time: Mutex<HashMap<String, Instant>>,
    total_repair_attempts: AtomicU64,
    total_trim_attempts: AtomicU64,
}

impl ReReplicationLoop {
    pub fn new(
        store: Arc<MetadataStore>,
        liveness: Arc<LivenessTracker>,
        node_client: Arc<NodeClient>,
        config: CoordinatorConfig,
    ) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent_repairs));
        Self {
            store,
            liveness,
            node_client,
            config,
            semaphore,
            last_repair_time: Mutex::new(HashMap::new()),
            total_repair_attempts: AtomicU64::new(0),
            total_trim_attempts: AtomicU64::new(0),
        }
    }

    /// Snapshot of ambient counters, exposed through the `/stats` endpoint.
    pub fn stats(&self) -> RebalancerStats {
        RebalancerStats {
            total_repair_attempts: self.total_repair_attempts.load(Ordering::Relaxed),
            total_trim_attempts: self.total_trim_attempts.load(Ordering::Relaxed),
        }
    }

    /// Spawn the timer worker running [`Self::tick`] on `check_interval`.
    pub fn spawn(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        let interval = self.config.check_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                self.tick().await;
            }
        })
    }

    /// One scan-and-dispatch pass: repairs degraded files, then trims
    /// over-replicated ones. Repairs for distinct files run concurrently,
    /// bounded by `MAX_CONCURRENT_REPAIRS`.
    #[instrument(skip(self))]
    pub async fn tick(self: &Arc<Self>) {
        let live: Vec<String> = self.liveness.alive_urls().await.into_iter().collect();
        if live.len() < 2 {
            return;
        }

        let files = self.store.list().await;
        let live_set = live.iter().cloned().collect();
        let scan_result = scan(&files, &live_set, self.config.replication_factor);

        let by_id: HashMap<String, File> =
            files.into_iter().map(|f| (f.file_id.clone(), f)).collect();

        let mut repair_handles = Vec::new();
        for health in &scan_result.degraded {
            let Some(file) = by_id.get(&health.file_id).cloned() else {
                continue;
            };
            let this = Arc::clone(self);
            let live = live.clone();
            repair_handles.push(tokio::spawn(async move {
                this.repair_file(file, live).await;
            }));
        }
        for handle in repair_handles {
            let _ = handle.await;
        }

        for health in &scan_result.over_replicated {
            let eligible = {
                let last_repair = self.last_repair_time.lock().await;
                match last_repair.get(&health.file_id) {
                    Some(last) => last.elapsed() >= self.config.cooldown_after_repair,
                    None => true,
                }
            };
            if !eligible {
                continue;
            }
            let Some(file) = by_id.get(&health.file_id).cloned() else {
                continue;
            };
            self.trim_file(file, &live).await;
        }
    }

    /// Repair every under-replicated chunk of `file`, one chunk at a time,
    /// falling back across candidate sources when a read fails.
    async fn repair_file(&self, file: File, live: Vec<String>) {
        let _permit = match self.semaphore.clone().acquire_owned().await {
            Ok(p) => p,
            Err(_) => return,
        };

        let file_id = file.file_id.clone();
        let plans = plan_repairs(&file, &live, self.config.replication_factor);
        if plans.is_empty() {
            return;
        }
        self.total_repair_attempts.fetch_add(1, Ordering::Relaxed);

        for plan in plans {
            let mut read = None;
            for source in &plan.sources {
                match self
                    .node_client
                    .read_chunk(source, &file_id, plan.chunk_index)
                    .await
                {
                    Ok(data) => {
                        read = Some(data);
                        break;
                    }
                    Err(e) => {
                        warn!(
                            file_id = %file_id,
                            chunk_index = plan.chunk_index,
                            source = %source,
                            error = %e,
                            "source read failed during repair, trying next candidate"
                        );
                    }
                }
            }
            let Some(data) = read else {
                warn!(file_id = %file_id, chunk_index = plan.chunk_index, "no live source survived, failing chunk repair");
                continue;
            };

            let mut written_targets = Vec::new();
            for target in &plan.targets {
                match self
                    .node_client
                    .write_chunk(target, &file_id, plan.chunk_index, &data)
                    .await
                {
                    Ok(()) => written_targets.push(target.clone()),
                    Err(e) => warn!(
                        file_id = %file_id,
                        chunk_index = plan.chunk_index,
                        target = %target,
                        error = %e,
                        "target write failed during repair"
                    ),
                }
            }

            if written_targets.is_empty() {
                continue;
            }

            let chunk_index = plan.chunk_index;
            let _ = self
                .store
                .update_chunks(&file_id, |f| {
                    let next = f.next_ordinal(chunk_index);
                    for (offset, target) in written_targets.iter().enumerate() {
                        if !f.has_replica(chunk_index, target) {
                            f.chunks.push(cyxcloud_metadata::ChunkReplica {
                                chunk_index,
                                node_url: target.clone(),
                                replica_ordinal: next + offset as u32,
                            });
                        }
                    }
                })
                .await;
        }

        self.last_repair_time
            .lock()
            .await
            .insert(file_id.clone(), Instant::now());
        info!(file_id = %file_id, "repair tick complete");
    }

    /// Trim excess replicas of `file`, deleting from nodes and updating
    /// metadata, never below `min_replication_factor`.
    async fn trim_file(&self, file: File, live: &[String]) {
        let _permit = match self.semaphore.clone().acquire_owned().await {
            Ok(p) => p,
            Err(_) => return,
        };

        let to_trim = plan_trims(
            &file,
            live,
            self.config.replication_factor,
            self.config.min_replication_factor,
        );
        if to_trim.is_empty() {
            return;
        }
        self.total_trim_attempts.fetch_add(1, Ordering::Relaxed);

        let file_id = file.file_id.clone();
        for replica in &to_trim {
            if let Err(e) = self
                .node_client
                .delete_chunk(&replica.node_url, &file_id, replica.chunk_index)
                .await
            {
                warn!(
                    file_id = %file_id,
                    chunk_index = replica.chunk_index,
                    node = %replica.node_url,
                    error = %e,
                    "trim delete failed"
                );
            }
        }

        let trimmed: std::collections::HashSet<(u32, String)> = to_trim
            .iter()
            .map(|r| (r.chunk_index, r.node_url.clone()))
            .collect();
        let _ = self
            .store
            .update_chunks(&file_id, |f| {
                f.chunks
                    .retain(|r| !trimmed.contains(&(r.chunk_index, r.node_url.clone())));
            })
            .await;

        info!(file_id = %file_id, trimmed = to_trim.len(), "trim tick complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cyxcloud_metadata::{ChunkReplica, HeartbeatReport, HeartbeatStatus};
    use std::time::Duration;

    async fn registered_liveness(urls: &[&str]) -> LivenessTracker {
        let (tx, _rx) = cyxcloud_metadata::channel();
        let tracker = LivenessTracker::new(tx, Duration::from_secs(30));
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
    async fn tick_skips_when_too_few_live_nodes() {
        let store = Arc::new(MetadataStore::in_memory());
        let liveness = Arc::new(registered_liveness(&["http://a"]).await);
        let node_client = Arc::new(NodeClient::new(Default::default()));
        let mut config = CoordinatorConfig::default();
        config.check_interval = Duration::from_secs(3600);

        let loop_ = Arc::new(ReReplicationLoop::new(store.clone(), liveness, node_client, config));
        loop_.tick().await;
        assert!(store.list().await.is_empty());
    }

    #[tokio::test]
    async fn trim_file_removes_excess_and_updates_metadata() {
        let store = Arc::new(MetadataStore::in_memory());
        let mut file = File::new("img1", 100);
        for (idx, url) in ["http://a", "http://b", "http://c", "http://d", "http://e"]
            .iter()
            .enumerate()
        {
            file.chunks.push(ChunkReplica {
                chunk_index: 0,
                node_url: url.to_string(),
                replica_ordinal: idx as u32,
            });
        }
        store.put(file.clone()).await.unwrap();

        let liveness = Arc::new(
            registered_liveness(&["http://a", "http://b", "http://c", "http://d", "http://e"])
                .await,
        );
        let node_client = Arc::new(NodeClient::new(Default::default()));
        let config = CoordinatorConfig::default();
        let loop_ = ReReplicationLoop::new(store.clone(), liveness, node_client, config);

        let live = vec![
            "http://a".to_string(),
            "http://b".to_string(),
            "http://c".to_string(),
            "http://d".to_string(),
            "http://e".to_string(),
        ];
        loop_.trim_file(file, &live).await;

        let got = store.get("img1").await.unwrap();
        assert_eq!(got.chunks.len(), 3);
        assert_eq!(loop_.stats().total_trim_attempts, 1);
    }

    #[tokio::test]
    async fn repair_file_increments_attempt_counter() {
        let store = Arc::new(MetadataStore::in_memory());
        let mut file = File::new("img1", 100);
        file.chunks.push(ChunkReplica {
            chunk_index: 0,
            node_url: "http://a".to_string(),
            replica_ordinal: 0,
        });
        store.put(file.clone()).await.unwrap();

        let liveness = Arc::new(registered_liveness(&["http://a", "http://b", "http://c"]).await);
        let node_client = Arc::new(NodeClient::new(Default::default()));
        let config = CoordinatorConfig::default();
        let loop_ = ReReplicationLoop::new(store, liveness, node_client, config);

        let live = vec!["http://a".to_string(), "http://b".to_string(), "http://c".to_string()];
        loop_.repair_file(file, live).await;

        assert_eq!(loop_.stats().total_repair_attempts, 1);
    }
}
