//! Integrity Reconciler: consumes coordinator events and repairs individual
//! chunks the moment tampering or recovery is observed.
//!
//! Unlike the re-replication loop's periodic scan, this reacts immediately
//! to inventory drift on a live node, driven by an event channel rather
//! than polling.

use std::collections::HashSet;
use std::sync::Arc;

use cyxcloud_metadata::{CoordinatorEvent, EventReceiver, File, LivenessTracker, MetadataStore};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::node_client::NodeClient;

/// Key for in-flight dedup: at most one integrity repair per
/// `(fileId, chunkIndex, targetUrl)` at a time.
type RepairKey = (String, u32, String);

pub struct IntegrityReconciler {
    store: Arc<MetadataStore>,
    liveness: Arc<LivenessTracker>,
    node_client: Arc<NodeClient>,
    in_flight: Mutex<HashSet<RepairKey>>,
}

impl IntegrityReconciler {
    pub fn new(
        store: Arc<MetadataStore>,
        liveness: Arc<LivenessTracker>,
        node_client: Arc<NodeClient>,
    ) -> Self {
        Self {
            store,
            liveness,
            node_client,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Spawn the event consumer loop. Runs until `events` closes.
    pub fn spawn(self: Arc<Self>, mut events: EventReceiver) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                self.handle_event(event).await;
            }
        })
    }

    async fn handle_event(&self, event: CoordinatorEvent) {
        match event {
            CoordinatorEvent::InventoryChanged { url, removed } => {
                for (file_id, chunk_index) in removed {
                    self.repair_chunk(&file_id, chunk_index, &url).await;
                }
            }
            CoordinatorEvent::NodeRecovered { url } | CoordinatorEvent::NodeRegistered { url } => {
                self.audit_node(&url).await;
            }
            CoordinatorEvent::NodeDown { url } => {
                // Informational only; the Re-replication Loop handles the
                // resulting under-replication.
                info!(url = %url, "node down, leaving under-replication to the re-replication loop");
            }
        }
    }

    /// Compare the Metadata Store's expectation for `url` against what it
    /// most recently reported, repairing anything it should hold but
    /// doesn't. Both recovery and registration run this audit, since a
    /// node can lose data while the coordinator is down.
    async fn audit_node(&self, url: &str) {
        let reported = self.liveness.record(url).await;
        let files = self.store.list().await;

        for file in &files {
            for replica in file.chunks.iter().filter(|c| c.node_url == url) {
                let has_it = reported
                    .as_ref()
                    .and_then(|r| r.last_inventory.get(&file.file_id))
                    .map(|chunks| chunks.contains(&replica.chunk_index))
                    .unwrap_or(false);
                if !has_it {
                    self.repair_chunk(&file.file_id, replica.chunk_index, url).await;
                }
            }
        }
    }

    /// Repair one chunk on one target node: find a live source that still
    /// verifiably has the chunk, copy it over, and record the new replica.
    async fn repair_chunk(&self, file_id: &str, chunk_index: u32, target_url: &str) {
        let key = (file_id.to_string(), chunk_index, target_url.to_string());
        {
            let mut in_flight = self.in_flight.lock().await;
            if !in_flight.insert(key.clone()) {
                return;
            }
        }

        self.repair_chunk_inner(file_id, chunk_index, target_url).await;

        self.in_flight.lock().await.remove(&key);
    }

    async fn repair_chunk_inner(&self, file_id: &str, chunk_index: u32, target_url: &str) {
        let file = match self.store.get(file_id).await {
            Ok(f) => f,
            Err(e) => {
                warn!(file_id, chunk_index, error = %e, "integrity repair: file not found");
                return;
            }
        };

        let Some(source) = self.find_verified_source(&file, chunk_index, target_url).await else {
            warn!(file_id, chunk_index, target = %target_url, "integrity repair: no verified live source");
            return;
        };

        let data = match self.node_client.read_chunk(&source, file_id, chunk_index).await {
            Ok(d) => d,
            Err(e) => {
                warn!(file_id, chunk_index, source = %source, error = %e, "integrity repair: source read failed");
                return;
            }
        };

        if let Err(e) = self
            .node_client
            .write_chunk(target_url, file_id, chunk_index, &data)
            .await
        {
            warn!(file_id, chunk_index, target = %target_url, error = %e, "integrity repair: target write failed");
            return;
        }

        if !file.has_replica(chunk_index, target_url) {
            let next = file.next_ordinal(chunk_index);
            let target = target_url.to_string();
            let _ = self
                .store
                .update_chunks(file_id, |f| {
                    f.chunks.push(cyxcloud_metadata::ChunkReplica {
                        chunk_index,
                        node_url: target,
                        replica_ordinal: next,
                    });
                })
                .await;
        }

        info!(file_id, chunk_index, target = %target_url, source = %source, "integrity repair complete");
    }

    /// Filter replicas of `chunk_index` to alive nodes other than
    /// `target_url`, then verify each candidate actually has the chunk via
    /// an existence probe — stale metadata can point at a node that also
    /// lost it.
    async fn find_verified_source(
        &self,
        file: &File,
        chunk_index: u32,
        target_url: &str,
    ) -> Option<String> {
        for replica in file.replicas_for(chunk_index) {
            if replica.node_url == target_url {
                continue;
            }
            if !self.liveness.is_alive(&replica.node_url).await {
                continue;
            }
            match self
                .node_client
                .chunk_exists(&replica.node_url, &file.file_id, chunk_index)
                .await
            {
                Ok(true) => return Some(replica.node_url.clone()),
                Ok(false) => continue,
                Err(_) => continue,
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cyxcloud_metadata::{channel, ChunkReplica};

    #[tokio::test]
    async fn node_down_is_informational_only() {
        let store = Arc::new(MetadataStore::in_memory());
        let (tx, rx) = channel();
        let liveness = Arc::new(LivenessTracker::new(tx, std::time::Duration::from_secs(30)));
        let node_client = Arc::new(NodeClient::new(Default::default()));
        let reconciler = Arc::new(IntegrityReconciler::new(store, liveness, node_client));

        reconciler
            .handle_event(CoordinatorEvent::NodeDown {
                url: "http://a".to_string(),
            })
            .await;
        drop(rx);
    }

    #[tokio::test]
    async fn dedup_prevents_concurrent_repair_of_same_key() {
        let store = Arc::new(MetadataStore::in_memory());
        let mut file = File::new("img1", 100);
        file.chunks.push(ChunkReplica {
            chunk_index: 0,
            node_url: "http://a".into(),
            replica_ordinal: 0,
        });
        store.put(file).await.unwrap();

        let (tx, _rx) = channel();
        let liveness = Arc::new(LivenessTracker::new(tx, std::time::Duration::from_secs(30)));
        let node_client = Arc::new(NodeClient::new(Default::default()));
        let reconciler = IntegrityReconciler::new(store, liveness, node_client);

        let key = ("img1".to_string(), 0u32, "http://b".to_string());
        {
            let mut in_flight = reconciler.in_flight.lock().await;
            assert!(in_flight.insert(key.clone()));
            assert!(!in_flight.insert(key));
        }
    }
}
