//! Shared application state: an `Arc` of every component the HTTP handlers
//! and background workers need.

use std::sync::Arc;

use cyxcloud_core::CoordinatorConfig;
use cyxcloud_metadata::{EventSender, LivenessTracker, MetadataStore, NodeRegistry, PlacementPlanner};
use cyxcloud_rebalancer::{IntegrityReconciler, NodeClient, ReReplicationLoop};

pub struct AppState {
    pub store: Arc<MetadataStore>,
    pub registry: Arc<NodeRegistry>,
    pub liveness: Arc<LivenessTracker>,
    pub placement: Arc<PlacementPlanner>,
    pub node_client: Arc<NodeClient>,
    pub re_replication: Arc<ReReplicationLoop>,
    pub reconciler: Arc<IntegrityReconciler>,
    pub events: EventSender,
    pub config: CoordinatorConfig,
}

impl AppState {
    /// Wire up every component from a fresh `CoordinatorConfig`, opening the
    /// Metadata Store from `config.metadata_dir`.
    pub async fn new(config: CoordinatorConfig) -> cyxcloud_core::Result<Self> {
        let store = Arc::new(MetadataStore::open(&config.metadata_dir).await?);
        let (events, event_rx) = cyxcloud_metadata::channel();
        let registry = Arc::new(NodeRegistry::new(events.clone()));
        let liveness = Arc::new(LivenessTracker::new(events.clone(), config.heartbeat_timeout));
        let placement = Arc::new(PlacementPlanner::new(
            store.clone(),
            liveness.clone(),
            config.replication_factor,
            config.min_replicas,
        ));

        let node_client = Arc::new(NodeClient::new(cyxcloud_rebalancer::NodeClientConfig {
            connect_timeout: config.node_connect_timeout,
            read_timeout: config.node_read_timeout,
        }));

        let re_replication = Arc::new(ReReplicationLoop::new(
            store.clone(),
            liveness.clone(),
            node_client.clone(),
            config.clone(),
        ));

        let reconciler = Arc::new(IntegrityReconciler::new(
            store.clone(),
            liveness.clone(),
            node_client.clone(),
        ));
        reconciler.clone().spawn(event_rx);

        Ok(Self {
            store,
            registry,
            liveness,
            placement,
            node_client,
            re_replication,
            reconciler,
            events,
            config,
        })
    }

    /// Spawn the timer workers (liveness timeout sweep, re-replication
    /// loop). Returns their join handles so the caller can hold them for
    /// graceful shutdown.
    pub fn spawn_background_workers(self: &Arc<Self>) -> Vec<tokio::task::JoinHandle<()>> {
        vec![
            self.liveness.clone().spawn_timeout_loop(self.config.cleanup_interval),
            self.re_replication.clone().spawn(),
        ]
    }
}
