//! Re-replication Loop and Integrity Reconciler for the coordinator: the
//! background workers that keep every chunk at its target replica count.

pub mod detector;
pub mod executor;
pub mod node_client;
pub mod planner;
pub mod reconciler;

pub use detector::{scan, FileHealth, ScanResult};
pub use executor::{RebalancerStats, ReReplicationLoop};
pub use node_client::{NodeClient, NodeClientConfig, NodeClientError};
pub use planner::{plan_repairs, plan_trims, RepairPlan};
pub use reconciler::IntegrityReconciler;
