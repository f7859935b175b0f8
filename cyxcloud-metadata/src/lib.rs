//! Metadata Store, Node Registry, Liveness Tracker and Placement Planner —
//! the coordinator's source of truth for file/chunk/node/liveness state.

pub mod events;
pub mod liveness;
pub mod models;
pub mod placement;
pub mod registry;
pub mod store;

pub use events::{channel, CoordinatorEvent, EventReceiver, EventSender};
pub use liveness::LivenessTracker;
pub use models::{ChunkReplica, File, HeartbeatReport, HeartbeatStatus, LivenessRecord, NodeInfo};
pub use placement::PlacementPlanner;
pub use registry::NodeRegistry;
pub use store::MetadataStore;
