//! Event bus connecting the Liveness Tracker to the Integrity Reconciler
//! and the Re-replication Loop without either owning a reference to the
//! other.

use std::collections::HashSet;
use tokio::sync::mpsc;

/// Emitted by the Liveness Tracker; consumed by the Integrity Reconciler.
#[derive(Debug, Clone)]
pub enum CoordinatorEvent {
    NodeRegistered { url: String },
    NodeRecovered { url: String },
    NodeDown { url: String },
    InventoryChanged {
        url: String,
        removed: HashSet<(String, u32)>,
    },
}

pub type EventSender = mpsc::UnboundedSender<CoordinatorEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<CoordinatorEvent>;

/// Create a fresh event channel; the sender is handed to every producer
/// (registry, liveness tracker), the receiver to the single reconciler
/// consumer task.
pub fn channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}
