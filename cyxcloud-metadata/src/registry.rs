//! Node Registry: the set of nodes the coordinator knows about.

use std::collections::HashMap;

use chrono::Utc;
use cyxcloud_core::error::{CoordinatorError, Result};
use tokio::sync::RwLock;
use tracing::info;

use crate::events::{CoordinatorEvent, EventSender};
use crate::models::NodeInfo;

pub struct NodeRegistry {
    nodes: RwLock<HashMap<String, NodeInfo>>,
    events: EventSender,
}

impl NodeRegistry {
    pub fn new(events: EventSender) -> Self {
        Self {
            nodes: RwLock::new(HashMap::new()),
            events,
        }
    }

    /// Register (or re-register) a node. Re-registration refreshes the
    /// identity and always emits `NodeRegistered` so the Integrity
    /// Reconciler can audit a node that may have been tampered with while
    /// the coordinator was down.
    pub async fn register(&self, url: &str, id: Option<String>) -> Result<()> {
        if url.trim().is_empty() {
            return Err(CoordinatorError::Validation("url must not be empty".into()));
        }
        let mut guard = self.nodes.write().await;
        let is_new = !guard.contains_key(url);
        guard.insert(
            url.to_string(),
            NodeInfo {
                url: url.to_string(),
                id,
                registration_time: Utc::now(),
            },
        );
        drop(guard);

        info!(url, is_new, "node registered");
        let _ = self.events.send(CoordinatorEvent::NodeRegistered {
            url: url.to_string(),
        });
        Ok(())
    }

    pub async fn unregister(&self, url: &str) -> bool {
        let removed = self.nodes.write().await.remove(url).is_some();
        if removed {
            info!(url, "node unregistered");
        }
        removed
    }

    pub async fn list(&self) -> Vec<NodeInfo> {
        self.nodes.read().await.values().cloned().collect()
    }

    pub async fn is_registered(&self, url: &str) -> bool {
        self.nodes.read().await.contains_key(url)
    }
}
