//! Error types for the coordinator core.
//!
//! Provides a single unified error type for the Metadata Store, Node
//! Registry, Liveness Tracker, Placement Planner, Re-replication Loop and
//! Integrity Reconciler.

use thiserror::Error;

/// Result type alias for coordinator operations.
pub type Result<T> = std::result::Result<T, CoordinatorError>;

/// Unified error type for the coordinator.
#[derive(Error, Debug)]
pub enum CoordinatorError {
    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("node not found: {0}")]
    NodeNotFound(String),

    #[error("no capacity: {alive} alive node(s), need at least {required}")]
    NoCapacity { alive: usize, required: usize },

    #[error("chunk {chunk_index} of file {file_id} has no live replica")]
    DataUnavailable { file_id: String, chunk_index: u32 },

    #[error("validation error: {0}")]
    Validation(String),

    #[error("node {url} returned a transient error: {reason}")]
    TransientNode { url: String, reason: String },

    #[error("failed to persist metadata: {0}")]
    Persistence(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl CoordinatorError {
    /// Whether this error should be absorbed and retried against a sibling
    /// replica rather than propagated to the caller.
    pub fn is_transient(&self) -> bool {
        matches!(self, CoordinatorError::TransientNode { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_capacity_message() {
        let err = CoordinatorError::NoCapacity {
            alive: 0,
            required: 1,
        };
        assert_eq!(
            err.to_string(),
            "no capacity: 0 alive node(s), need at least 1"
        );
    }

    #[test]
    fn transient_is_retryable() {
        let err = CoordinatorError::TransientNode {
            url: "http://n1".into(),
            reason: "timeout".into(),
        };
        assert!(err.is_transient());
        assert!(!CoordinatorError::FileNotFound("f1".into()).is_transient());
    }
}
