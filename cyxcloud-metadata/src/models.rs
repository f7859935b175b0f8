//! Data model for the coordinator: files, chunk replicas, nodes and
//! liveness records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use cyxcloud_core::config::num_chunks;

/// A single replica of one chunk of a file, living on one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkReplica {
    pub chunk_index: u32,
    pub node_url: String,
    pub replica_ordinal: u32,
}

/// A file tracked by the coordinator: its size and the set of chunk
/// replicas currently known to exist (live or not — liveness filtering
/// happens at query time, not storage time).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct File {
    pub file_id: String,
    pub size: u64,
    pub timestamp: DateTime<Utc>,
    pub chunks: Vec<ChunkReplica>,
}

impl File {
    pub fn new(file_id: impl Into<String>, size: u64) -> Self {
        Self {
            file_id: file_id.into(),
            size,
            timestamp: Utc::now(),
            chunks: Vec::new(),
        }
    }

    pub fn num_chunks(&self) -> u32 {
        num_chunks(self.size)
    }

    /// Replicas for a given chunk index, in no particular order.
    pub fn replicas_for(&self, chunk_index: u32) -> impl Iterator<Item = &ChunkReplica> {
        self.chunks.iter().filter(move |c| c.chunk_index == chunk_index)
    }

    /// Next unused replica ordinal for a chunk index.
    pub fn next_ordinal(&self, chunk_index: u32) -> u32 {
        self.replicas_for(chunk_index)
            .map(|c| c.replica_ordinal)
            .max()
            .map(|m| m + 1)
            .unwrap_or(0)
    }

    /// Whether `node_url` already holds a replica of `chunk_index`.
    pub fn has_replica(&self, chunk_index: u32, node_url: &str) -> bool {
        self.replicas_for(chunk_index).any(|c| c.node_url == node_url)
    }
}

/// A registered storage node's identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeInfo {
    pub url: String,
    pub id: Option<String>,
    pub registration_time: DateTime<Utc>,
}

/// Capacity/inventory metrics reported on a heartbeat.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HeartbeatReport {
    pub id: String,
    pub url: String,
    pub status: HeartbeatStatus,
    pub timestamp: i64,
    pub inventory: HashMap<String, Vec<u32>>,
    #[serde(rename = "totalChunks")]
    pub total_chunks: u64,
    #[serde(rename = "storageUsedMB")]
    pub storage_used_mb: f64,
    #[serde(rename = "freeSpaceMB")]
    pub free_space_mb: u64,
    #[serde(rename = "canWrite")]
    pub can_write: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HeartbeatStatus {
    Up,
    Shutdown,
}

/// Per-node liveness bookkeeping, owned exclusively by the liveness tracker.
#[derive(Debug, Clone)]
pub struct LivenessRecord {
    pub url: String,
    pub first_seen: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
    pub alive: bool,
    pub total_heartbeats: u64,
    pub downtime: chrono::Duration,
    pub downtime_start: Option<DateTime<Utc>>,
    pub last_inventory: HashMap<String, HashSet<u32>>,
}

impl LivenessRecord {
    pub fn new(url: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            url: url.into(),
            first_seen: now,
            last_heartbeat: now,
            alive: true,
            total_heartbeats: 0,
            downtime: chrono::Duration::zero(),
            downtime_start: None,
            last_inventory: HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_next_ordinal_tracks_max() {
        let mut f = File::new("img1", 1000);
        f.chunks.push(ChunkReplica {
            chunk_index: 0,
            node_url: "http://a".into(),
            replica_ordinal: 0,
        });
        f.chunks.push(ChunkReplica {
            chunk_index: 0,
            node_url: "http://b".into(),
            replica_ordinal: 1,
        });
        assert_eq!(f.next_ordinal(0), 2);
        assert_eq!(f.next_ordinal(1), 0);
    }

    #[test]
    fn file_has_replica() {
        let mut f = File::new("img1", 1000);
        f.chunks.push(ChunkReplica {
            chunk_index: 0,
            node_url: "http://a".into(),
            replica_ordinal: 0,
        });
        assert!(f.has_replica(0, "http://a"));
        assert!(!f.has_replica(0, "http://b"));
        assert!(!f.has_replica(1, "http://a"));
    }
}
