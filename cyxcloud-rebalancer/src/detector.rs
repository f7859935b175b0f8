//! Per-tick scan of all files, partitioning into degraded and
//! over-replicated sets.
//!
//! Filesystem tampering that silently drops a chunk on an otherwise-live
//! node is handled by the Integrity Reconciler, not this scan loop; this
//! module only tracks the two categories the re-replication loop acts on.

use std::collections::HashSet;

use cyxcloud_metadata::File;

/// Health of a single file with respect to the live node set.
#[derive(Debug, Clone)]
pub struct FileHealth {
    pub file_id: String,
    pub min_replicas: usize,
    pub max_replicas: usize,
    /// Chunk indices with fewer than `replication_factor` live replicas.
    pub chunks_needing_repair: Vec<u32>,
    /// Chunk indices with more than `replication_factor` live replicas.
    pub chunks_over_replicated: Vec<u32>,
}

#[derive(Debug, Default)]
pub struct ScanResult {
    pub degraded: Vec<FileHealth>,
    pub over_replicated: Vec<FileHealth>,
}

/// Compute the live-replica health of every file.
pub fn scan(files: &[File], live: &HashSet<String>, replication_factor: usize) -> ScanResult {
    let mut result = ScanResult::default();

    for file in files {
        let num_chunks = file.num_chunks();
        let mut min_replicas = usize::MAX;
        let mut max_replicas = 0usize;
        let mut needing_repair = Vec::new();
        let mut over_replicated = Vec::new();

        for chunk_index in 0..num_chunks {
            let live_count = file
                .replicas_for(chunk_index)
                .filter(|r| live.contains(&r.node_url))
                .count();
            min_replicas = min_replicas.min(live_count);
            max_replicas = max_replicas.max(live_count);

            if live_count < replication_factor {
                needing_repair.push(chunk_index);
            }
            if live_count > replication_factor + 1 {
                over_replicated.push(chunk_index);
            }
        }
        if num_chunks == 0 {
            min_replicas = 0;
        }

        let health = FileHealth {
            file_id: file.file_id.clone(),
            min_replicas,
            max_replicas,
            chunks_needing_repair: needing_repair,
            chunks_over_replicated: over_replicated,
        };

        if !health.chunks_needing_repair.is_empty() {
            result.degraded.push(health.clone());
        }
        if !health.chunks_over_replicated.is_empty() {
            result.over_replicated.push(health);
        }
    }

    // Fewest-replicas-first, so the most at-risk files repair first.
    result.degraded.sort_by_key(|h| h.min_replicas);

    result
}
