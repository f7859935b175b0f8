//! Source/target selection for a single chunk's repair, and excess-replica
//! selection for trim.
//!
//! Source selection takes the first live candidate rather than scoring by
//! load or locality — repair concurrency is already bounded by
//! `MAX_CONCURRENT_REPAIRS`, so picking an optimal source isn't necessary
//! to keep the repair path bounded.

use std::collections::HashSet;

use cyxcloud_metadata::{ChunkReplica, File};

/// A chunk's candidate sources to try in order, and which live nodes are
/// eligible repair targets.
pub struct RepairPlan {
    pub chunk_index: u32,
    pub sources: Vec<String>,
    pub targets: Vec<String>,
}

/// Plan repairs for every under-replicated chunk of `file`, given the live
/// node set. Chunks with no live source are skipped; the file continues
/// with its next chunk.
pub fn plan_repairs(file: &File, live: &[String], replication_factor: usize) -> Vec<RepairPlan> {
    let live_set: HashSet<&str> = live.iter().map(String::as_str).collect();
    let mut plans = Vec::new();

    for chunk_index in 0..file.num_chunks() {
        let live_replicas: Vec<&ChunkReplica> = file
            .replicas_for(chunk_index)
            .filter(|r| live_set.contains(r.node_url.as_str()))
            .collect();

        let missing = replication_factor.saturating_sub(live_replicas.len());
        if missing == 0 {
            continue;
        }
        if live_replicas.is_empty() {
            continue;
        }
        let sources: Vec<String> = live_replicas.iter().map(|r| r.node_url.clone()).collect();

        let holding: HashSet<&str> = live_replicas.iter().map(|r| r.node_url.as_str()).collect();
        let targets: Vec<String> = live
            .iter()
            .filter(|url| !holding.contains(url.as_str()))
            .take(missing)
            .cloned()
            .collect();

        if targets.is_empty() {
            continue;
        }

        plans.push(RepairPlan {
            chunk_index,
            sources,
            targets,
        });
    }

    plans
}

/// Excess replicas to remove for each over-replicated chunk, keeping the
/// lowest `replica_ordinal` values and never trimming below
/// `min_replication_factor`.
pub fn plan_trims(
    file: &File,
    live: &[String],
    replication_factor: usize,
    min_replication_factor: usize,
) -> Vec<ChunkReplica> {
    let live_set: HashSet<&str> = live.iter().map(String::as_str).collect();
    let mut to_trim = Vec::new();

    for chunk_index in 0..file.num_chunks() {
        let mut live_replicas: Vec<&ChunkReplica> = file
            .replicas_for(chunk_index)
            .filter(|r| live_set.contains(r.node_url.as_str()))
            .collect();

        if live_replicas.len() <= replication_factor || live_replicas.len() < min_replication_factor
        {
            continue;
        }

        live_replicas.sort_by_key(|r| r.replica_ordinal);
        let excess = live_replicas.len() - replication_factor;
        for replica in live_replicas.into_iter().rev().take(excess) {
            to_trim.push((*replica).clone());
        }
    }

    to_trim
}

#[cfg(test)]
mod tests {
    use super::*;
    use cyxcloud_metadata::ChunkReplica;

    fn file_with(file_id: &str, replicas: Vec<(u32, &str, u32)>) -> File {
        let mut f = File::new(file_id, 100);
        for (chunk_index, node_url, ordinal) in replicas {
            f.chunks.push(ChunkReplica {
                chunk_index,
                node_url: node_url.to_string(),
                replica_ordinal: ordinal,
            });
        }
        f
    }

    #[test]
    fn plans_repair_for_missing_replicas() {
        let file = file_with("img1", vec![(0, "http://a", 0)]);
        let live = vec!["http://a".into(), "http://b".into(), "http://c".into()];
        let plans = plan_repairs(&file, &live, 3);
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].sources, vec!["http://a".to_string()]);
        assert_eq!(plans[0].targets.len(), 2);
    }

    #[test]
    fn skips_chunk_with_no_live_source() {
        let file = file_with("img1", vec![(0, "http://dead", 0)]);
        let live = vec!["http://b".into(), "http://c".into()];
        let plans = plan_repairs(&file, &live, 3);
        assert!(plans.is_empty());
    }

    #[test]
    fn trim_keeps_lowest_ordinals() {
        let file = file_with(
            "img1",
            vec![
                (0, "http://a", 0),
                (0, "http://b", 1),
                (0, "http://c", 2),
                (0, "http://d", 3),
                (0, "http://e", 4),
            ],
        );
        let live = vec![
            "http://a".into(),
            "http://b".into(),
            "http://c".into(),
            "http://d".into(),
            "http://e".into(),
        ];
        let trims = plan_trims(&file, &live, 3, 2);
        assert_eq!(trims.len(), 2);
        let trimmed_ordinals: HashSet<u32> = trims.iter().map(|r| r.replica_ordinal).collect();
        assert_eq!(trimmed_ordinals, [3, 4].into_iter().collect());
    }

    #[test]
    fn trim_never_drops_below_floor() {
        let file = file_with("img1", vec![(0, "http://a", 0), (0, "http://b", 1)]);
        let live = vec!["http://a".into(), "http://b".into()];
        let trims = plan_trims(&file, &live, 3, 2);
        assert!(trims.is_empty());
    }
}
