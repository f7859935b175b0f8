//! Tunable constants for the coordinator, overridable via environment
//! variables following the same `VAR.ok().and_then(|v| v.parse().ok())`
//! pattern used throughout the rebalancer's own configuration.

use std::time::Duration;

/// Fixed chunk size: every file is split into `ceil(size / CHUNK_SIZE)` chunks.
pub const CHUNK_SIZE: u64 = 32 * 1024;

/// Default target number of live replicas per chunk.
pub const DEFAULT_REPLICATION_FACTOR: usize = 3;

/// Minimum number of replicas a plan will ever settle for.
pub const DEFAULT_MIN_REPLICAS: usize = 1;

/// Trim never reduces a chunk's live replica count below this floor.
pub const DEFAULT_MIN_REPLICATION_FACTOR: usize = 2;

/// Returns `ceil(size / CHUNK_SIZE)`, with a zero-byte file still occupying
/// one chunk.
pub fn num_chunks(size: u64) -> u32 {
    if size == 0 {
        return 1;
    }
    ((size + CHUNK_SIZE - 1) / CHUNK_SIZE) as u32
}

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub replication_factor: usize,
    pub min_replicas: usize,
    pub min_replication_factor: usize,
    pub check_interval: Duration,
    pub max_concurrent_repairs: usize,
    pub cooldown_after_repair: Duration,
    pub heartbeat_timeout: Duration,
    pub cleanup_interval: Duration,
    pub node_connect_timeout: Duration,
    pub node_read_timeout: Duration,
    pub metadata_dir: String,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            replication_factor: DEFAULT_REPLICATION_FACTOR,
            min_replicas: DEFAULT_MIN_REPLICAS,
            min_replication_factor: DEFAULT_MIN_REPLICATION_FACTOR,
            check_interval: Duration::from_secs(30),
            max_concurrent_repairs: 2,
            cooldown_after_repair: Duration::from_secs(60),
            heartbeat_timeout: Duration::from_secs(30),
            cleanup_interval: Duration::from_secs(10),
            node_connect_timeout: Duration::from_secs(5),
            node_read_timeout: Duration::from_secs(12),
            metadata_dir: "./metadata".to_string(),
        }
    }
}

impl CoordinatorConfig {
    /// Build a configuration from environment variables, falling back to
    /// [`CoordinatorConfig::default`] for anything unset or unparsable.
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            replication_factor: env_usize("REPLICATION_FACTOR", default.replication_factor),
            min_replicas: env_usize("MIN_REPLICAS", default.min_replicas),
            min_replication_factor: env_usize(
                "MIN_REPLICATION_FACTOR",
                default.min_replication_factor,
            ),
            check_interval: env_secs("CHECK_INTERVAL_SECS", default.check_interval),
            max_concurrent_repairs: env_usize(
                "MAX_CONCURRENT_REPAIRS",
                default.max_concurrent_repairs,
            ),
            cooldown_after_repair: env_secs(
                "COOLDOWN_AFTER_REPAIR_SECS",
                default.cooldown_after_repair,
            ),
            heartbeat_timeout: env_secs("HEARTBEAT_TIMEOUT_SECS", default.heartbeat_timeout),
            cleanup_interval: env_secs("CLEANUP_INTERVAL_SECS", default.cleanup_interval),
            node_connect_timeout: env_secs(
                "NODE_CONNECT_TIMEOUT_SECS",
                default.node_connect_timeout,
            ),
            node_read_timeout: env_secs("NODE_READ_TIMEOUT_SECS", default.node_read_timeout),
            metadata_dir: std::env::var("METADATA_DIR").unwrap_or(default.metadata_dir),
        }
    }
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_secs(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}
