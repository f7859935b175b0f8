//! Metadata Store: the coordinator's exclusive owner of `File` and
//! `ChunkReplica` records.
//!
//! Backed by an in-memory map guarded by a single `RwLock`, snapshotted to
//! disk on every mutation using write-temp-then-atomic-rename so readers
//! never observe a torn file. The snapshot write runs while the write lock
//! is still held, so persisted state always reflects mutations in the same
//! order they were applied in memory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use cyxcloud_core::error::{CoordinatorError, Result};
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::models::File;

const SNAPSHOT_FILE: &str = "files.json";

pub struct MetadataStore {
    files: RwLock<HashMap<String, File>>,
    snapshot_path: PathBuf,
}

impl MetadataStore {
    /// Load the store from `dir/files.json` if present. A missing
    /// directory or file starts empty; a present-but-malformed file is
    /// fatal — the process refuses to start rather than silently
    /// discarding an inconsistent map.
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        tokio::fs::create_dir_all(dir).await?;
        let snapshot_path = dir.join(SNAPSHOT_FILE);

        let files = if snapshot_path.exists() {
            let raw = tokio::fs::read(&snapshot_path).await?;
            if raw.is_empty() {
                HashMap::new()
            } else {
                serde_json::from_slice(&raw).map_err(|e| {
                    error!(error = %e, path = %snapshot_path.display(), "malformed metadata snapshot at startup");
                    CoordinatorError::Persistence(format!(
                        "malformed snapshot at {}: {e}",
                        snapshot_path.display()
                    ))
                })?
            }
        } else {
            HashMap::new()
        };

        info!(count = files.len(), path = %snapshot_path.display(), "metadata store opened");

        Ok(Self {
            files: RwLock::new(files),
            snapshot_path,
        })
    }

    pub fn in_memory() -> Self {
        Self {
            files: RwLock::new(HashMap::new()),
            snapshot_path: PathBuf::new(),
        }
    }

    pub async fn put(&self, file: File) -> Result<()> {
        let mut guard = self.files.write().await;
        guard.insert(file.file_id.clone(), file);
        self.persist(&guard).await;
        Ok(())
    }

    pub async fn get(&self, file_id: &str) -> Result<File> {
        self.files
            .read()
            .await
            .get(file_id)
            .cloned()
            .ok_or_else(|| CoordinatorError::FileNotFound(file_id.to_string()))
    }

    pub async fn list(&self) -> Vec<File> {
        self.files.read().await.values().cloned().collect()
    }

    /// Returns `true` if a file was present and removed.
    pub async fn delete(&self, file_id: &str) -> bool {
        let mut guard = self.files.write().await;
        let existed = guard.remove(file_id).is_some();
        if existed {
            self.persist(&guard).await;
        }
        existed
    }

    /// Apply `mutator` to the file under the write lock, then persist while
    /// still holding it. `mutator` must not perform network I/O; local
    /// snapshot writes are fine since they run before the lock is released.
    pub async fn update_chunks<F>(&self, file_id: &str, mutator: F) -> Result<()>
    where
        F: FnOnce(&mut File),
    {
        let mut guard = self.files.write().await;
        let file = guard
            .get_mut(file_id)
            .ok_or_else(|| CoordinatorError::FileNotFound(file_id.to_string()))?;
        mutator(file);
        self.persist(&guard).await;
        Ok(())
    }

    /// Write-temp-then-rename. Called while the write lock is held, so
    /// snapshots are written in the same order mutations are applied.
    /// Failures are logged and non-fatal — the in-memory map remains
    /// authoritative for the rest of the process lifetime.
    async fn persist(&self, snapshot: &HashMap<String, File>) {
        if self.snapshot_path.as_os_str().is_empty() {
            return;
        }
        if let Err(e) = self.persist_inner(snapshot).await {
            warn!(error = %e, "failed to persist metadata snapshot; continuing with in-memory state");
        }
    }

    async fn persist_inner(&self, snapshot: &HashMap<String, File>) -> Result<()> {
        let tmp_path = self.snapshot_path.with_extension("json.tmp");
        let body = serde_json::to_vec_pretty(snapshot)?;
        tokio::fs::write(&tmp_path, &body).await?;
        tokio::fs::rename(&tmp_path, &self.snapshot_path).await?;
        Ok(())
    }
}
