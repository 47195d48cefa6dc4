//! Current snapshot per geography, plus its on-disk copy.
//!
//! Readers clone an `Arc` under a briefly held lock and never wait for a
//! refresh; `replace` swaps the whole pointer, so a reader sees either the
//! old snapshot or the new one, never a mix.

use chrono::Utc;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use crate::error::{Result, TrendCacheError};
use crate::types::Snapshot;

pub struct SnapshotStore {
    geography: String,
    path: PathBuf,
    current: RwLock<Option<Arc<Snapshot>>>,
    persist_lock: Mutex<()>,
}

impl SnapshotStore {
    /// An empty store persisting to `path`. Call [`SnapshotStore::load`] to
    /// pick up a previous run's file.
    pub fn new(geography: &str, path: impl Into<PathBuf>) -> Self {
        Self {
            geography: geography.to_string(),
            path: path.into(),
            current: RwLock::new(None),
            persist_lock: Mutex::new(()),
        }
    }

    pub fn geography(&self) -> &str {
        &self.geography
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The published snapshot, or `None` before the first successful run.
    pub fn get(&self) -> Option<Arc<Snapshot>> {
        match self.current.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Publish `snapshot` as the current one and return the shared handle.
    pub fn replace(&self, snapshot: Snapshot) -> Arc<Snapshot> {
        let snapshot = Arc::new(snapshot);
        let mut guard = match self.current.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = Some(Arc::clone(&snapshot));
        drop(guard);
        tracing::debug!(
            "[store {}] Published snapshot with {} trends in {} categories",
            self.geography,
            snapshot.metadata.total_trends,
            snapshot.metadata.categories_count
        );
        snapshot
    }

    /// Time since the published snapshot was produced.
    pub fn age(&self) -> Option<Duration> {
        self.get().map(|s| {
            (Utc::now() - s.metadata.last_updated)
                .to_std()
                .unwrap_or(Duration::ZERO)
        })
    }

    /// Write the published snapshot to disk.
    ///
    /// The JSON goes to a temporary file in the same directory, is synced,
    /// then renamed over the target, so the previous file stays intact if
    /// the process dies mid-write. A store with nothing published writes
    /// nothing.
    pub fn persist(&self) -> Result<()> {
        let Some(snapshot) = self.get() else {
            return Ok(());
        };
        let _guard = match self.persist_lock.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let payload = serde_json::to_vec_pretty(snapshot.as_ref())
            .map_err(|e| TrendCacheError::PersistenceFailure(e.to_string()))?;
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir).map_err(|e| {
            TrendCacheError::PersistenceFailure(format!("create {}: {}", dir.display(), e))
        })?;

        let mut tmp = tempfile::Builder::new()
            .prefix(".trends-")
            .suffix(".json.tmp")
            .tempfile_in(&dir)
            .map_err(|e| TrendCacheError::PersistenceFailure(e.to_string()))?;
        tmp.write_all(&payload)
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| TrendCacheError::PersistenceFailure(e.to_string()))?;
        tmp.persist(&self.path).map_err(|e| {
            TrendCacheError::PersistenceFailure(format!(
                "rename into {}: {}",
                self.path.display(),
                e.error
            ))
        })?;

        tracing::info!(
            "[store {}] Persisted {} trends to {}",
            self.geography,
            snapshot.metadata.total_trends,
            self.path.display()
        );
        Ok(())
    }

    /// Populate the store from disk.
    ///
    /// A missing, unreadable, or malformed file leaves the store empty and is
    /// only logged; startup continues either way.
    pub fn load(&self) -> Option<Arc<Snapshot>> {
        if !self.path.exists() {
            tracing::info!(
                "[store {}] No persisted snapshot at {}, starting empty",
                self.geography,
                self.path.display()
            );
            return None;
        }
        match self.read_file() {
            Ok(snapshot) => {
                tracing::info!(
                    "[store {}] Loaded snapshot from {} ({} trends, last updated {})",
                    self.geography,
                    self.path.display(),
                    snapshot.metadata.total_trends,
                    snapshot.metadata.last_updated
                );
                Some(self.replace(snapshot))
            }
            Err(e) => {
                tracing::warn!(
                    "[store {}] Ignoring persisted snapshot, starting empty: {}",
                    self.geography,
                    e
                );
                None
            }
        }
    }

    fn read_file(&self) -> Result<Snapshot> {
        let content = std::fs::read_to_string(&self.path).map_err(|e| {
            TrendCacheError::LoadFailure(format!("read {}: {}", self.path.display(), e))
        })?;
        let snapshot: Snapshot = serde_json::from_str(&content).map_err(|e| {
            TrendCacheError::LoadFailure(format!("parse {}: {}", self.path.display(), e))
        })?;
        if snapshot.geography != self.geography {
            return Err(TrendCacheError::LoadFailure(format!(
                "{} holds data for {}",
                self.path.display(),
                snapshot.geography
            )));
        }
        snapshot
            .check_consistency()
            .map_err(TrendCacheError::LoadFailure)?;
        Ok(snapshot)
    }
}
