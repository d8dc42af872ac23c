//! Seen-set of already notified deal ids.
//!
//! A single `SeenStore` is shared by every discovery task. Membership is
//! kept in a sharded concurrent set, so checks and inserts from different
//! categories never lose updates. Persistence copies the ids out first and
//! serializes the copy, so a flush never observes a half-applied insert.

use dashmap::DashSet;
use deals_core::DealId;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Default interval between snapshot flushes.
pub const SNAPSHOT_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Malformed seen-set in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Concurrent set of deal ids that have already been notified.
#[derive(Debug, Default)]
pub struct SeenStore {
    ids: DashSet<DealId>,
    /// Bumped on every new insert; lets the flusher skip unchanged sets.
    version: AtomicU64,
}

impl SeenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with ids.
    pub fn from_ids<I, T>(ids: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<DealId>,
    {
        Self {
            ids: ids.into_iter().map(Into::into).collect(),
            version: AtomicU64::new(0),
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Mark an id as seen. Idempotent.
    ///
    /// Returns true only for the call that actually inserted the id, which
    /// makes check-and-mark a single atomic step for concurrent callers.
    pub fn mark_seen(&self, id: impl Into<DealId>) -> bool {
        let inserted = self.ids.insert(id.into());
        if inserted {
            self.version.fetch_add(1, Ordering::Release);
        }
        inserted
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Monotonic change counter.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Copy of all ids, sorted for stable output.
    pub fn snapshot(&self) -> Vec<DealId> {
        let mut ids: Vec<DealId> = self.ids.iter().map(|id| id.key().clone()).collect();
        ids.sort_unstable();
        ids
    }

    /// Load a store from a JSON array of ids. A missing file yields an empty store.
    pub async fn load(path: &Path) -> Result<Self, PersistenceError> {
        let raw = match tokio::fs::read(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "Seen-set file not found, starting empty");
                return Ok(Self::new());
            }
            Err(source) => {
                return Err(PersistenceError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let ids: Vec<DealId> = serde_json::from_slice(&raw).map_err(|source| PersistenceError::Json {
            path: path.to_path_buf(),
            source,
        })?;

        info!(path = %path.display(), count = ids.len(), "Loaded seen-set");
        Ok(Self::from_ids(ids))
    }

    /// Write a full snapshot to `path`, replacing the file atomically.
    /// Returns the number of ids written.
    pub async fn persist(&self, path: &Path) -> Result<usize, PersistenceError> {
        let ids = self.snapshot();
        let json = serde_json::to_vec_pretty(&ids).map_err(|source| PersistenceError::Json {
            path: path.to_path_buf(),
            source,
        })?;

        let tmp_path = path.with_extension("json.tmp");
        let io_err = |source| PersistenceError::Io {
            path: path.to_path_buf(),
            source,
        };
        tokio::fs::write(&tmp_path, &json).await.map_err(io_err)?;
        tokio::fs::rename(&tmp_path, path).await.map_err(io_err)?;

        Ok(ids.len())
    }
}

/// Flush the store to `path` every `interval` until shutdown, then flush once more.
///
/// Flushes are skipped while the store is unchanged. Write failures are
/// logged and retried on the next tick.
pub async fn run_snapshot_loop(
    store: std::sync::Arc<SeenStore>,
    path: PathBuf,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(path = %path.display(), interval_secs = interval.as_secs(), "Starting seen-set snapshot loop");

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ticker.tick().await;
    // Version 0 is the state the store was created or loaded with.
    let mut flushed_version = 0;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                flushed_version = flush_if_changed(&store, &path, flushed_version).await;
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    flush_if_changed(&store, &path, flushed_version).await;
    info!("Seen-set snapshot loop stopped");
}

async fn flush_if_changed(store: &SeenStore, path: &Path, flushed_version: u64) -> u64 {
    let version = store.version();
    if version == flushed_version {
        return flushed_version;
    }

    match store.persist(path).await {
        Ok(count) => {
            debug!(path = %path.display(), count, "Seen-set flushed");
            version
        }
        Err(e) => {
            error!(error = %e, "Failed to save seen-set");
            flushed_version
        }
    }
}
