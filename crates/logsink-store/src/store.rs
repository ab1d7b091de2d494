// ABOUTME: The LogStore persistence trait, its error type, and the startup-time backend factory.
// ABOUTME: Also hosts the helper that runs blocking store work off the async runtime with a timeout.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use logsink_core::{LogEntry, MatchCriteria};
use thiserror::Error;

use crate::jsonl::JsonlStore;
use crate::sqlite::SqliteStore;

/// Default upper bound on a single store operation.
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("store operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("store lock poisoned by a panicked operation")]
    Poisoned,

    #[error("blocking store task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// The four operations the HTTP layer needs from a backing store.
///
/// Implementations own exactly one backing store for their lifetime and are
/// shared across request tasks, so every method takes `&self`.
#[async_trait]
pub trait LogStore: Send + Sync {
    /// Persist one entry. `entry.created` is expected to be set already.
    ///
    /// A `StoreError::Timeout` does not cancel the write: it may still land
    /// afterwards, so retrying a timed-out add can store the entry twice.
    async fn add(&self, entry: LogEntry) -> Result<(), StoreError>;

    /// Return every entry matching `criteria`, in insertion order.
    async fn find(&self, criteria: &MatchCriteria) -> Result<Vec<LogEntry>, StoreError>;

    /// Delete every entry matching `criteria` and return how many were removed.
    async fn remove(&self, criteria: &MatchCriteria) -> Result<usize, StoreError>;

    /// Delete everything.
    async fn reset(&self) -> Result<(), StoreError>;
}

/// Which backend to open, chosen once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreConfig {
    File { path: PathBuf, io_timeout: Duration },
    Sqlite { path: PathBuf, io_timeout: Duration },
}

/// Construct the configured backend.
pub fn open_store(config: &StoreConfig) -> Result<Arc<dyn LogStore>, StoreError> {
    match config {
        StoreConfig::File { path, io_timeout } => {
            tracing::info!("using jsonl file store at {}", path.display());
            Ok(Arc::new(JsonlStore::new(path.clone(), *io_timeout)))
        }
        StoreConfig::Sqlite { path, io_timeout } => {
            tracing::info!("using sqlite store at {}", path.display());
            Ok(Arc::new(SqliteStore::open(path, *io_timeout)?))
        }
    }
}

/// Run `work` on the blocking thread pool, giving up after `timeout`.
///
/// A timed-out task is not cancelled; it runs to completion in the
/// background and any lock it holds stays held until then.
pub(crate) async fn run_blocking<T, F>(timeout: Duration, work: F) -> Result<T, StoreError>
where
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    let task = tokio::task::spawn_blocking(work);
    match tokio::time::timeout(timeout, task).await {
        Ok(joined) => joined?,
        Err(_) => Err(StoreError::Timeout(timeout)),
    }
}
