use roamio_index::StoreError;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Failures while building or maintaining the watch set.
#[derive(Error, Debug)]
pub enum WatchError {
    /// The directory walk hit a permission error or a vanished path.
    #[error("failed to walk directory tree: {0}")]
    Walk(#[from] walkdir::Error),

    /// The OS notifier refused a watch.
    #[error("failed to watch '{path}': {source}")]
    Notify {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    /// A registration task panicked or was cancelled.
    #[error("registration task failed: {0}")]
    Task(String),
}

impl WatchError {
    pub fn notify(path: &Path, source: notify::Error) -> Self {
        Self::Notify {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Failures that abort an enumeration pass.
#[derive(Error, Debug)]
pub enum EnumerateError {
    #[error("failed to list '{dir}': {source}")]
    ReadDir {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("listing '{dir}' did not finish within {after:?}")]
    Timeout { dir: PathBuf, after: Duration },

    #[error("scan task failed: {0}")]
    Task(String),
}

/// Failures that abort a reconciliation pass. Nothing is persisted.
#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("index store error: {0}")]
    Store(#[from] StoreError),

    #[error("enumeration failed: {0}")]
    Enumerate(#[from] EnumerateError),

    #[error("metadata task failed: {0}")]
    Task(String),
}
