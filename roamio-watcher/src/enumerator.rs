//! Concurrent enumeration of watched directories.
//!
//! Every watched directory is its own member of the watch set, so each
//! one is listed non-recursively. Listings run on the blocking pool,
//! at most `workers` at a time, each under its own deadline.

use crate::error::EnumerateError;
use roamio_core::config::DEFAULT_EXTENSION;
use roamio_core::{is_hidden_name, relative_id, WorkspaceSettings};
use std::collections::BTreeSet;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct EnumerateOptions {
    /// Tracked extension, without the leading dot.
    pub extension: String,

    /// Maximum number of directory listings in flight.
    pub workers: usize,

    /// Deadline for a single directory listing.
    pub scan_timeout: Duration,
}

impl Default for EnumerateOptions {
    fn default() -> Self {
        Self {
            extension: DEFAULT_EXTENSION.to_string(),
            workers: 8,
            scan_timeout: Duration::from_secs(5),
        }
    }
}

impl From<&WorkspaceSettings> for EnumerateOptions {
    fn from(settings: &WorkspaceSettings) -> Self {
        Self {
            extension: settings.extension.clone(),
            workers: settings.workers,
            scan_timeout: settings.scan_timeout,
        }
    }
}

/// Lists every tracked file in `dirs`, as ids relative to `root`.
///
/// Any directory that can't be listed fails the whole call: a partial
/// list would make the reconciler evict notes that still exist.
pub async fn enumerate(
    dirs: Vec<PathBuf>,
    root: &Path,
    options: &EnumerateOptions,
) -> Result<BTreeSet<String>, EnumerateError> {
    enumerate_with(dirs, root, options, scan_dir).await
}

/// Listing of a single directory: `(dir, root, extension)` to ids.
type ScanFn = fn(&Path, &Path, &str) -> Result<Vec<String>, EnumerateError>;

async fn enumerate_with(
    dirs: Vec<PathBuf>,
    root: &Path,
    options: &EnumerateOptions,
    scan: ScanFn,
) -> Result<BTreeSet<String>, EnumerateError> {
    let semaphore = Arc::new(Semaphore::new(options.workers.max(1)));
    let found = Arc::new(Mutex::new(BTreeSet::new()));
    let mut tasks = JoinSet::new();

    debug!("Enumerating {} directories", dirs.len());

    for dir in dirs {
        let semaphore = semaphore.clone();
        let found = found.clone();
        let root = root.to_path_buf();
        let extension = options.extension.clone();
        let deadline = options.scan_timeout;

        tasks.spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .map_err(|e| EnumerateError::Task(e.to_string()))?;

            let scan_dir_path = dir.clone();
            let listing =
                tokio::task::spawn_blocking(move || scan(&scan_dir_path, &root, &extension));

            let partial = match tokio::time::timeout(deadline, listing).await {
                Ok(Ok(result)) => result?,
                Ok(Err(e)) => return Err(EnumerateError::Task(e.to_string())),
                Err(_) => {
                    return Err(EnumerateError::Timeout {
                        dir,
                        after: deadline,
                    })
                }
            };

            debug!("{}: {} files", dir.display(), partial.len());
            found.lock().await.extend(partial);
            Ok(())
        });
    }

    while let Some(joined) = tasks.join_next().await {
        let outcome = joined
            .map_err(|e| EnumerateError::Task(e.to_string()))
            .and_then(|scanned| scanned);
        if let Err(e) = outcome {
            tasks.abort_all();
            return Err(e);
        }
    }

    let files = std::mem::take(&mut *found.lock().await);
    Ok(files)
}

/// Lists the tracked files directly inside `dir`.
///
/// Hidden files are skipped. Returned ids are relative to `root`.
pub fn scan_dir(dir: &Path, root: &Path, extension: &str) -> Result<Vec<String>, EnumerateError> {
    let read_err = |e| EnumerateError::ReadDir {
        dir: dir.to_path_buf(),
        source: e,
    };

    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(read_err)? {
        let entry = entry.map_err(read_err)?;
        let file_type = entry.file_type().map_err(read_err)?;
        let path = entry.path();

        let is_file = file_type.is_file() || (file_type.is_symlink() && path.is_file());
        if !is_file || is_hidden_name(&entry.file_name()) {
            continue;
        }
        if path.extension() != Some(OsStr::new(extension)) {
            continue;
        }
        if let Some(id) = relative_id(root, &path) {
            files.push(id);
        }
    }

    Ok(files)
}
