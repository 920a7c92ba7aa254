//! Recursive watch registration.
//!
//! Walks a directory tree and registers every non-hidden directory with
//! the notifier. Registration is best effort: a walk that fails halfway
//! keeps whatever it registered before the failure.

use crate::error::WatchError;
use crate::watch_set::{lock, SharedWatchSet};
use roamio_core::is_hidden_name;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

#[derive(Clone)]
pub struct Registrar {
    root: PathBuf,
    watch_set: SharedWatchSet,
}

impl Registrar {
    /// `root` is the workspace root; it is registered even if its own
    /// name is hidden.
    pub fn new(root: impl Into<PathBuf>, watch_set: SharedWatchSet) -> Self {
        Self {
            root: root.into(),
            watch_set,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn watch_set(&self) -> &SharedWatchSet {
        &self.watch_set
    }

    pub fn is_watched(&self, dir: &Path) -> bool {
        lock(&self.watch_set).contains(dir)
    }

    /// Registers `path` and every non-hidden directory below it.
    ///
    /// Hidden directories are skipped together with their whole subtree.
    /// Symlinks are never followed, not even when `path` itself is one.
    /// Returns the number of directories that weren't watched before.
    pub fn register_tree(&self, path: &Path) -> Result<usize, WatchError> {
        let mut added = 0;

        let walker = WalkDir::new(path)
            .follow_links(false)
            .follow_root_links(false)
            .into_iter()
            .filter_entry(|entry| !self.is_skipped(entry));

        for entry in walker {
            let entry = entry?;
            if !entry.file_type().is_dir() {
                continue;
            }

            let dir = entry.path();
            // The lock is per directory so enumeration can snapshot mid-walk.
            let is_new = lock(&self.watch_set)
                .add(dir)
                .map_err(|e| WatchError::notify(dir, e))?;
            if is_new {
                info!("Watching: {}", dir.display());
                added += 1;
            }
        }

        Ok(added)
    }

    /// Stops watching `path` and anything watched below it.
    ///
    /// Removing a path that isn't watched is a no-op.
    pub fn deregister(&self, path: &Path) -> usize {
        let removed = lock(&self.watch_set).remove(path);
        if removed.is_empty() {
            warn!("{} was not being watched", path.display());
        }
        for dir in &removed {
            info!("Removed {} from watcher", dir.display());
        }
        removed.len()
    }

    fn is_skipped(&self, entry: &DirEntry) -> bool {
        let skip = entry.file_type().is_dir()
            && entry.path() != self.root
            && is_hidden_name(entry.file_name());
        if skip {
            debug!("Skipping hidden directory: {}", entry.path().display());
        }
        skip
    }
}
