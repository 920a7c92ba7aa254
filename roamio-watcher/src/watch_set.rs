//! The set of watched directories.
//!
//! The set and the notifier handle live together: a directory is a
//! member exactly when the notifier holds a watch on it.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

/// OS-level change notification, one non-recursive watch per directory.
pub trait Notifier: Send {
    fn watch(&mut self, dir: &Path) -> notify::Result<()>;
    fn unwatch(&mut self, dir: &Path) -> notify::Result<()>;
}

impl Notifier for notify::RecommendedWatcher {
    fn watch(&mut self, dir: &Path) -> notify::Result<()> {
        notify::Watcher::watch(self, dir, notify::RecursiveMode::NonRecursive)
    }

    fn unwatch(&mut self, dir: &Path) -> notify::Result<()> {
        notify::Watcher::unwatch(self, dir)
    }
}

pub type SharedWatchSet = Arc<Mutex<WatchSet>>;

/// Locks a shared watch set.
///
/// A panic while holding the lock can't leave the set half-updated
/// (every mutation is a single insert or remove), so poisoning is ignored.
pub fn lock(set: &SharedWatchSet) -> MutexGuard<'_, WatchSet> {
    set.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct WatchSet {
    notifier: Option<Box<dyn Notifier>>,
    dirs: BTreeSet<PathBuf>,
}

impl WatchSet {
    pub fn new(notifier: impl Notifier + 'static) -> Self {
        Self {
            notifier: Some(Box::new(notifier)),
            dirs: BTreeSet::new(),
        }
    }

    pub fn shared(notifier: impl Notifier + 'static) -> SharedWatchSet {
        Arc::new(Mutex::new(Self::new(notifier)))
    }

    /// Starts watching `dir`. Returns false if it was already watched.
    pub fn add(&mut self, dir: &Path) -> notify::Result<bool> {
        if self.dirs.contains(dir) {
            return Ok(false);
        }
        let notifier = self
            .notifier
            .as_mut()
            .ok_or_else(|| notify::Error::generic("watch set is closed"))?;
        notifier.watch(dir)?;
        self.dirs.insert(dir.to_path_buf());
        Ok(true)
    }

    /// Stops watching `dir` and every watched directory below it.
    ///
    /// Returns the paths that were removed; empty if none were watched.
    pub fn remove(&mut self, dir: &Path) -> Vec<PathBuf> {
        let removed: Vec<PathBuf> = self
            .dirs
            .range(dir.to_path_buf()..)
            .take_while(|p| p.starts_with(dir))
            .cloned()
            .collect();

        for path in &removed {
            self.dirs.remove(path);
            if let Some(notifier) = self.notifier.as_mut() {
                match notifier.unwatch(path) {
                    Ok(()) => {}
                    // The OS drops watches on deleted directories by itself.
                    Err(e) if matches!(e.kind, notify::ErrorKind::WatchNotFound) => {
                        debug!("{} was already unwatched", path.display());
                    }
                    Err(e) => warn!("Failed to unwatch {}: {}", path.display(), e),
                }
            }
        }
        removed
    }

    pub fn contains(&self, dir: &Path) -> bool {
        self.dirs.contains(dir)
    }

    /// Copies the current members, ordered.
    pub fn dirs(&self) -> Vec<PathBuf> {
        self.dirs.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.dirs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dirs.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.notifier.is_none()
    }

    /// Drops the notifier and forgets every member.
    ///
    /// Dropping the notifier closes the channels it was feeding, which
    /// is what stops the change listener.
    pub fn close(&mut self) {
        self.notifier = None;
        self.dirs.clear();
    }
}
