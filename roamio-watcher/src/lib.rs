//! Roamio Watcher - watch-set maintenance and index reconciliation
//!
//! This crate handles the file system side of things:
//! - Registering every non-hidden directory of the workspace for changes
//! - Keeping that watch set current as directories come and go
//! - Enumerating tracked notes across the watch set in parallel
//! - Reconciling the persisted index against what's on disk
//!
//! Hidden (`.`-prefixed) directories and everything under them are
//! never watched and never indexed.

mod context;
mod enumerator;
mod error;
mod listener;
mod reconciler;
mod registrar;
mod watch_set;

pub use context::WatchContext;
pub use enumerator::{enumerate, scan_dir, EnumerateOptions};
pub use error::{EnumerateError, ReconcileError, WatchError};
pub use listener::{ChangeListener, FsChange};
pub use reconciler::{ReconcileReport, Reconciler};
pub use registrar::Registrar;
pub use watch_set::{Notifier, SharedWatchSet, WatchSet};
