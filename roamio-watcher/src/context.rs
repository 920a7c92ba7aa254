//! Daemon lifecycle context.
//!
//! `WatchContext` owns everything the registrar, listener and enumerator
//! share: the workspace root, the watch set and the scan options. It is
//! created once at startup and torn down with `shutdown`.

use crate::enumerator::{enumerate, EnumerateOptions};
use crate::error::{EnumerateError, WatchError};
use crate::listener::ChangeListener;
use crate::registrar::Registrar;
use crate::watch_set::{lock, Notifier, SharedWatchSet, WatchSet};
use notify::Event;
use roamio_core::WorkspaceSettings;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::{debug, info};

pub struct WatchContext {
    root: PathBuf,
    watch_set: SharedWatchSet,
    registrar: Registrar,
    options: EnumerateOptions,
}

impl WatchContext {
    /// Creates the OS watcher and registers the whole workspace tree.
    ///
    /// The returned listener must be spawned to keep the watch set
    /// current. Registration failures here are fatal to startup.
    pub fn start(settings: &WorkspaceSettings) -> Result<(Self, ChangeListener), WatchError> {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (error_tx, error_rx) = mpsc::unbounded_channel();

        let watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let delivered = match res {
                Ok(event) => event_tx.send(event).is_ok(),
                Err(e) => error_tx.send(e).is_ok(),
            };
            if !delivered {
                debug!("Change listener is gone, dropping notification");
            }
        })
        .map_err(|e| WatchError::notify(&settings.root, e))?;

        Self::with_notifier(settings, watcher, event_rx, error_rx)
    }

    /// Like `start`, with a caller-supplied notifier and channels.
    pub fn with_notifier<N: Notifier + 'static>(
        settings: &WorkspaceSettings,
        notifier: N,
        events: mpsc::UnboundedReceiver<Event>,
        errors: mpsc::UnboundedReceiver<notify::Error>,
    ) -> Result<(Self, ChangeListener), WatchError> {
        let watch_set = WatchSet::shared(notifier);
        let registrar = Registrar::new(&settings.root, watch_set.clone());

        let registered = registrar.register_tree(&settings.root)?;
        info!(
            "Watching {} directories under {}",
            registered,
            settings.root.display()
        );

        let listener = ChangeListener::new(registrar.clone(), events, errors, settings.policy);
        let context = Self {
            root: settings.root.clone(),
            watch_set,
            registrar,
            options: EnumerateOptions::from(settings),
        };

        Ok((context, listener))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn registrar(&self) -> &Registrar {
        &self.registrar
    }

    pub fn options(&self) -> &EnumerateOptions {
        &self.options
    }

    /// Copies the watched directories; the lock is released on return.
    pub fn snapshot(&self) -> Vec<PathBuf> {
        lock(&self.watch_set).dirs()
    }

    pub fn is_watched(&self, dir: &Path) -> bool {
        lock(&self.watch_set).contains(dir)
    }

    pub fn watch_count(&self) -> usize {
        lock(&self.watch_set).len()
    }

    /// Lists every tracked file currently visible through the watch set.
    pub async fn enumerate(&self) -> Result<BTreeSet<String>, EnumerateError> {
        enumerate(self.snapshot(), &self.root, &self.options).await
    }

    /// Drops the OS watcher, which closes the listener's channels.
    pub fn shutdown(self) {
        lock(&self.watch_set).close();
        info!("Stopped watching {}", self.root.display());
    }
}
