//! Change listener.
//!
//! Consumes notifier events and errors from two channels and keeps the
//! watch set in step with the directory tree: new directories get
//! registered, removed ones get dropped.

use crate::error::WatchError;
use crate::registrar::Registrar;
use crate::watch_set::lock;
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind};
use roamio_core::RegistrationPolicy;
use std::io::ErrorKind;
use std::path::PathBuf;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info};

/// Structural change derived from a notifier event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsChange {
    Created(PathBuf),
    Removed(PathBuf),
    /// A rename where the notifier couldn't tell which side this path is.
    Renamed(PathBuf),
}

impl FsChange {
    /// Classifies a notifier event. Content changes yield nothing.
    pub fn from_event(event: &Event) -> Vec<FsChange> {
        let paths = event.paths.iter().cloned();

        match &event.kind {
            EventKind::Create(_) | EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
                paths.map(FsChange::Created).collect()
            }
            EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
                paths.map(FsChange::Removed).collect()
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => match event.paths.as_slice() {
                [from, to] => vec![
                    FsChange::Removed(from.clone()),
                    FsChange::Created(to.clone()),
                ],
                _ => paths.map(FsChange::Renamed).collect(),
            },
            EventKind::Modify(ModifyKind::Name(_)) | EventKind::Any => {
                paths.map(FsChange::Renamed).collect()
            }
            _ => Vec::new(),
        }
    }
}

pub struct ChangeListener {
    registrar: Registrar,
    events: mpsc::UnboundedReceiver<Event>,
    errors: mpsc::UnboundedReceiver<notify::Error>,
    policy: RegistrationPolicy,
    changes: watch::Sender<u64>,
}

impl ChangeListener {
    pub fn new(
        registrar: Registrar,
        events: mpsc::UnboundedReceiver<Event>,
        errors: mpsc::UnboundedReceiver<notify::Error>,
        policy: RegistrationPolicy,
    ) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            registrar,
            events,
            errors,
            policy,
            changes,
        }
    }

    /// Receives a counter bumped after every applied structural change.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    /// Runs until either input channel is closed.
    ///
    /// Errors from the notifier are logged and don't stop the loop. A
    /// failed registration stops it under `RegistrationPolicy::Abort`.
    pub async fn run(mut self) -> Result<(), WatchError> {
        loop {
            tokio::select! {
                event = self.events.recv() => match event {
                    Some(event) => self.handle_event(event).await?,
                    None => break,
                },
                err = self.errors.recv() => match err {
                    Some(e) => error!("Watch error: {}", e),
                    None => break,
                },
            }
        }

        info!("Change listener stopped");
        Ok(())
    }

    async fn handle_event(&mut self, event: Event) -> Result<(), WatchError> {
        debug!("Event: {:?} {:?}", event.kind, event.paths);
        if event.need_rescan() {
            self.rescan().await?;
        }
        for change in FsChange::from_event(&event) {
            self.apply(change).await?;
        }
        Ok(())
    }

    async fn apply(&mut self, change: FsChange) -> Result<(), WatchError> {
        match change {
            FsChange::Created(path) => self.on_created(path).await,
            FsChange::Removed(path) => {
                self.on_removed(path).await;
                Ok(())
            }
            FsChange::Renamed(path) => {
                if tokio::fs::symlink_metadata(&path).await.is_ok() {
                    self.on_created(path).await
                } else {
                    self.on_removed(path).await;
                    Ok(())
                }
            }
        }
    }

    async fn on_created(&mut self, path: PathBuf) -> Result<(), WatchError> {
        // Symlinked directories are left alone, same as during startup.
        let is_dir = match tokio::fs::symlink_metadata(&path).await {
            Ok(meta) => meta.is_dir(),
            // Gone again before we got to it.
            Err(_) => return Ok(()),
        };

        if is_dir {
            self.register(path).await?;
        }

        self.bump();
        Ok(())
    }

    /// The notifier lost events: walk the whole workspace again and drop
    /// watched directories that no longer exist.
    async fn rescan(&mut self) -> Result<(), WatchError> {
        let root = self.registrar.root().to_path_buf();
        error!("Watch events were dropped, rescanning {}", root.display());

        self.register(root).await?;

        let watched = lock(self.registrar.watch_set()).dirs();
        for dir in watched {
            if let Err(e) = tokio::fs::symlink_metadata(&dir).await {
                // Descendants go together with their removed parent.
                if e.kind() == ErrorKind::NotFound && self.registrar.is_watched(&dir) {
                    self.registrar.deregister(&dir);
                }
            }
        }

        self.bump();
        Ok(())
    }

    /// Registers the tree at `path`, applying the registration policy.
    async fn register(&self, path: PathBuf) -> Result<(), WatchError> {
        let registrar = self.registrar.clone();
        let walk_root = path.clone();
        let registered = tokio::task::spawn_blocking(move || registrar.register_tree(&walk_root))
            .await
            .map_err(|e| WatchError::Task(e.to_string()))?;

        match registered {
            Ok(_) => Ok(()),
            Err(e) => match self.policy {
                RegistrationPolicy::Abort => Err(e),
                RegistrationPolicy::Skip => {
                    error!("Failed to register {}: {}", path.display(), e);
                    Ok(())
                }
            },
        }
    }

    async fn on_removed(&mut self, path: PathBuf) {
        match tokio::fs::symlink_metadata(&path).await {
            Err(e) if e.kind() == ErrorKind::NotFound => {
                self.registrar.deregister(&path);
                self.bump();
            }
            _ => debug!("{} still exists, keeping watch", path.display()),
        }
    }

    fn bump(&self) {
        self.changes.send_modify(|n| *n += 1);
    }
}
