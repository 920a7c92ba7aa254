//! Workspace configuration.
//!
//! Configuration lives in `<config_dir>/roamio/<name>.yaml`. On first run
//! a template is written with a freshly generated workspace name so the
//! user only has to fill in the root.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_NAME: &str = "config";
pub const DEFAULT_INDEX_NAME: &str = ".index.cache";
pub const DEFAULT_EXTENSION: &str = "norg";

/// What the change listener does when registering a new subtree fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationPolicy {
    /// Stop the daemon rather than run with an incomplete watch set.
    #[default]
    Abort,
    /// Log the failure and keep watching what was registered.
    Skip,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceSection {
    pub name: String,
    pub root: String,
    pub index: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    pub verbosity: bool,
    pub color: bool,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            verbosity: false,
            color: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanSection {
    pub extension: String,
    pub workers: usize,
    pub timeout_ms: u64,
}

impl Default for ScanSection {
    fn default() -> Self {
        Self {
            extension: DEFAULT_EXTENSION.to_string(),
            workers: 8,
            timeout_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchSection {
    pub on_registration_error: RegistrationPolicy,
}

/// The on-disk configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub workspace: WorkspaceSection,
    pub logging: LoggingSection,
    pub scan: ScanSection,
    pub watch: WatchSection,

    /// Where this config was read from, for error messages.
    #[serde(skip)]
    pub source: PathBuf,
}

/// Validated settings the daemon runs with.
#[derive(Debug, Clone)]
pub struct WorkspaceSettings {
    /// Canonical absolute workspace root.
    pub root: PathBuf,
    pub name: String,
    pub index_path: PathBuf,
    pub extension: String,
    pub workers: usize,
    pub scan_timeout: Duration,
    pub policy: RegistrationPolicy,
}

impl Config {
    /// Returns `<config_dir>/roamio/<name>.yaml`.
    pub fn path_for(name: &str) -> Result<PathBuf, ConfigError> {
        let dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(dir.join("roamio").join(format!("{}.yaml", name)))
    }

    /// Writes a template config at `path` unless one is already there.
    ///
    /// Returns true if a new file was written.
    pub fn init_at(path: &Path) -> Result<bool, ConfigError> {
        if path.exists() {
            return Ok(false);
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let template = Config {
            workspace: WorkspaceSection {
                name: uuid::Uuid::new_v4().to_string(),
                root: String::new(),
                index: DEFAULT_INDEX_NAME.to_string(),
            },
            ..Config::default()
        };
        let yaml = serde_yaml::to_string(&template).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;
        fs::write(path, yaml).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(true)
    }

    /// Reads and parses a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let mut config = Self::from_yaml(&data, path)?;
        config.source = path.to_path_buf();
        Ok(config)
    }

    pub fn from_yaml(data: &str, path: &Path) -> Result<Self, ConfigError> {
        // An empty file deserializes to unit, not to our defaults.
        if data.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(data).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Validates the config and resolves the workspace root.
    ///
    /// Fails fast on anything that would leave the daemon watching the
    /// wrong place: an empty, missing, non-directory or unreadable root.
    pub fn settings(&self) -> Result<WorkspaceSettings, ConfigError> {
        if self.workspace.root.trim().is_empty() {
            return Err(ConfigError::Missing {
                path: self.source.clone(),
                key: "workspace.root",
            });
        }
        if self.workspace.name.trim().is_empty() {
            return Err(ConfigError::Missing {
                path: self.source.clone(),
                key: "workspace.name",
            });
        }
        if self.scan.workers == 0 {
            return Err(ConfigError::Invalid {
                key: "scan.workers",
                reason: "must be at least 1".into(),
            });
        }
        if self.scan.timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                key: "scan.timeout_ms",
                reason: "must be at least 1".into(),
            });
        }

        let extension = self.scan.extension.trim_start_matches('.').to_string();
        if extension.is_empty() {
            return Err(ConfigError::Invalid {
                key: "scan.extension",
                reason: "must not be empty".into(),
            });
        }

        let root = validate_root(Path::new(self.workspace.root.trim()))?;

        let index_name = if self.workspace.index.trim().is_empty() {
            DEFAULT_INDEX_NAME
        } else {
            self.workspace.index.trim()
        };

        Ok(WorkspaceSettings {
            index_path: root.join(index_name),
            root,
            name: self.workspace.name.clone(),
            extension,
            workers: self.scan.workers,
            scan_timeout: Duration::from_millis(self.scan.timeout_ms),
            policy: self.watch.on_registration_error,
        })
    }
}

fn validate_root(root: &Path) -> Result<PathBuf, ConfigError> {
    let meta = match fs::metadata(root) {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ConfigError::RootNotFound(root.to_path_buf()));
        }
        Err(e) => {
            return Err(ConfigError::RootInaccessible {
                path: root.to_path_buf(),
                source: e,
            });
        }
    };

    if !meta.is_dir() {
        return Err(ConfigError::RootNotDirectory(root.to_path_buf()));
    }

    let inaccessible = |e| ConfigError::RootInaccessible {
        path: root.to_path_buf(),
        source: e,
    };
    fs::read_dir(root).map_err(inaccessible)?;
    root.canonicalize().map_err(inaccessible)
}
