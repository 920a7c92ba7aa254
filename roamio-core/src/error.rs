//! Error types for metadata extraction and configuration.
//!
//! Extraction errors are always recoverable for callers: a note we
//! can't read is skipped, never fatal. Configuration errors are the
//! opposite: they stop the daemon before anything is watched.

use std::path::PathBuf;
use thiserror::Error;

/// Convenience type for functions that can fail during extraction.
pub type Result<T> = std::result::Result<T, ExtractError>;

/// Things that can go wrong when reading a note's metadata.
#[derive(Error, Debug)]
pub enum ExtractError {
    /// Couldn't read the file from disk.
    #[error("failed to read note '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The note's content was rejected by the extractor.
    #[error("malformed metadata in '{path}': {reason}")]
    Malformed { path: PathBuf, reason: String },
}

impl ExtractError {
    /// Creates an IO error with the path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Things that can go wrong while loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not determine a configuration directory for this platform")]
    NoConfigDir,

    #[error("failed to access config file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("error parsing config file '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// A required key is empty or absent.
    #[error("'{path}' missing {key}")]
    Missing { path: PathBuf, key: &'static str },

    #[error("workspace root '{0}' does not exist")]
    RootNotFound(PathBuf),

    #[error("workspace root '{0}' is not a directory")]
    RootNotDirectory(PathBuf),

    #[error("workspace root '{path}' is not accessible: {source}")]
    RootInaccessible {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}
