//! Roamio Core - note records, metadata and configuration
//!
//! This crate holds the types every other Roamio crate agrees on:
//! the `FileRecord` stored in the index, the metadata extractor that
//! fills it in, and the workspace configuration.
//!
//! # Example
//!
//! ```no_run
//! use roamio_core::{FileRecord, MetadataExtractor, NorgExtractor};
//! use std::path::Path;
//!
//! let path = Path::new("/home/me/notes/index.norg");
//! let meta = NorgExtractor.extract(path).unwrap();
//! let record = FileRecord::from_meta("index.norg", path, meta);
//! println!("{} ({})", record.title, record.id);
//! ```

pub mod config;
pub mod error;
pub mod meta;
pub mod record;

pub use config::{Config, RegistrationPolicy, WorkspaceSettings};
pub use error::{ConfigError, ExtractError, Result};
pub use meta::{parse_meta, MetadataExtractor, NorgExtractor, NoteMeta};
pub use record::{is_hidden_name, relative_id, FileRecord, RecordKind};
