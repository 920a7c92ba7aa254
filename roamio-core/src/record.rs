//! Index record representation.
//!
//! A FileRecord is one entry of the persisted index. It is keyed by the
//! note's path relative to the workspace root and carries just enough
//! metadata for a front end to list and jump to notes.

use crate::meta::NoteMeta;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path};

/// What part of a note a record points at.
///
/// The reconciler only ever creates `File` records; `Node` and `Block`
/// anchors are written by other tools sharing the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    /// A whole note file.
    #[default]
    File,
    /// A heading inside a note.
    Node,
    /// A block inside a note.
    Block,
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::File => "file",
            Self::Node => "node",
            Self::Block => "block",
        };
        write!(f, "{}", s)
    }
}

/// One entry of the note index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Path relative to the workspace root, `/`-separated. Natural key.
    pub id: String,

    pub title: String,

    /// Absolute path of the note on disk.
    pub address: String,

    /// Line anchor inside the note (1-indexed, like editors show).
    pub line: u32,

    #[serde(rename = "type")]
    pub kind: RecordKind,

    pub categories: Vec<String>,

    pub created: String,

    pub description: String,
}

impl FileRecord {
    /// Creates a bare `File` record anchored at line 1.
    pub fn new(id: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: String::new(),
            address: address.into(),
            line: 1,
            kind: RecordKind::File,
            categories: Vec::new(),
            created: String::new(),
            description: String::new(),
        }
    }

    /// Builds a `File` record from freshly extracted metadata.
    ///
    /// Notes without a title fall back to their file stem so the index
    /// never lists an unnamed entry.
    pub fn from_meta(id: impl Into<String>, address: &Path, meta: NoteMeta) -> Self {
        let id = id.into();
        let title = if meta.title.is_empty() {
            address
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| id.clone())
        } else {
            meta.title
        };

        Self {
            title,
            categories: meta.categories,
            created: meta.created,
            description: meta.description,
            ..Self::new(id, address.to_string_lossy())
        }
    }

    /// Builder pattern: set kind.
    pub fn with_kind(mut self, kind: RecordKind) -> Self {
        self.kind = kind;
        self
    }

    /// Builder pattern: set line anchor.
    pub fn with_line(mut self, line: u32) -> Self {
        self.line = line;
        self
    }

    /// Builder pattern: set title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn is_file(&self) -> bool {
        self.kind == RecordKind::File
    }
}

/// Converts an absolute path under `root` into an index id.
///
/// Ids always use `/` so an index written on one platform reads the same
/// on another. Returns None when `path` is not under `root`.
pub fn relative_id(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<_> = rel
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy()),
            _ => None,
        })
        .collect();

    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}

/// Returns true when a file or directory name is hidden (`.`-prefixed).
pub fn is_hidden_name(name: &std::ffi::OsStr) -> bool {
    name.to_string_lossy().starts_with('.')
}
