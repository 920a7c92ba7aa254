//! Note metadata extraction.
//!
//! Norg notes open with a `@document.meta` block of `key: value` lines.
//! We only need a handful of those keys for the index, so this is a
//! small line scanner rather than a full Norg parser.

use crate::error::{ExtractError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::debug;

const META_OPEN: &str = "@document.meta";
const META_CLOSE: &str = "@end";

/// Metadata pulled from a note header.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteMeta {
    pub title: String,
    pub description: String,
    pub authors: String,
    pub categories: Vec<String>,
    pub created: String,
    pub updated: String,
    pub version: String,
}

/// Maps a note file to its metadata.
///
/// Implementations must be cheap to share across threads; the
/// reconciler calls them once per newly discovered note.
pub trait MetadataExtractor: Send + Sync {
    fn extract(&self, path: &Path) -> Result<NoteMeta>;
}

/// Extractor for `.norg` files.
#[derive(Debug, Clone, Copy, Default)]
pub struct NorgExtractor;

impl MetadataExtractor for NorgExtractor {
    fn extract(&self, path: &Path) -> Result<NoteMeta> {
        let bytes = fs::read(path).map_err(|e| ExtractError::io(path, e))?;
        let source = String::from_utf8_lossy(&bytes);
        parse_meta(&source, path)
    }
}

/// Parses note metadata from source text.
///
/// Content never fails to parse: notes without a meta block still get a
/// title if their header carries a `title: ` line, and an unterminated
/// block yields the keys read before the end of the file. `path` is only
/// used for log context.
pub fn parse_meta(source: &str, path: &Path) -> Result<NoteMeta> {
    let mut lines = source.lines().skip_while(|l| l.trim().is_empty()).peekable();

    match lines.peek() {
        Some(first) if first.trim() == META_OPEN => {
            lines.next();
        }
        _ => return Ok(parse_header(source)),
    }

    let mut meta = NoteMeta::default();
    let mut closed = false;

    while let Some(line) = lines.next() {
        let line = line.trim();
        if line == META_CLOSE {
            closed = true;
            break;
        }

        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim();

        // Multi-line lists: `key: [` followed by one item per line and `]`.
        let items = if value.starts_with('[') && !value.contains(']') {
            let mut items = split_list(value.trim_start_matches('['));
            for item_line in lines.by_ref() {
                let item_line = item_line.trim();
                if let Some(rest) = item_line.strip_suffix(']') {
                    items.extend(split_list(rest));
                    break;
                }
                if item_line == META_CLOSE {
                    closed = true;
                    break;
                }
                items.extend(split_list(item_line));
            }
            items
        } else {
            split_list(value.trim_start_matches('[').trim_end_matches(']'))
        };

        match key {
            "title" => meta.title = value.to_string(),
            "description" => meta.description = value.to_string(),
            "authors" => meta.authors = items.join(" "),
            "categories" => meta.categories = items,
            "created" => meta.created = value.to_string(),
            "updated" => meta.updated = value.to_string(),
            "version" => meta.version = value.to_string(),
            _ => {}
        }

        if closed {
            break;
        }
    }

    // Half-written notes still get indexed with whatever was readable.
    if !closed {
        debug!(
            "{}: '{}' without '{}', using the keys read so far",
            path.display(),
            META_OPEN,
            META_CLOSE
        );
    }

    Ok(meta)
}

/// Header fallback: a `title: ` line before the first blank line.
fn parse_header(source: &str) -> NoteMeta {
    let title = source
        .lines()
        .take_while(|l| !l.trim().is_empty())
        .find_map(|l| l.strip_prefix("title: "))
        .map(|t| t.trim().to_string())
        .unwrap_or_default();

    NoteMeta {
        title,
        ..NoteMeta::default()
    }
}

fn split_list(s: &str) -> Vec<String> {
    s.split(|c: char| c.is_whitespace() || c == ',')
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}
