//! Presence diff between the live file list and the index.
//!
//! Every id on disk starts out `Missing`. Sweeping the index flips the
//! ones it already knows to `Found`; index ids with no file on disk are
//! collected for eviction.

use roamio_core::FileRecord;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    /// On disk, not yet in the index.
    Missing,
    /// On disk and in the index.
    Found,
}

#[derive(Debug, Default)]
pub struct PresenceMap {
    entries: BTreeMap<String, Presence>,
    evictable: Vec<String>,
}

impl PresenceMap {
    /// Seeds the map with every id currently on disk.
    pub fn seed<'a>(ids: impl IntoIterator<Item = &'a String>) -> Self {
        Self {
            entries: ids
                .into_iter()
                .map(|id| (id.clone(), Presence::Missing))
                .collect(),
            evictable: Vec::new(),
        }
    }

    /// Sweeps index records. Only `file` records take part in the diff.
    pub fn sweep<'a>(&mut self, records: impl IntoIterator<Item = &'a FileRecord>) {
        for record in records.into_iter().filter(|r| r.is_file()) {
            match self.entries.get_mut(&record.id) {
                Some(presence) => *presence = Presence::Found,
                None => self.evictable.push(record.id.clone()),
            }
        }
    }

    pub fn presence(&self, id: &str) -> Option<Presence> {
        self.entries.get(id).copied()
    }

    /// Ids on disk the index doesn't have yet.
    pub fn missing(&self) -> impl Iterator<Item = &str> {
        self.ids_with(Presence::Missing)
    }

    pub fn found(&self) -> impl Iterator<Item = &str> {
        self.ids_with(Presence::Found)
    }

    /// Index ids whose file no longer exists.
    pub fn evictable(&self) -> &[String] {
        &self.evictable
    }

    fn ids_with(&self, wanted: Presence) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .filter(move |(_, p)| **p == wanted)
            .map(|(id, _)| id.as_str())
    }
}

/// Diffs a file list against index records in one call.
pub fn diff<'a>(
    files: &BTreeSet<String>,
    records: impl IntoIterator<Item = &'a FileRecord>,
) -> PresenceMap {
    let mut map = PresenceMap::seed(files);
    map.sweep(records);
    map
}
