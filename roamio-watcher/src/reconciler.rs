//! Index reconciliation.
//!
//! One pass loads the persisted index, diffs it against the live file
//! list, indexes new notes, evicts notes that are gone from disk and
//! commits the result. Per-note failures are logged and skipped; only
//! load, enumeration and commit failures abort the pass.

use crate::context::WatchContext;
use crate::error::ReconcileError;
use roamio_core::{ExtractError, FileRecord, MetadataExtractor, NorgExtractor, NoteMeta};
use roamio_index::{diff, IndexStore, LoadState, PresenceMap};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Result of one reconciliation pass.
#[derive(Debug, Clone)]
pub struct ReconcileReport {
    /// Whether the index existed before this pass.
    pub load_state: LoadState,

    /// Number of tracked files found on disk.
    pub files_seen: usize,

    /// Records created for newly discovered notes.
    pub inserted: usize,

    /// Notes already present in the index.
    pub found: usize,

    /// Records removed because their note is gone.
    pub evicted: usize,

    /// Notes that couldn't be indexed or evicted, with the reason.
    pub errors: Vec<(String, String)>,

    /// Time taken in milliseconds.
    pub duration_ms: u64,
}

/// Metadata extracted for one missing id.
type Extracted = (String, PathBuf, Result<NoteMeta, ExtractError>);

#[derive(Clone)]
pub struct Reconciler {
    root: PathBuf,
    extractor: Arc<dyn MetadataExtractor>,
}

impl Reconciler {
    /// Reconciler for Norg notes under `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_extractor(root, Arc::new(NorgExtractor))
    }

    pub fn with_extractor(root: impl Into<PathBuf>, extractor: Arc<dyn MetadataExtractor>) -> Self {
        Self {
            root: root.into(),
            extractor,
        }
    }

    /// Runs a full pass: load, enumerate the watch set, diff, reconcile, commit.
    pub async fn reconcile(
        &self,
        context: &WatchContext,
        store: &mut dyn IndexStore,
    ) -> Result<ReconcileReport, ReconcileError> {
        let start = Instant::now();
        let load_state = load(store)?;

        let files = context.enumerate().await?;
        let plan = diff(&files, store.list());

        let extractor = self.extractor.clone();
        let root = self.root.clone();
        let missing = missing_ids(&plan);
        let extracted = tokio::task::spawn_blocking(move || {
            extract_all(extractor.as_ref(), &root, missing)
        })
        .await
        .map_err(|e| ReconcileError::Task(e.to_string()))?;

        self.finish(store, load_state, &files, &plan, extracted, start)
    }

    /// Runs a pass against a file list the caller already enumerated.
    pub fn run(
        &self,
        store: &mut dyn IndexStore,
        files: &BTreeSet<String>,
    ) -> Result<ReconcileReport, ReconcileError> {
        let start = Instant::now();
        let load_state = load(store)?;

        let plan = diff(files, store.list());
        let extracted = extract_all(self.extractor.as_ref(), &self.root, missing_ids(&plan));

        self.finish(store, load_state, files, &plan, extracted, start)
    }

    fn finish(
        &self,
        store: &mut dyn IndexStore,
        load_state: LoadState,
        files: &BTreeSet<String>,
        plan: &PresenceMap,
        extracted: Vec<Extracted>,
        start: Instant,
    ) -> Result<ReconcileReport, ReconcileError> {
        let mut report = ReconcileReport {
            load_state,
            files_seen: files.len(),
            inserted: 0,
            found: plan.found().count(),
            evicted: 0,
            errors: Vec::new(),
            duration_ms: 0,
        };

        for (id, address, meta) in extracted {
            let meta = match meta {
                Ok(meta) => meta,
                Err(e) => {
                    warn!("Error extracting metadata from {}: {}", address.display(), e);
                    report.errors.push((id, e.to_string()));
                    continue;
                }
            };

            let record = FileRecord::from_meta(id.clone(), &address, meta);
            match store.upsert(record) {
                Ok(()) => report.inserted += 1,
                Err(e) => {
                    warn!("Error inserting {} into index: {}", id, e);
                    report.errors.push((id, e.to_string()));
                }
            }
        }

        for id in plan.evictable() {
            match store.remove(id) {
                Ok(_) => {
                    debug!("Evicted {}", id);
                    report.evicted += 1;
                }
                Err(e) => {
                    warn!("Error evicting {} from index: {}", id, e);
                    report.errors.push((id.clone(), e.to_string()));
                }
            }
        }

        store.commit()?;

        let duration = start.elapsed();
        report.duration_ms = duration.as_millis() as u64;

        info!(
            "Reconciled {} files: {} new, {} found, {} evicted in {:?}",
            report.files_seen, report.inserted, report.found, report.evicted, duration
        );

        Ok(report)
    }
}

fn load(store: &mut dyn IndexStore) -> Result<LoadState, ReconcileError> {
    let state = store.load()?;
    if state == LoadState::Created {
        warn!("No cache found, building index from scratch");
    }
    Ok(state)
}

fn missing_ids(plan: &PresenceMap) -> Vec<String> {
    plan.missing().map(str::to_string).collect()
}

fn extract_all(extractor: &dyn MetadataExtractor, root: &Path, ids: Vec<String>) -> Vec<Extracted> {
    ids.into_iter()
        .map(|id| {
            let address = id.split('/').fold(root.to_path_buf(), |p, part| p.join(part));
            let meta = extractor.extract(&address);
            (id, address, meta)
        })
        .collect()
}
