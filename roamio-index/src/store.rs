use roamio_core::FileRecord;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("index I/O error at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("corrupted index '{path}': {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// What `load` found on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    /// An existing index was read.
    Loaded,
    /// There was no index yet; an empty one was created.
    Created,
}

/// Persistence for the note index.
///
/// Mutations are staged in memory and only become visible to other
/// readers on `commit`, which must replace the stored index atomically.
pub trait IndexStore: Send {
    /// Loads every record, creating an empty index if none exists.
    fn load(&mut self) -> Result<LoadState, StoreError>;

    /// Returns all records, ordered by id.
    fn list(&self) -> Vec<&FileRecord>;

    fn get(&self, id: &str) -> Option<&FileRecord>;

    /// Inserts or wholesale replaces the record with the same id.
    fn upsert(&mut self, record: FileRecord) -> Result<(), StoreError>;

    /// Removes a record, returning it if it was present.
    fn remove(&mut self, id: &str) -> Result<Option<FileRecord>, StoreError>;

    /// Persists the staged index.
    fn commit(&mut self) -> Result<(), StoreError>;
}

/// Index kept as a pretty-printed JSON object `id -> FileRecord`.
pub struct JsonIndexStore {
    path: PathBuf,
    records: BTreeMap<String, FileRecord>,
}

impl JsonIndexStore {
    /// Creates a store for the given file. Nothing is read until `load`.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            records: BTreeMap::new(),
        }
    }

    /// Creates a store and loads it in one go.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<(Self, LoadState), StoreError> {
        let mut store = Self::new(path);
        let state = store.load()?;
        Ok((store, state))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn write_atomic(&self, bytes: &[u8]) -> Result<(), StoreError> {
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "index".to_string());
        let tmp_path = self.path.with_file_name(format!("{}.tmp", file_name));

        let mut file = fs::File::create(&tmp_path).map_err(|e| StoreError::io(&tmp_path, e))?;
        file.write_all(bytes)
            .and_then(|_| file.sync_all())
            .map_err(|e| StoreError::io(&tmp_path, e))?;
        drop(file);

        if let Err(e) = fs::rename(&tmp_path, &self.path) {
            if let Err(cleanup) = fs::remove_file(&tmp_path) {
                warn!("Failed to remove {}: {}", tmp_path.display(), cleanup);
            }
            return Err(StoreError::io(&self.path, e));
        }
        Ok(())
    }
}

impl IndexStore for JsonIndexStore {
    fn load(&mut self) -> Result<LoadState, StoreError> {
        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("'{}' index doesn't exist. Creating it.", self.path.display());
                self.records.clear();
                self.commit()?;
                return Ok(LoadState::Created);
            }
            Err(e) => return Err(StoreError::io(&self.path, e)),
        };

        self.records = if data.iter().all(u8::is_ascii_whitespace) {
            BTreeMap::new()
        } else {
            serde_json::from_slice(&data).map_err(|e| StoreError::Json {
                path: self.path.clone(),
                source: e,
            })?
        };

        info!(
            "Found index {} ({} records)",
            self.path.display(),
            self.records.len()
        );
        Ok(LoadState::Loaded)
    }

    fn list(&self) -> Vec<&FileRecord> {
        self.records.values().collect()
    }

    fn get(&self, id: &str) -> Option<&FileRecord> {
        self.records.get(id)
    }

    fn upsert(&mut self, record: FileRecord) -> Result<(), StoreError> {
        debug!("Upserting {}", record.id);
        self.records.insert(record.id.clone(), record);
        Ok(())
    }

    fn remove(&mut self, id: &str) -> Result<Option<FileRecord>, StoreError> {
        Ok(self.records.remove(id))
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        let mut bytes = serde_json::to_vec_pretty(&self.records).map_err(|e| StoreError::Json {
            path: self.path.clone(),
            source: e,
        })?;
        bytes.push(b'\n');
        self.write_atomic(&bytes)?;
        debug!("Committed {} records to {}", self.records.len(), self.path.display());
        Ok(())
    }
}
