//! Cache backends: one read/write/append contract over three serializations
//!
//! ```text
//! {cache_dir}/
//! ├── bluesky_fatf.csv          # delimited
//! ├── bluesky_hamas_funding.json # document
//! └── bluesky_isis.duckdb       # relational
//! ```

mod delimited;
mod document;
mod relational;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use keyharvest_core::{RecordSet, ValueKind};

use crate::atomic::{tmp_path, write_atomic};
use crate::error::CacheError;
use crate::key::{BackendKind, CacheKey};

/// Persistence of one [`RecordSet`] per [`CacheKey`].
pub trait CacheBackend {
    /// Serialization used for keys built by [`CacheBackend::key`].
    fn kind(&self) -> BackendKind;

    /// `Ok(None)` when no artifact exists. Corruption is an error the caller
    /// is expected to downgrade to a miss.
    fn read(&self, key: &CacheKey, dedup_field: &str) -> Result<Option<RecordSet>, CacheError>;

    /// Replace the artifact for `key` wholesale. Readers never observe a
    /// partially written artifact.
    fn write(&self, key: &CacheKey, records: &RecordSet) -> Result<(), CacheError>;

    /// Serialize `records` to an arbitrary path with this backend's format.
    fn export(&self, path: &Path, records: &RecordSet) -> Result<(), CacheError>;

    /// Merge `records` into the stored artifact, dedup (last wins) and write
    /// the result back. Returns the stored record count.
    ///
    /// A corrupt artifact is replaced.
    fn append(&self, key: &CacheKey, records: RecordSet) -> Result<usize, CacheError> {
        let mut merged = match self.read(key, records.dedup_field()) {
            Ok(Some(existing)) => existing,
            Ok(None) => RecordSet::new(records.dedup_field()),
            Err(e) if e.is_corruption() => {
                log::warn!("{e}; replacing artifact");
                RecordSet::new(records.dedup_field())
            }
            Err(e) => return Err(e),
        };
        merged.extend(records);
        let removed = merged.dedup();
        if removed > 0 {
            log::debug!("{key}: {removed} duplicate records collapsed");
        }
        self.write(key, &merged)?;
        Ok(merged.len())
    }

    fn key(&self, platform: &str, keyword: &str) -> CacheKey {
        CacheKey::new(platform, keyword, self.kind())
    }
}

/// Column names with their persisted kind, in column order.
pub(crate) fn column_kinds(records: &RecordSet) -> Vec<(&str, ValueKind)> {
    records
        .columns()
        .iter()
        .map(|c| (c.as_str(), ValueKind::infer(records.column_values(c))))
        .collect()
}

/// Decode one artifact file. `Ok(None)` when it does not exist.
pub fn read_artifact(
    kind: BackendKind,
    path: &Path,
    dedup_field: &str,
) -> Result<Option<RecordSet>, CacheError> {
    match kind {
        BackendKind::Delimited => delimited::read(path, dedup_field),
        BackendKind::Document => document::read(path, dedup_field),
        BackendKind::Relational => relational::read(path, dedup_field),
    }
}

/// Atomically replace `path` with the serialized `records`.
pub fn write_artifact(
    kind: BackendKind,
    path: &Path,
    records: &RecordSet,
) -> Result<(), CacheError> {
    let result = write_atomic(path, |tmp| match kind {
        BackendKind::Delimited => delimited::write(tmp, records),
        BackendKind::Document => document::write(tmp, records),
        BackendKind::Relational => relational::write(tmp, records),
    });
    if kind == BackendKind::Relational {
        relational::remove_wal(&tmp_path(path));
    }
    result
}

/// File-per-key cache under one directory.
#[derive(Debug, Clone)]
pub struct FileCache {
    dir: PathBuf,
    kind: BackendKind,
}

impl FileCache {
    pub fn new(dir: impl Into<PathBuf>, kind: BackendKind) -> Self {
        Self {
            dir: dir.into(),
            kind,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(key.file_name())
    }
}

impl CacheBackend for FileCache {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn read(&self, key: &CacheKey, dedup_field: &str) -> Result<Option<RecordSet>, CacheError> {
        read_artifact(key.kind(), &self.path_for(key), dedup_field)
    }

    fn write(&self, key: &CacheKey, records: &RecordSet) -> Result<(), CacheError> {
        write_artifact(key.kind(), &self.path_for(key), records)
    }

    fn export(&self, path: &Path, records: &RecordSet) -> Result<(), CacheError> {
        write_artifact(self.kind, path, records)
    }
}

/// In-process cache with the same contract, keyed by artifact file name.
#[derive(Debug)]
pub struct MemoryCache {
    kind: BackendKind,
    entries: Mutex<HashMap<String, RecordSet>>,
}

impl MemoryCache {
    pub fn new(kind: BackendKind) -> Self {
        Self {
            kind,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.lock().contains_key(&key.file_name())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, RecordSet>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(BackendKind::Document)
    }
}

impl CacheBackend for MemoryCache {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn read(&self, key: &CacheKey, dedup_field: &str) -> Result<Option<RecordSet>, CacheError> {
        Ok(self
            .lock()
            .get(&key.file_name())
            .map(|set| set.clone().with_dedup_field(dedup_field)))
    }

    fn write(&self, key: &CacheKey, records: &RecordSet) -> Result<(), CacheError> {
        self.lock().insert(key.file_name(), records.clone());
        Ok(())
    }

    fn export(&self, path: &Path, records: &RecordSet) -> Result<(), CacheError> {
        write_artifact(self.kind, path, records)
    }
}
