//! Durable progress of a batch session
//!
//! One JSON file per (session, platform):
//! `{checkpoint_dir}/{platform}_{session}_checkpoint.json`

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::atomic::write_bytes_atomic;
use crate::error::CheckpointError;
use crate::key::{normalize_platform, normalize_session};

/// Free-form metadata stored with a checkpoint.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub session_name: String,
    pub platform: String,
    /// Completed keywords in completion order.
    pub completed_keywords: Vec<String>,
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Checkpoint {
    pub fn is_completed(&self, keyword: &str) -> bool {
        self.completed_keywords.iter().any(|k| k == keyword)
    }

    /// String list stored under `field`; empty when absent or mistyped.
    pub fn metadata_list(&self, field: &str) -> Vec<String> {
        self.metadata
            .get(field)
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn metadata_u64(&self, field: &str) -> Option<u64> {
        self.metadata.get(field).and_then(|v| v.as_u64())
    }
}

/// Where batch progress lives. `save` always receives the full completed
/// list; there is no partial update.
pub trait CheckpointStore {
    fn load(&self, session: &str, platform: &str) -> Result<Option<Checkpoint>, CheckpointError>;

    /// Overwrite the checkpoint for (session, platform). Returns what was stored.
    fn save(
        &self,
        session: &str,
        platform: &str,
        completed_keywords: &[String],
        metadata: Metadata,
    ) -> Result<Checkpoint, CheckpointError>;
}

pub fn checkpoint_file_name(platform: &str, session: &str) -> String {
    format!(
        "{}_{}_checkpoint.json",
        normalize_platform(platform),
        normalize_session(session)
    )
}

fn build(session: &str, platform: &str, completed: &[String], metadata: Metadata) -> Checkpoint {
    Checkpoint {
        session_name: session.to_string(),
        platform: platform.to_string(),
        completed_keywords: completed.to_vec(),
        last_updated: Utc::now(),
        metadata,
    }
}

/// JSON files in one directory, replaced atomically on every save.
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, session: &str, platform: &str) -> PathBuf {
        self.dir.join(checkpoint_file_name(platform, session))
    }

    fn read_file(path: &Path) -> Result<Option<Checkpoint>, CheckpointError> {
        let bytes = match fs::read(path) {
            Ok(b) => b,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(CheckpointError::Io {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| CheckpointError::Corrupt {
                path: path.to_path_buf(),
                message: e.to_string(),
            })
    }

    /// Every readable checkpoint in the directory, oldest update first.
    /// Unreadable files are skipped with a warning.
    pub fn list(&self) -> Result<Vec<Checkpoint>, CheckpointError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(CheckpointError::Io {
                    path: self.dir.clone(),
                    source: e,
                })
            }
        };

        let mut checkpoints = Vec::new();
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.ends_with("_checkpoint.json") {
                continue;
            }
            match Self::read_file(&entry.path()) {
                Ok(Some(cp)) => checkpoints.push(cp),
                Ok(None) => {}
                Err(e) => log::warn!("skipping {name}: {e}"),
            }
        }
        checkpoints.sort_by(|a, b| a.last_updated.cmp(&b.last_updated));
        Ok(checkpoints)
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn load(&self, session: &str, platform: &str) -> Result<Option<Checkpoint>, CheckpointError> {
        Self::read_file(&self.path_for(session, platform))
    }

    fn save(
        &self,
        session: &str,
        platform: &str,
        completed_keywords: &[String],
        metadata: Metadata,
    ) -> Result<Checkpoint, CheckpointError> {
        let path = self.path_for(session, platform);
        let checkpoint = build(session, platform, completed_keywords, metadata);
        let json = serde_json::to_vec_pretty(&checkpoint).map_err(|e| CheckpointError::Io {
            path: path.clone(),
            source: e.into(),
        })?;
        write_bytes_atomic(&path, &json).map_err(|e| CheckpointError::Io {
            path: path.clone(),
            source: e,
        })?;
        log::debug!(
            "checkpoint {}: {} completed",
            path.display(),
            checkpoint.completed_keywords.len()
        );
        Ok(checkpoint)
    }
}

/// In-process store with the same contract.
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    entries: Mutex<HashMap<String, Checkpoint>>,
    saves: Mutex<usize>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful `save` calls so far.
    pub fn save_count(&self) -> usize {
        *self.saves.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert(&self, checkpoint: Checkpoint) {
        let name = checkpoint_file_name(&checkpoint.platform, &checkpoint.session_name);
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, checkpoint);
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn load(&self, session: &str, platform: &str) -> Result<Option<Checkpoint>, CheckpointError> {
        Ok(self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&checkpoint_file_name(platform, session))
            .cloned())
    }

    fn save(
        &self,
        session: &str,
        platform: &str,
        completed_keywords: &[String],
        metadata: Metadata,
    ) -> Result<Checkpoint, CheckpointError> {
        let checkpoint = build(session, platform, completed_keywords, metadata);
        self.insert(checkpoint.clone());
        *self.saves.lock().unwrap_or_else(PoisonError::into_inner) += 1;
        Ok(checkpoint)
    }
}
