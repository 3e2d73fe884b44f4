//! keyharvest-store: cache artifacts and checkpoints
//!
//! Per-keyword record sets are persisted through a [`CacheBackend`]
//! (CSV, JSON document or DuckDB file), batch progress through a
//! [`CheckpointStore`]. All file writes go through a `.tmp` file and a
//! rename.

mod atomic;
mod backend;
mod checkpoint;
mod error;
mod key;
mod listing;
mod merge;

pub use atomic::{cleanup_tmp_files, tmp_path, write_bytes_atomic};
pub use backend::{CacheBackend, FileCache, MemoryCache, read_artifact, write_artifact};
pub use checkpoint::{
    Checkpoint, CheckpointStore, FileCheckpointStore, MemoryCheckpointStore, Metadata,
    checkpoint_file_name,
};
pub use error::{CacheError, CheckpointError};
pub use key::{
    BackendKind, CacheKey, display_keyword, normalize_keyword, normalize_platform,
    normalize_session,
};
pub use listing::{ArtifactEntry, list_artifacts, parse_artifact_name};
pub use merge::{MergeOutput, merge_all};
