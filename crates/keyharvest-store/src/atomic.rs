//! Write-then-rename helpers
//!
//! Every artifact and checkpoint is produced under `<name>.tmp` next to its
//! final path and renamed over it once fully written, so readers never see
//! a half-written file.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::CacheError;

/// `<path>.tmp`
pub fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Produce `path` through `write`, which receives the staging path.
///
/// On failure the staging file is removed and `path` is left untouched.
pub(crate) fn write_atomic<F>(path: &Path, write: F) -> Result<(), CacheError>
where
    F: FnOnce(&Path) -> Result<(), CacheError>,
{
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| CacheError::io(parent, e))?;
    }
    let tmp = tmp_path(path);
    remove_if_exists(&tmp).map_err(|e| CacheError::io(&tmp, e))?;

    if let Err(e) = write(&tmp) {
        let _ = remove_if_exists(&tmp);
        return Err(e);
    }

    fs::rename(&tmp, path).map_err(|e| {
        let _ = remove_if_exists(&tmp);
        CacheError::io(path, e)
    })
}

/// Atomically replace `path` with `bytes`.
pub fn write_bytes_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let tmp = tmp_path(path);
    if let Err(e) = fs::write(&tmp, bytes).and_then(|()| fs::rename(&tmp, path)) {
        let _ = remove_if_exists(&tmp);
        return Err(e);
    }
    Ok(())
}

pub(crate) fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Remove stale `.tmp` files left behind by an interrupted write, along
/// with the `.tmp.wal` DuckDB keeps next to an unfinished staging database.
///
/// Returns the number of files removed. A missing directory counts as clean.
pub fn cleanup_tmp_files(dir: &Path) -> io::Result<usize> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };

    let mut count = 0;
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let stale = name.ends_with(".tmp") || name.ends_with(".tmp.wal");
        if stale && entry.path().is_file() {
            log::info!("cleaning stale tmp: {name}");
            fs::remove_file(entry.path())?;
            count += 1;
        }
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tmp_path_appends_suffix() {
        assert_eq!(
            tmp_path(Path::new("/data/bluesky_fatf.csv")),
            PathBuf::from("/data/bluesky_fatf.csv.tmp")
        );
    }

    #[test]
    fn failed_write_keeps_previous_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.csv");
        fs::write(&path, "old").unwrap();

        let result = write_atomic(&path, |tmp| {
            fs::write(tmp, "partial").unwrap();
            Err(CacheError::encode(tmp, "boom"))
        });

        assert!(result.is_err());
        assert_eq!(fs::read_to_string(&path).unwrap(), "old");
        assert!(!tmp_path(&path).exists());
    }

    #[test]
    fn successful_write_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/a.json");
        write_atomic(&path, |tmp| fs::write(tmp, "new").map_err(|e| CacheError::io(tmp, e)))
            .unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "new");
    }

    #[test]
    fn bytes_atomic_creates_parent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoints/x.json");
        write_bytes_atomic(&path, b"{}").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"{}");
    }

    #[test]
    fn cleanup_removes_only_tmp_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("bluesky_a.csv"), "").unwrap();
        fs::write(dir.path().join("bluesky_b.csv.tmp"), "").unwrap();
        fs::write(dir.path().join("bluesky_c.duckdb.tmp"), "").unwrap();

        assert_eq!(cleanup_tmp_files(dir.path()).unwrap(), 2);
        assert!(dir.path().join("bluesky_a.csv").exists());
        assert_eq!(cleanup_tmp_files(dir.path()).unwrap(), 0);
    }

    #[test]
    fn cleanup_removes_staging_wal() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("bluesky_c.duckdb.tmp"), "").unwrap();
        fs::write(dir.path().join("bluesky_c.duckdb.tmp.wal"), "").unwrap();
        fs::write(dir.path().join("bluesky_d.duckdb.wal"), "").unwrap();

        assert_eq!(cleanup_tmp_files(dir.path()).unwrap(), 2);
        assert!(!dir.path().join("bluesky_c.duckdb.tmp.wal").exists());
        assert!(dir.path().join("bluesky_d.duckdb.wal").exists());
    }

    #[test]
    fn cleanup_missing_dir_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(cleanup_tmp_files(&dir.path().join("nope")).unwrap(), 0);
    }
}
