//! Enumerate cache artifacts on disk

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::key::{BackendKind, display_keyword};

/// One `<platform>_<keyword>.<ext>` file in a cache directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactEntry {
    pub platform: String,
    /// Normalized keyword as it appears in the file name.
    pub keyword: String,
    /// File extension, e.g. `csv`.
    pub format: String,
    pub size: u64,
    pub path: PathBuf,
}

impl ArtifactEntry {
    pub fn display_keyword(&self) -> String {
        display_keyword(&self.keyword)
    }

    /// Backend able to read this artifact, if the extension is known.
    pub fn backend(&self) -> Option<BackendKind> {
        BackendKind::from_extension(&self.format)
    }
}

/// Split a file name into (platform, keyword, extension).
///
/// Only the first `_` separates platform from keyword, so keywords may
/// themselves contain `_`.
pub fn parse_artifact_name(name: &str) -> Option<(&str, &str, &str)> {
    let (stem, ext) = name.rsplit_once('.')?;
    let (platform, keyword) = stem.split_once('_')?;
    if platform.is_empty() || keyword.is_empty() || ext.is_empty() {
        return None;
    }
    Some((platform, keyword, ext))
}

/// List artifacts in `dir`, sorted by file name. Staging `.tmp` files and
/// names that do not parse are skipped. A missing directory lists as empty.
pub fn list_artifacts(dir: &Path) -> io::Result<Vec<ArtifactEntry>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut artifacts = Vec::new();
    for entry in entries {
        let entry = entry?;
        let meta = entry.metadata()?;
        if !meta.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.ends_with(".tmp") || name.ends_with(".wal") {
            continue;
        }
        let Some((platform, keyword, ext)) = parse_artifact_name(&name) else {
            log::debug!("ignoring {name}: not a cache artifact");
            continue;
        };
        artifacts.push(ArtifactEntry {
            platform: platform.to_string(),
            keyword: keyword.to_string(),
            format: ext.to_string(),
            size: meta.len(),
            path: entry.path(),
        });
    }

    artifacts.sort_by(|a, b| a.path.file_name().cmp(&b.path.file_name()));
    Ok(artifacts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_splits_on_first_separator() {
        assert_eq!(
            parse_artifact_name("bluesky_hamas_funding.csv"),
            Some(("bluesky", "hamas_funding", "csv"))
        );
        assert_eq!(
            parse_artifact_name("bluesky_ctf_dataset_merged.json"),
            Some(("bluesky", "ctf_dataset_merged", "json"))
        );
    }

    #[test]
    fn parse_rejects_unseparated() {
        assert_eq!(parse_artifact_name("readme.md"), None);
        assert_eq!(parse_artifact_name("bluesky_fatf"), None);
        assert_eq!(parse_artifact_name("_fatf.csv"), None);
    }

    #[test]
    fn list_sorted_with_sizes() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("reddit_b.json"), "{}").unwrap();
        fs::write(dir.path().join("bluesky_counter_terrorism.csv"), "abc").unwrap();
        fs::write(dir.path().join("bluesky_x.csv.tmp"), "").unwrap();
        fs::write(dir.path().join("notes"), "").unwrap();
        fs::create_dir(dir.path().join("sub_dir.d")).unwrap();

        let list = list_artifacts(dir.path()).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].platform, "bluesky");
        assert_eq!(list[0].keyword, "counter_terrorism");
        assert_eq!(list[0].display_keyword(), "counter terrorism");
        assert_eq!(list[0].size, 3);
        assert_eq!(list[0].backend(), Some(BackendKind::Delimited));
        assert_eq!(list[1].format, "json");
    }

    #[test]
    fn missing_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(list_artifacts(&dir.path().join("cache")).unwrap().is_empty());
    }
}
