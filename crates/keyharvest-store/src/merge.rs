//! Consolidate per-key artifacts into one deduplicated dataset

use std::path::PathBuf;

use keyharvest_core::RecordSet;

use crate::backend::CacheBackend;
use crate::error::CacheError;
use crate::key::CacheKey;

/// Destination of the consolidated artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutput {
    /// `<platform>_<session>_merged.<ext>` inside the cache.
    Session(String),
    /// Caller-supplied file, serialized with the cache's backend format.
    Path(PathBuf),
}

/// Read every keyword's artifact in order, concatenate, dedup across the
/// whole concatenation (last wins) and write the result to `output`.
///
/// Absent and corrupt artifacts are skipped with a warning. When nothing
/// was found, nothing is written and the returned set is empty.
pub fn merge_all<C, K>(
    cache: &C,
    platform: &str,
    keywords: K,
    dedup_field: &str,
    output: &MergeOutput,
) -> Result<RecordSet, CacheError>
where
    C: CacheBackend + ?Sized,
    K: IntoIterator,
    K::Item: AsRef<str>,
{
    let mut merged = RecordSet::new(dedup_field);
    let mut found = 0usize;

    for keyword in keywords {
        let keyword = keyword.as_ref();
        let key = cache.key(platform, keyword);
        match cache.read(&key, dedup_field) {
            Ok(Some(set)) => {
                log::debug!("merge: {key} ({} records)", set.len());
                merged.extend(set);
                found += 1;
            }
            Ok(None) => log::warn!("merge: no cached artifact for '{keyword}', skipping"),
            Err(e) => log::warn!("merge: skipping '{keyword}': {e}"),
        }
    }

    if found == 0 {
        log::warn!("merge: no artifacts found, nothing written");
        return Ok(merged);
    }

    let before = merged.len();
    let removed = merged.dedup();
    log::info!(
        "merge: {found} artifacts, {before} records, {removed} duplicates, {} unique",
        merged.len()
    );

    match output {
        MergeOutput::Session(session) => {
            let key = CacheKey::consolidated(platform, session, cache.kind());
            cache.write(&key, &merged)?;
            log::info!("merge: wrote {key}");
        }
        MergeOutput::Path(path) => {
            cache.export(path, &merged)?;
            log::info!("merge: wrote {}", path.display());
        }
    }
    Ok(merged)
}
