//! `keyharvest merge` - consolidate a session's completed keywords

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use keyharvest_core::fmt_num;
use keyharvest_store::{
    CacheBackend, CacheKey, CheckpointStore, MergeOutput, merge_all, normalize_platform,
};

use super::{checkpoint_store, dedup_field_for, open_cache};
use crate::config::Config;

#[derive(Args, Debug)]
pub struct MergeArgs {
    /// Session whose completed keywords are merged
    #[arg(short, long)]
    pub session: Option<String>,

    #[arg(short, long, default_value = "bluesky")]
    pub platform: String,

    /// Output file (default: <platform>_<session>_merged.<ext> in the cache)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Cache format: csv, json or duckdb
    #[arg(long)]
    pub backend: Option<String>,
}

pub fn run(args: MergeArgs, config: &Config) -> Result<()> {
    let session = args.session.unwrap_or_else(|| config.batch.session.clone());
    let platform = normalize_platform(&args.platform);
    let dedup_field = dedup_field_for(&platform)?;
    let cache = open_cache(config, args.backend.as_deref())?;

    let checkpoint = checkpoint_store(config)
        .load(&session, &platform)
        .context("cannot load checkpoint")?
        .with_context(|| format!("no checkpoint for session '{session}' on {platform}"))?;

    let output = match args.output {
        Some(path) => MergeOutput::Path(path),
        None => MergeOutput::Session(session.clone()),
    };
    let merged = merge_all(
        &cache,
        &platform,
        &checkpoint.completed_keywords,
        dedup_field,
        &output,
    )
    .context("merge failed")?;

    if merged.is_empty() {
        eprintln!("No cached artifacts for the completed keywords of '{session}'.");
        return Ok(());
    }

    let target = match output {
        MergeOutput::Path(path) => path,
        MergeOutput::Session(session) => {
            cache.path_for(&CacheKey::consolidated(&platform, &session, cache.kind()))
        }
    };
    eprintln!(
        "Merged {} keywords into {} unique records: {}",
        checkpoint.completed_keywords.len(),
        fmt_num(merged.len()),
        target.display()
    );
    Ok(())
}
