//! `keyharvest cache` - list artifacts, remove stale temp files

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use comfy_table::{Cell, CellAlignment};
use keyharvest_store::{ArtifactEntry, cleanup_tmp_files, list_artifacts, normalize_platform};

use super::{fmt_size, table};
use crate::config::Config;

#[derive(Args, Debug)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub action: CacheAction,
}

#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// List cached artifacts
    List {
        /// Only this platform
        #[arg(short, long)]
        platform: Option<String>,
    },
    /// Remove temp files left behind by interrupted writes
    Clean,
}

pub fn run(args: CacheArgs, config: &Config) -> Result<()> {
    match args.action {
        CacheAction::List { platform } => list(config, platform.as_deref()),
        CacheAction::Clean => clean(config),
    }
}

fn list(config: &Config, platform: Option<&str>) -> Result<()> {
    let dir = config.storage.cache_dir();
    let mut entries = list_artifacts(&dir)
        .with_context(|| format!("cannot list {}", dir.display()))?;
    if let Some(platform) = platform {
        let platform = normalize_platform(platform);
        entries.retain(|e| e.platform == platform);
    }

    if entries.is_empty() {
        eprintln!("No cached artifacts in {}.", dir.display());
        return Ok(());
    }

    let mut table = table(&["Platform", "Keyword", "Format", "Size"]);
    for entry in &entries {
        table.add_row(vec![
            Cell::new(&entry.platform),
            Cell::new(entry.display_keyword()),
            Cell::new(&entry.format),
            Cell::new(fmt_size(entry.size)).set_alignment(CellAlignment::Right),
        ]);
    }
    eprintln!("\n{table}");
    eprintln!(
        "{} artifacts, {} total",
        entries.len(),
        fmt_size(total_size(&entries))
    );
    Ok(())
}

fn total_size(entries: &[ArtifactEntry]) -> u64 {
    entries.iter().map(|e| e.size).sum()
}

fn clean(config: &Config) -> Result<()> {
    let mut removed = 0;
    for dir in [config.storage.cache_dir(), config.storage.checkpoint_dir()] {
        removed += cleanup_tmp_files(&dir)
            .with_context(|| format!("cannot clean {}", dir.display()))?;
    }
    if removed == 0 {
        eprintln!("Nothing to clean up.");
    } else {
        eprintln!("Removed {removed} stale temp files.");
    }
    Ok(())
}
