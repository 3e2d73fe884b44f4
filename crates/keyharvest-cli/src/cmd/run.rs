//! `keyharvest run` - resumable batch over a keyword list, then merge

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use comfy_table::{Cell, Color};
use keyharvest_batch::{BatchReport, BatchRunner, KeyStatus};
use keyharvest_core::{ProgressContext, fmt_num};
use keyharvest_store::{
    CacheBackend, CacheKey, FileCache, MergeOutput, cleanup_tmp_files, merge_all,
    normalize_platform,
};

use super::{checkpoint_store, open_adapter, open_cache, preview, table};
use crate::config::Config;

/// Exit code of a run stopped by SIGINT/SIGTERM.
const EXIT_INTERRUPTED: u8 = 130;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Session name; progress is checkpointed per (session, platform)
    #[arg(short, long)]
    pub session: Option<String>,

    /// Source platform
    #[arg(short, long, default_value = "bluesky")]
    pub platform: String,

    /// Keyword to collect (repeatable)
    #[arg(short, long = "keyword")]
    pub keywords: Vec<String>,

    /// File with one keyword per line ('#' starts a comment)
    #[arg(long)]
    pub keywords_file: Option<PathBuf>,

    /// Maximum records per keyword
    #[arg(long)]
    pub max_records: Option<usize>,

    /// Seconds to wait between keywords
    #[arg(long)]
    pub pacing: Option<f64>,

    /// Cache format: csv, json or duckdb
    #[arg(long)]
    pub backend: Option<String>,

    /// Records buffered before each incremental cache write
    #[arg(long)]
    pub flush_interval: Option<usize>,

    /// Merged output file (default: <platform>_<session>_merged.<ext> in the cache)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Skip merging completed keywords after the batch
    #[arg(long)]
    pub no_merge: bool,
}

pub fn run(args: RunArgs, config: &Config, progress: &ProgressContext) -> Result<ExitCode> {
    let keywords = collect_keywords(&args.keywords, args.keywords_file.as_deref())?;
    anyhow::ensure!(
        !keywords.is_empty(),
        "no keywords given (use --keyword or --keywords-file)"
    );

    let session = args.session.unwrap_or_else(|| config.batch.session.clone());
    let platform = normalize_platform(&args.platform);
    let max_records = args.max_records.unwrap_or(config.batch.max_records_per_key);
    let pacing_secs = args.pacing.unwrap_or(config.batch.pacing_secs);
    let pacing = Duration::try_from_secs_f64(pacing_secs)
        .with_context(|| format!("invalid pacing: {pacing_secs}"))?;
    let flush_interval = args.flush_interval.unwrap_or(config.batch.flush_interval);

    let cache = open_cache(config, args.backend.as_deref())?;
    let checkpoints = checkpoint_store(config);
    match cleanup_tmp_files(cache.dir()) {
        Ok(0) => {}
        Ok(n) => log::info!("removed {n} stale temp files from {}", cache.dir().display()),
        Err(e) => log::warn!("cannot clean {}: {e}", cache.dir().display()),
    }

    let adapter = open_adapter(&platform, config)?;

    log::info!(
        "session '{session}' on {platform}: {} keywords, up to {max_records} records each, {} cache",
        keywords.len(),
        cache.kind()
    );
    let report = BatchRunner::new(&cache, &checkpoints, adapter.as_ref())
        .with_flush_interval(flush_interval)
        .with_progress(progress)
        .run(&session, &platform, keywords, max_records, pacing)
        .context("batch aborted")?;

    print_report(&report);

    if report.interrupted {
        eprintln!(
            "Interrupted: {} keywords left. Re-run the same command to resume.",
            report.remaining()
        );
        return Ok(ExitCode::from(EXIT_INTERRUPTED));
    }

    if !args.no_merge {
        let output = match args.output {
            Some(path) => MergeOutput::Path(path),
            None => MergeOutput::Session(session.clone()),
        };
        merge_completed(&cache, &report, adapter.dedup_field(), &output)?;
    }

    if !report.failed.is_empty() {
        eprintln!(
            "{} keywords failed; they will be retried on the next run of session '{session}'.",
            report.failed.len()
        );
    }
    Ok(ExitCode::SUCCESS)
}

/// Keywords from `--keywords-file` followed by `--keyword` flags, blank and
/// comment lines dropped. Repeats are removed by the runner.
pub fn collect_keywords(flags: &[String], file: Option<&Path>) -> Result<Vec<String>> {
    let mut keywords = Vec::new();
    if let Some(path) = file {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read keywords file: {}", path.display()))?;
        keywords.extend(
            content
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty() && !l.starts_with('#'))
                .map(str::to_string),
        );
    }
    keywords.extend(
        flags
            .iter()
            .map(|k| k.trim())
            .filter(|k| !k.is_empty())
            .map(str::to_string),
    );
    Ok(keywords)
}

pub(crate) fn merge_completed(
    cache: &FileCache,
    report: &BatchReport,
    dedup_field: &str,
    output: &MergeOutput,
) -> Result<()> {
    let merged = merge_all(
        cache,
        &report.platform,
        &report.completed_keywords,
        dedup_field,
        output,
    )
    .context("merge failed")?;

    if merged.is_empty() {
        eprintln!("Nothing to merge.");
        return Ok(());
    }
    let target = match output {
        MergeOutput::Path(path) => path.clone(),
        MergeOutput::Session(session) => {
            cache.path_for(&CacheKey::consolidated(&report.platform, session, cache.kind()))
        }
    };
    eprintln!(
        "Merged {} keywords into {} unique records: {}",
        report.completed_keywords.len(),
        fmt_num(merged.len()),
        target.display()
    );
    Ok(())
}

fn status_cell(status: KeyStatus) -> Cell {
    let color = match status {
        KeyStatus::Reused => Color::Blue,
        KeyStatus::Fetched => Color::Green,
        KeyStatus::Empty => Color::DarkGrey,
        KeyStatus::Failed => Color::Red,
    };
    Cell::new(status).fg(color)
}

fn print_report(report: &BatchReport) {
    if !report.outcomes.is_empty() {
        let mut table = table(&["Keyword", "Status", "Records", "Error"]);
        for outcome in &report.outcomes {
            table.add_row(vec![
                Cell::new(&outcome.keyword),
                status_cell(outcome.status),
                Cell::new(fmt_num(outcome.records)),
                Cell::new(preview(outcome.error.as_deref().unwrap_or(""), 60)),
            ]);
        }
        eprintln!("\n{table}");
    }

    eprintln!(
        "{} keywords: {} already completed, {} processed ({} reused, {} failed), {} records in {:.1}s",
        report.total_keys,
        report.already_completed,
        report.newly_processed,
        report.reused.len(),
        report.failed.len(),
        fmt_num(report.total_records),
        report.elapsed.as_secs_f64()
    );
}
