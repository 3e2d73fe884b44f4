//! `keyharvest scrape` - single keyword, cache-or-fetch

use anyhow::{Context, Result};
use clap::Args;
use keyharvest_batch::SourceAdapter;
use keyharvest_core::{RecordSet, fmt_num};
use keyharvest_store::{CacheBackend, CacheKey, normalize_platform};

use super::{dedup_field_for, open_adapter, open_cache, preview, table};
use crate::config::Config;

#[derive(Args, Debug)]
pub struct ScrapeArgs {
    /// Search keyword
    #[arg(short, long)]
    pub keyword: String,

    /// Maximum records to fetch
    #[arg(short, long, default_value_t = 50)]
    pub limit: usize,

    /// Source platform
    #[arg(short, long, default_value = "bluesky")]
    pub platform: String,

    /// Cache format: csv, json or duckdb
    #[arg(long)]
    pub backend: Option<String>,

    /// Fetch even when a cached artifact exists
    #[arg(long)]
    pub refresh: bool,

    /// Records to preview
    #[arg(long, default_value_t = 10)]
    pub show: usize,
}

pub fn run(args: ScrapeArgs, config: &Config) -> Result<()> {
    let platform = normalize_platform(&args.platform);
    let cache = open_cache(config, args.backend.as_deref())?;
    let dedup_field = dedup_field_for(&platform)?;
    let key = cache.key(&platform, &args.keyword);

    let cached = if args.refresh {
        None
    } else {
        cached_records(&cache, &key, dedup_field)?
    };

    let (records, source) = match cached {
        Some(records) => (records, "cache"),
        None => {
            let adapter = open_adapter(&platform, config)?;
            let records =
                fetch_and_store(adapter.as_ref(), &cache, &key, &args.keyword, args.limit)?;
            (records, "fetched")
        }
    };

    eprintln!(
        "{}: {} records ({source}) in {}",
        args.keyword,
        fmt_num(records.len()),
        cache.path_for(&key).display()
    );
    print_preview(&records, args.show);
    Ok(())
}

/// A non-empty cached artifact, `None` on a miss or corruption.
fn cached_records(
    cache: &dyn CacheBackend,
    key: &CacheKey,
    dedup_field: &str,
) -> Result<Option<RecordSet>> {
    match cache.read(key, dedup_field) {
        Ok(Some(records)) if !records.is_empty() => Ok(Some(records)),
        Ok(_) => Ok(None),
        Err(e) if e.is_corruption() => {
            log::warn!("{e}; fetching again");
            Ok(None)
        }
        Err(e) => Err(e).context("cannot read cache"),
    }
}

fn fetch_and_store(
    adapter: &dyn SourceAdapter,
    cache: &dyn CacheBackend,
    key: &CacheKey,
    keyword: &str,
    limit: usize,
) -> Result<RecordSet> {
    let mut records = adapter
        .fetch(keyword, limit)
        .with_context(|| format!("fetching '{keyword}' failed"))?;
    records.dedup();
    cache
        .write(key, &records)
        .with_context(|| format!("cannot write {key}"))?;
    Ok(records)
}

fn print_preview(records: &RecordSet, show: usize) {
    if show == 0 || records.is_empty() {
        return;
    }
    let mut table = table(&["Author", "Created", "Text"]);
    for record in records.iter().take(show) {
        table.add_row(vec![
            record.get("author").to_string(),
            record.get("created_at").to_string(),
            preview(&record.get("text").to_string(), 80),
        ]);
    }
    eprintln!("\n{table}");
    if records.len() > show {
        eprintln!("... {} more", fmt_num(records.len() - show));
    }
}
