//! keyharvest - checkpointed keyword collection from social platforms
//!
//! Runs resumable keyword batches against a platform search API, caches one
//! artifact per keyword and merges a session's results into one dataset.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

mod cmd;
mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "keyharvest")]
#[command(about = "Checkpointed keyword collection from social platforms")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Config file path (default: ./keyharvest.toml or ~/.config/keyharvest/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Data directory holding cache/ and checkpoints/
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Collect a keyword list into the cache, resuming from the checkpoint
    Run(cmd::run::RunArgs),
    /// Fetch one keyword, or return it from the cache
    Scrape(cmd::scrape::ScrapeArgs),
    /// Merge a session's completed keywords into one artifact
    Merge(cmd::merge::MergeArgs),
    /// Show checkpoint progress
    Status(cmd::status::StatusArgs),
    /// Inspect and clean the cache
    Cache(cmd::cache::CacheArgs),
    /// Show current configuration
    Config,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let progress = keyharvest_core::ProgressContext::new();

    // Logging:
    //   TTY:     quiet (warn) unless --debug  - the progress bar shows activity
    //   non-TTY: info unless --debug          - logs are the only progress indicator
    let is_tty = progress.is_tty();
    let multi = if is_tty { Some(progress.multi()) } else { None };
    let quiet = is_tty && !cli.debug;
    keyharvest_core::init_logging(quiet, cli.debug, multi).context("failed to init logging")?;

    keyharvest_core::install_signal_handlers().context("failed to install signal handlers")?;

    let mut config = if let Some(path) = cli.config {
        Config::from_file(&path)?
    } else {
        Config::load()?
    };
    if let Some(dir) = cli.data_dir {
        config.storage.data_dir = dir;
    }

    match cli.command {
        Command::Run(args) => cmd::run::run(args, &config, &progress),
        Command::Scrape(args) => cmd::scrape::run(args, &config).map(|()| ExitCode::SUCCESS),
        Command::Merge(args) => cmd::merge::run(args, &config).map(|()| ExitCode::SUCCESS),
        Command::Status(args) => cmd::status::run(args, &config).map(|()| ExitCode::SUCCESS),
        Command::Cache(args) => cmd::cache::run(args, &config).map(|()| ExitCode::SUCCESS),
        Command::Config => {
            print_config(&config);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn print_config(config: &Config) {
    let bluesky = &config.bluesky;
    let mut table = cmd::table(&["Setting", "Value"]);

    table.add_row(vec![
        "Data directory",
        &config.storage.data_dir.display().to_string(),
    ]);
    table.add_row(vec!["Cache backend", &config.storage.backend]);
    table.add_row(vec!["Default session", &config.batch.session]);
    table.add_row(vec![
        "Max records per keyword",
        &config.batch.max_records_per_key.to_string(),
    ]);
    table.add_row(vec![
        "Pacing",
        &format!("{}s", config.batch.pacing_secs),
    ]);
    table.add_row(vec![
        "Flush interval",
        &format!("{} records", config.batch.flush_interval),
    ]);
    table.add_row(vec!["Bluesky service", &bluesky.service_url]);
    table.add_row(vec![
        "Bluesky handle",
        bluesky.handle.as_deref().unwrap_or("not set"),
    ]);
    table.add_row(vec![
        "Bluesky app password",
        if bluesky.app_password.is_some() {
            "configured"
        } else {
            "not set"
        },
    ]);
    table.add_row(vec![
        "Bluesky paging",
        &format!(
            "{} per page, {}ms pause, give up after {} errors",
            bluesky.page_size, bluesky.page_pause_ms, bluesky.max_consecutive_errors
        ),
    ]);

    eprintln!("\n{table}");
}
