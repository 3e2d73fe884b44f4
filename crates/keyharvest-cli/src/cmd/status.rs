//! `keyharvest status` - inspect checkpoints

use anyhow::{Context, Result};
use clap::Args;
use comfy_table::Cell;
use keyharvest_store::{Checkpoint, CheckpointStore, normalize_platform};

use super::{checkpoint_store, table};
use crate::config::Config;

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Session to show (default: list every checkpoint)
    #[arg(short, long)]
    pub session: Option<String>,

    #[arg(short, long, default_value = "bluesky")]
    pub platform: String,
}

pub fn run(args: StatusArgs, config: &Config) -> Result<()> {
    let store = checkpoint_store(config);
    match args.session {
        Some(session) => {
            let platform = normalize_platform(&args.platform);
            let checkpoint = store
                .load(&session, &platform)
                .context("cannot load checkpoint")?;
            match checkpoint {
                Some(cp) => show(&cp),
                None => eprintln!("No checkpoint for session '{session}' on {platform}."),
            }
        }
        None => {
            let checkpoints = store.list().context("cannot list checkpoints")?;
            if checkpoints.is_empty() {
                eprintln!("No checkpoints in {}.", store.dir().display());
            } else {
                list(&checkpoints);
            }
        }
    }
    Ok(())
}

fn updated(cp: &Checkpoint) -> String {
    cp.last_updated.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

fn count(cp: &Checkpoint, field: &str) -> String {
    cp.metadata_u64(field)
        .map_or_else(|| "-".to_string(), |n| n.to_string())
}

fn list(checkpoints: &[Checkpoint]) {
    let mut table = table(&["Session", "Platform", "Completed", "Remaining", "Records", "Updated"]);
    for cp in checkpoints {
        table.add_row(vec![
            Cell::new(&cp.session_name),
            Cell::new(&cp.platform),
            Cell::new(cp.completed_keywords.len()),
            Cell::new(count(cp, "remaining_keywords")),
            Cell::new(count(cp, "total_records")),
            Cell::new(updated(cp)),
        ]);
    }
    eprintln!("\n{table}");
}

fn show(cp: &Checkpoint) {
    let failed = cp.metadata_list("failed_keywords");
    let partial = cp.metadata_list("partial_keywords");

    let mut summary = table(&["Field", "Value"]);
    summary.add_row(vec!["Session", &cp.session_name]);
    summary.add_row(vec!["Platform", &cp.platform]);
    summary.add_row(vec!["Last updated", &updated(cp)]);
    summary.add_row(vec!["Completed", &cp.completed_keywords.len().to_string()]);
    summary.add_row(vec!["Total keywords (last run)", &count(cp, "total_keywords")]);
    summary.add_row(vec!["Remaining (last run)", &count(cp, "remaining_keywords")]);
    summary.add_row(vec!["Records (last run)", &count(cp, "total_records")]);
    summary.add_row(vec!["Failed (last run)", &failed.join(", ")]);
    summary.add_row(vec!["Interrupted fetches", &partial.join(", ")]);
    eprintln!("\n{summary}");

    if !cp.completed_keywords.is_empty() {
        let mut done = table(&["#", "Completed keyword"]);
        for (i, keyword) in cp.completed_keywords.iter().enumerate() {
            done.add_row(vec![Cell::new(i + 1), Cell::new(keyword)]);
        }
        eprintln!("{done}");
    }
}
