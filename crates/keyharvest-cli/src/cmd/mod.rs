//! Subcommands and the plumbing they share

pub mod cache;
pub mod merge;
pub mod run;
pub mod scrape;
pub mod status;

use anyhow::{Context, Result};
use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};
use keyharvest_batch::SourceAdapter;
use keyharvest_bluesky::BlueskyAdapter;
use keyharvest_store::{FileCache, FileCheckpointStore, normalize_platform};

use crate::config::Config;

/// Cache in `<data_dir>/cache` using the configured (or overridden) backend.
pub fn open_cache(config: &Config, backend: Option<&str>) -> Result<FileCache> {
    let kind = config.storage.backend_kind(backend)?;
    Ok(FileCache::new(config.storage.cache_dir(), kind))
}

pub fn checkpoint_store(config: &Config) -> FileCheckpointStore {
    FileCheckpointStore::new(config.storage.checkpoint_dir())
}

/// Adapter for `platform`, logged in so credential problems stop the
/// command before any keyword is attempted.
pub fn open_adapter(platform: &str, config: &Config) -> Result<Box<dyn SourceAdapter>> {
    match normalize_platform(platform).as_str() {
        keyharvest_bluesky::PLATFORM => {
            let adapter = BlueskyAdapter::new(config.bluesky.adapter_config())
                .context("invalid Bluesky configuration")?;
            adapter.login().context("Bluesky login failed")?;
            Ok(Box::new(adapter))
        }
        other => anyhow::bail!("unsupported platform '{other}' (available: bluesky)"),
    }
}

/// Dedup field of a platform's records, without opening a session.
pub fn dedup_field_for(platform: &str) -> Result<&'static str> {
    match normalize_platform(platform).as_str() {
        keyharvest_bluesky::PLATFORM => Ok(keyharvest_bluesky::DEDUP_FIELD),
        other => anyhow::bail!("unsupported platform '{other}' (available: bluesky)"),
    }
}

/// Table with the shared look and a cyan header row.
pub fn table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(
            headers
                .iter()
                .map(|h| Cell::new(h).fg(Color::Cyan))
                .collect::<Vec<_>>(),
        );
    table
}

/// Human-readable byte size.
pub fn fmt_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

/// Cut `text` to `max` characters on one line.
pub fn preview(text: &str, max: usize) -> String {
    let flat: String = text
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect();
    if flat.chars().count() <= max {
        flat
    } else {
        let mut cut: String = flat.chars().take(max.saturating_sub(1)).collect();
        cut.push('…');
        cut
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes() {
        assert_eq!(fmt_size(512), "512 B");
        assert_eq!(fmt_size(2048), "2.0 KiB");
        assert_eq!(fmt_size(5 * 1024 * 1024), "5.0 MiB");
    }

    #[test]
    fn previews() {
        assert_eq!(preview("short", 10), "short");
        assert_eq!(preview("line\nbreak", 20), "line break");
        assert_eq!(preview("abcdefghij", 5), "abcd…");
    }

    #[test]
    fn dedup_fields() {
        assert_eq!(dedup_field_for("Bluesky").unwrap(), "uri");
        assert!(dedup_field_for("mastodon").is_err());
    }

    #[test]
    fn unknown_platform_rejected() {
        let err = open_adapter("myspace", &Config::default()).err().unwrap();
        assert!(err.to_string().contains("unsupported platform"));
    }
}
