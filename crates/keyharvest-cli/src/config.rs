//! Configuration loading from TOML files

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use keyharvest_store::BackendKind;
use serde::Deserialize;

/// Global configuration for keyharvest
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub batch: BatchConfig,
    pub bluesky: BlueskyConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// `cache/` and `checkpoints/` live below this directory
    pub data_dir: PathBuf,
    /// csv | json | duckdb
    pub backend: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            backend: "csv".to_string(),
        }
    }
}

impl StorageConfig {
    pub fn cache_dir(&self) -> PathBuf {
        self.data_dir.join("cache")
    }

    pub fn checkpoint_dir(&self) -> PathBuf {
        self.data_dir.join("checkpoints")
    }

    /// Backend from `--backend` if given, else from the config file.
    pub fn backend_kind(&self, overridden: Option<&str>) -> Result<BackendKind> {
        let name = overridden.unwrap_or(&self.backend);
        BackendKind::from_name(name)
            .with_context(|| format!("unknown backend '{name}' (expected csv, json or duckdb)"))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Session used when `--session` is omitted
    pub session: String,
    pub max_records_per_key: usize,
    pub pacing_secs: f64,
    pub flush_interval: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            session: "ctf_dataset".to_string(),
            max_records_per_key: 5000,
            pacing_secs: 5.0,
            flush_interval: keyharvest_batch::DEFAULT_FLUSH_INTERVAL,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BlueskyConfig {
    pub service_url: String,
    #[serde(deserialize_with = "deserialize_env_var")]
    pub handle: Option<String>,
    #[serde(deserialize_with = "deserialize_env_var")]
    pub app_password: Option<String>,
    pub page_size: usize,
    pub page_pause_ms: u64,
    pub max_consecutive_errors: u32,
}

impl Default for BlueskyConfig {
    fn default() -> Self {
        Self {
            service_url: keyharvest_bluesky::config::DEFAULT_SERVICE_URL.to_string(),
            handle: std::env::var("BLUESKY_USERNAME").ok(),
            app_password: std::env::var("BLUESKY_APP_PASSWORD").ok(),
            page_size: 25,
            page_pause_ms: 2000,
            max_consecutive_errors: 3,
        }
    }
}

impl BlueskyConfig {
    /// Adapter settings; credentials fall back to the environment.
    pub fn adapter_config(&self) -> keyharvest_bluesky::Config {
        keyharvest_bluesky::Config {
            service_url: self.service_url.clone(),
            identifier: self.handle.clone(),
            app_password: self.app_password.clone(),
            page_size: self.page_size,
            page_pause: Duration::from_millis(self.page_pause_ms),
            max_consecutive_errors: self.max_consecutive_errors,
        }
        .with_env_credentials()
    }
}

/// Deserialize a string that may contain environment variable reference like ${VAR}
fn deserialize_env_var<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt: Option<String> = Option::deserialize(deserializer)?;
    Ok(opt.and_then(|s| expand_env_var(&s)))
}

/// Expand ${VAR} to environment variable value
fn expand_env_var(s: &str) -> Option<String> {
    if let Some(var_name) = s.strip_prefix("${").and_then(|s| s.strip_suffix('}')) {
        std::env::var(var_name).ok()
    } else {
        Some(s.to_string())
    }
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Search order:
    /// 1. ./keyharvest.toml (current directory)
    /// 2. ~/.config/keyharvest/config.toml
    ///
    /// If no config file found, returns default config.
    pub fn load() -> Result<Self> {
        let local_config = PathBuf::from("keyharvest.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(dirs) = directories::ProjectDirs::from("", "", "keyharvest") {
            let user_config = dirs.config_dir().join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        log::debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }
}
