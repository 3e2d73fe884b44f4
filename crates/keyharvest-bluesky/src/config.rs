//! Bluesky adapter configuration

use std::time::Duration;

use keyharvest_batch::AdapterError;

pub const DEFAULT_SERVICE_URL: &str = "https://bsky.social";

/// Runtime configuration for the Bluesky adapter (plain struct; the CLI
/// fills it from its TOML section and the environment).
#[derive(Debug, Clone)]
pub struct Config {
    pub service_url: String,
    /// Handle or DID used to log in.
    pub identifier: Option<String>,
    pub app_password: Option<String>,
    /// Posts requested per search call. The API caps this at 100.
    pub page_size: usize,
    pub page_pause: Duration,
    /// Retryable failures in a row before a keyword is given up.
    pub max_consecutive_errors: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_url: DEFAULT_SERVICE_URL.to_string(),
            identifier: None,
            app_password: None,
            page_size: 25,
            page_pause: Duration::from_secs(2),
            max_consecutive_errors: 3,
        }
    }
}

impl Config {
    /// Read credentials from `BLUESKY_USERNAME` / `BLUESKY_APP_PASSWORD`
    /// where none are set.
    pub fn with_env_credentials(mut self) -> Self {
        if self.identifier.is_none() {
            self.identifier = std::env::var("BLUESKY_USERNAME").ok();
        }
        if self.app_password.is_none() {
            self.app_password = std::env::var("BLUESKY_APP_PASSWORD").ok();
        }
        self
    }

    /// Wait after a retryable failure.
    pub fn retry_wait(&self) -> Duration {
        self.page_pause.saturating_mul(2)
    }

    /// Credentials, or a configuration error naming what is missing.
    pub fn credentials(&self) -> Result<(&str, &str), AdapterError> {
        let identifier = non_empty(self.identifier.as_deref());
        let password = non_empty(self.app_password.as_deref());
        match (identifier, password) {
            (Some(id), Some(pw)) => Ok((id, pw)),
            (None, _) => Err(AdapterError::Configuration(
                "Bluesky handle not set (bluesky.handle or BLUESKY_USERNAME)".into(),
            )),
            (_, None) => Err(AdapterError::Configuration(
                "Bluesky app password not set (bluesky.app_password or BLUESKY_APP_PASSWORD)"
                    .into(),
            )),
        }
    }

    pub(crate) fn validate(&self) -> Result<(), AdapterError> {
        self.credentials()?;
        if self.page_size == 0 || self.page_size > 100 {
            return Err(AdapterError::Configuration(format!(
                "page_size must be within 1..=100, got {}",
                self.page_size
            )));
        }
        if self.max_consecutive_errors == 0 {
            return Err(AdapterError::Configuration(
                "max_consecutive_errors must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub(crate) fn base_url(&self) -> &str {
        self.service_url.trim_end_matches('/')
    }
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_credentials() -> Config {
        Config {
            identifier: Some("alice.bsky.social".into()),
            app_password: Some("xxxx-xxxx".into()),
            ..Config::default()
        }
    }

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.page_size, 25);
        assert_eq!(config.max_consecutive_errors, 3);
        assert_eq!(config.retry_wait(), Duration::from_secs(4));
    }

    #[test]
    fn missing_credentials_are_configuration_errors() {
        let err = Config::default().validate().unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("handle"));

        let blank = Config {
            app_password: Some("  ".into()),
            ..with_credentials()
        };
        assert!(blank.validate().unwrap_err().to_string().contains("password"));
    }

    #[test]
    fn page_size_bounds() {
        let config = Config {
            page_size: 101,
            ..with_credentials()
        };
        assert!(config.validate().is_err());
        assert!(with_credentials().validate().is_ok());
    }

    #[test]
    fn base_url_trims_slash() {
        let config = Config {
            service_url: "https://example.social/".into(),
            ..Config::default()
        };
        assert_eq!(config.base_url(), "https://example.social");
    }
}
