//! Application configuration module
//!
//! Provides the validated settings of the synchronization engine. Values come
//! from a builder, a TOML document, or both (TOML first, builder overrides).
//!
//! ```toml
//! server_url = "https://api.example.com"
//! request_timeout_ms = 10000
//! backoff_base_ms = 1000
//! backoff_cap_ms = 60000
//! pull_on_reconnect = true
//! pull_entity_types = ["Property", "Contact"]
//! ```

use crate::shared::entity::EntityType;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default per-call remote timeout
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;
/// First retry delay
pub const DEFAULT_BACKOFF_BASE_MS: u64 = 1_000;
/// Longest retry delay
pub const DEFAULT_BACKOFF_CAP_MS: u64 = 60_000;

/// Application configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    /// Server URL
    pub server_url: Option<String>,
    /// Deadline for each remote call, in milliseconds
    pub request_timeout_ms: u64,
    /// Base of the exponential retry backoff, in milliseconds
    pub backoff_base_ms: u64,
    /// Cap of the exponential retry backoff, in milliseconds
    pub backoff_cap_ms: u64,
    /// Directory of the device-local store; `None` uses the platform data dir
    pub storage_dir: Option<PathBuf>,
    /// Fetch remote collections after the queue drained
    pub pull_on_reconnect: bool,
    /// Collections fetched on pull
    pub pull_entity_types: Vec<EntityType>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server_url: None,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            backoff_base_ms: DEFAULT_BACKOFF_BASE_MS,
            backoff_cap_ms: DEFAULT_BACKOFF_CAP_MS,
            storage_dir: None,
            pull_on_reconnect: true,
            pull_entity_types: EntityType::ALL.to_vec(),
        }
    }
}

impl AppConfig {
    /// Create a new AppConfigBuilder
    pub fn builder() -> AppConfigBuilder {
        AppConfigBuilder::default()
    }

    /// Parse a TOML document; missing keys keep their defaults
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&source)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(url) = &self.server_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::InvalidUrl(url.clone()));
            }
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "request_timeout_ms",
                message: "must be greater than zero".to_string(),
            });
        }
        if self.backoff_base_ms == 0 || self.backoff_cap_ms < self.backoff_base_ms {
            return Err(ConfigError::InvalidValue {
                key: "backoff_cap_ms",
                message: format!(
                    "backoff cap {} must be >= base {} > 0",
                    self.backoff_cap_ms, self.backoff_base_ms
                ),
            });
        }
        Ok(())
    }

    /// Remote call deadline
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Builder for AppConfig
#[derive(Debug, Default)]
pub struct AppConfigBuilder {
    base: Option<AppConfig>,
    server_url: Option<String>,
    request_timeout_ms: Option<u64>,
    backoff: Option<(u64, u64)>,
    storage_dir: Option<PathBuf>,
    pull_on_reconnect: Option<bool>,
}

impl AppConfigBuilder {
    /// Start from an existing configuration (e.g. one read from TOML)
    pub fn from_config(config: AppConfig) -> Self {
        Self {
            base: Some(config),
            ..Self::default()
        }
    }

    /// Set the server URL
    pub fn server_url(mut self, url: impl Into<String>) -> Self {
        self.server_url = Some(url.into());
        self
    }

    /// Set the per-call remote timeout
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    /// Set the retry backoff base and cap
    pub fn backoff(mut self, base: Duration, cap: Duration) -> Self {
        self.backoff = Some((base.as_millis() as u64, cap.as_millis() as u64));
        self
    }

    /// Set the storage directory
    pub fn storage_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.storage_dir = Some(dir.into());
        self
    }

    /// Enable or disable the post-drain pull
    pub fn pull_on_reconnect(mut self, enabled: bool) -> Self {
        self.pull_on_reconnect = Some(enabled);
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<AppConfig, ConfigError> {
        let mut config = self.base.unwrap_or_default();
        if let Some(url) = self.server_url {
            config.server_url = Some(url);
        }
        if let Some(timeout) = self.request_timeout_ms {
            config.request_timeout_ms = timeout;
        }
        if let Some((base, cap)) = self.backoff {
            config.backoff_base_ms = base;
            config.backoff_cap_ms = cap;
        }
        if let Some(dir) = self.storage_dir {
            config.storage_dir = Some(dir);
        }
        if let Some(pull) = self.pull_on_reconnect {
            config.pull_on_reconnect = pull;
        }
        config.validate()?;
        Ok(config)
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: &'static str, message: String },
    #[error("config file error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),
}
