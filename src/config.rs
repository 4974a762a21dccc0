use crate::local_db::FileMedium;
use crate::offline::BackoffStrategy;
use crate::remote::Credentials;
use crate::shared::config::{AppConfig, AppConfigBuilder, ConfigError};
use std::path::PathBuf;

/// Default server URL
const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:3000";

/// Environment variable holding the backend URL
pub const SERVER_URL_VAR: &str = "CLIENT_API_URL";
/// Environment variable pointing at a TOML config file
pub const CONFIG_PATH_VAR: &str = "ESTATE_SYNC_CONFIG";
/// Environment variable holding an initial bearer token
pub const TOKEN_VAR: &str = "ESTATE_SYNC_TOKEN";
/// Environment variable overriding the storage directory
pub const DATA_DIR_VAR: &str = "ESTATE_SYNC_DATA_DIR";

/// Application configuration wrapper.
///
/// Pairs the validated engine settings with the credential slot shared by
/// every remote adapter built from it.
#[derive(Debug, Clone)]
pub struct Config {
    app: AppConfig,
    credentials: Credentials,
}

impl Default for Config {
    fn default() -> Self {
        match Self::from_env() {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("[Config] ignoring environment, using defaults: {}", e);
                Self {
                    app: AppConfig::default(),
                    credentials: Credentials::default(),
                }
            }
        }
    }
}

impl Config {
    /// Create a new configuration from the environment, falling back to defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the configuration from the environment
    ///
    /// `ESTATE_SYNC_CONFIG` names a TOML file read first; `CLIENT_API_URL`
    /// and `ESTATE_SYNC_DATA_DIR` override it.
    pub fn from_env() -> Result<Self, ConfigError> {
        let base = match std::env::var(CONFIG_PATH_VAR) {
            Ok(path) => AppConfig::from_file(path)?,
            Err(_) => AppConfig::default(),
        };
        let mut builder = AppConfigBuilder::from_config(base);
        if let Ok(url) = std::env::var(SERVER_URL_VAR) {
            builder = builder.server_url(url);
        }
        if let Ok(dir) = std::env::var(DATA_DIR_VAR) {
            builder = builder.storage_dir(dir);
        }
        let mut config = Self::with_builder(builder)?;
        if let Ok(token) = std::env::var(TOKEN_VAR) {
            config.set_token(Some(token));
        }
        Ok(config)
    }

    pub fn with_builder(builder: AppConfigBuilder) -> Result<Self, ConfigError> {
        let app = builder.build()?;
        Ok(Self {
            app,
            credentials: Credentials::default(),
        })
    }

    /// Validated engine settings
    pub fn app(&self) -> &AppConfig {
        &self.app
    }

    /// Handle to the shared credential slot
    pub fn credentials(&self) -> Credentials {
        self.credentials.clone()
    }

    /// Set the bearer token
    pub fn set_token(&mut self, token: Option<String>) {
        match token {
            Some(token) => self.credentials.set(token),
            None => self.credentials.clear(),
        }
    }

    /// Get the bearer token
    pub fn get_token(&self) -> Option<String> {
        self.credentials.token()
    }

    /// Clear the token (logout)
    pub fn clear_token(&mut self) {
        self.credentials.clear();
    }

    /// Get the full URL for an API endpoint
    pub fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.server_url().trim_end_matches('/'), path)
    }

    pub fn server_url(&self) -> &str {
        self.app.server_url.as_deref().unwrap_or(DEFAULT_SERVER_URL)
    }

    /// Retry backoff for the offline queue
    pub fn backoff(&self) -> BackoffStrategy {
        BackoffStrategy::from_config(&self.app)
    }

    /// Directory of the device-local store
    pub fn storage_dir(&self) -> PathBuf {
        self.app
            .storage_dir
            .clone()
            .unwrap_or_else(FileMedium::default_root)
    }
}
