//! Configuration loading and management for policypal.
//!
//! Loads settings from `policypal.toml` with an environment variable override
//! for the service endpoint. Every section has defaults, so a missing file is
//! not an error.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variable overriding `service.base_url`
pub const SERVICE_URL_ENV: &str = "POLICYPAL_SERVICE_URL";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("invalid service url {0}: {1}")]
    InvalidServiceUrl(String, url::ParseError),
}

/// Remote summarisation service
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Base URL; `/summarise` and `/analyze` are resolved against it
    pub base_url: String,
    /// Client-side request timeout. The server gives up at 480 seconds.
    pub timeout_secs: u64,
}

/// Page fetching and payload limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScraperConfig {
    /// Hard cap on the characters sent to the service
    pub max_chars: usize,
    /// Timeout for fetching the page itself
    pub timeout_secs: u64,
}

/// Storage paths configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Base path for data storage
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub scraper: ScraperConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from the default location (policypal.toml in cwd or home)
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match Self::find_config_file() {
            Some(path) => Self::parse_file(&path)?,
            None => Config::default(),
        };
        config.apply_env();
        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::parse_file(path)?;
        config.apply_env();
        Ok(config)
    }

    fn parse_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    fn apply_env(&mut self) {
        if let Ok(base_url) = std::env::var(SERVICE_URL_ENV) {
            self.service.base_url = base_url;
        }
    }

    /// Find the config file in standard locations
    fn find_config_file() -> Option<PathBuf> {
        let local_config = PathBuf::from("policypal.toml");
        if local_config.exists() {
            return Some(local_config);
        }

        let home_config = dirs::home_dir()?
            .join(".config")
            .join("policypal")
            .join("policypal.toml");
        home_config.exists().then_some(home_config)
    }

    /// Parsed service base URL
    pub fn service_url(&self) -> Result<url::Url, ConfigError> {
        url::Url::parse(&self.service.base_url)
            .map_err(|e| ConfigError::InvalidServiceUrl(self.service.base_url.clone(), e))
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: "https://summarise.0x978.com".to_string(),
            timeout_secs: crate::eta::TIMEOUT_SECS,
        }
    }
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            max_chars: crate::scraper::MAX_PAYLOAD_CHARS,
            timeout_secs: 30,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
