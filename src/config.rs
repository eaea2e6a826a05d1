//! Configuration loading
//!
//! Settings come from an optional TOML file, then environment overrides.
//! The provider credential is never hard-coded.

use crate::error::{AppError, Result};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};

pub const ALPHAVANTAGE_URL: &str = "https://www.alphavantage.co/query";

/// Environment variable holding the Alpha Vantage credential
pub const API_KEY_ENV: &str = "ALPHAVANTAGE_API_KEY";

/// Environment variable overriding the database location
pub const DB_PATH_ENV: &str = "VOLCAST_DB_PATH";

/// Top-level configuration
#[derive(Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

/// Market data provider settings
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Client-side request budget; Alpha Vantage's free tier allows 5/min
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout(),
            requests_per_minute: default_requests_per_minute(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("volatility_data.db")
}

fn default_log_filter() -> String {
    "volcast=info".into()
}

fn default_base_url() -> String {
    ALPHAVANTAGE_URL.into()
}

fn default_timeout() -> u64 {
    30
}

fn default_requests_per_minute() -> u32 {
    5
}

impl Config {
    /// Configuration with the given credential and defaults elsewhere
    pub fn new(api_key: impl Into<String>, db_path: impl Into<PathBuf>) -> Self {
        Self {
            api_key: api_key.into(),
            db_path: db_path.into(),
            provider: ProviderConfig::default(),
            log_filter: default_log_filter(),
        }
    }

    /// Parse a TOML document without consulting the environment
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)
            .map_err(|e| AppError::Config(format!("invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file, then apply environment overrides
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let mut config: Config = toml::from_str(&contents)
            .map_err(|e| AppError::Config(format!("invalid configuration: {}", e)))?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Build configuration from the environment alone
    pub fn from_env() -> Result<Self> {
        let mut config = Config::new(String::new(), default_db_path());
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(key) = std::env::var(API_KEY_ENV) {
            if !key.trim().is_empty() {
                self.api_key = key;
            }
        }
        if let Ok(path) = std::env::var(DB_PATH_ENV) {
            if !path.trim().is_empty() {
                self.db_path = PathBuf::from(path);
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(AppError::Config(format!(
                "api_key is required (set it in the config file or {})",
                API_KEY_ENV
            )));
        }
        if self.provider.timeout_secs == 0 {
            return Err(AppError::Config("provider.timeout_secs must be > 0".into()));
        }
        if self.provider.requests_per_minute == 0 {
            return Err(AppError::Config(
                "provider.requests_per_minute must be > 0".into(),
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("api_key", &"<redacted>")
            .field("db_path", &self.db_path)
            .field("provider", &self.provider)
            .field("log_filter", &self.log_filter)
            .finish()
    }
}
