//! Dashboard configuration.
//!
//! Settings are read once at startup from `~/.pm2-dashboard/config.json`,
//! merged over the built-in defaults, and never change afterwards. A missing
//! file is fine; a malformed one is not.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_PASSWORD: &str = "admin";
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_UPDATE_INTERVAL_MS: u64 = 5000;

/// Environment variable that overrides the configured port.
pub const PORT_ENV: &str = "PORT";

const MIN_UPDATE_INTERVAL_MS: u64 = 100;
const MAX_UPDATE_INTERVAL_MS: u64 = 3_600_000;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("password must not be empty")]
    EmptyPassword,

    #[error("port must be greater than 0")]
    InvalidPort,

    #[error("updateInterval must be between 100 and 3600000 ms, got {0}")]
    InvalidUpdateInterval(u64),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    /// Shared secret for the HTTP API and the WebSocket channel.
    pub password: String,

    /// Listening port.
    pub port: u16,

    /// Push period for live process updates, in milliseconds.
    pub update_interval: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            password: DEFAULT_PASSWORD.to_string(),
            port: DEFAULT_PORT,
            update_interval: DEFAULT_UPDATE_INTERVAL_MS,
        }
    }
}

/// `~/.pm2-dashboard/config.json`, if a home directory can be determined.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".pm2-dashboard").join("config.json"))
}

impl Config {
    /// Reads `path` and merges it over the defaults. A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::info!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Applies a `PORT`-style override. `None` leaves the port untouched.
    pub fn with_port_override(mut self, value: Option<&str>) -> Result<Self> {
        if let Some(raw) = value {
            self.port = raw
                .trim()
                .parse()
                .with_context(|| format!("{} is not a valid port: {:?}", PORT_ENV, raw))?;
        }
        Ok(self)
    }

    /// Builds the effective configuration: `cli_port` beats `env_port`,
    /// which beats the file, which beats the defaults.
    pub fn resolve(path: &Path, env_port: Option<&str>, cli_port: Option<u16>) -> Result<Self> {
        let mut config = Self::load_from(path)?.with_port_override(env_port)?;
        if let Some(port) = cli_port {
            config.port = port;
        }
        config.validate().context("Invalid configuration")?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.password.is_empty() {
            return Err(ConfigError::EmptyPassword);
        }
        if self.port == 0 {
            return Err(ConfigError::InvalidPort);
        }
        if !(MIN_UPDATE_INTERVAL_MS..=MAX_UPDATE_INTERVAL_MS).contains(&self.update_interval) {
            return Err(ConfigError::InvalidUpdateInterval(self.update_interval));
        }
        Ok(())
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.update_interval)
    }

    pub fn uses_default_password(&self) -> bool {
        self.password == DEFAULT_PASSWORD
    }
}
