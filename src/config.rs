//! Application configuration management.
//!
//! This module handles loading and saving the client configuration,
//! which covers the API base URL and the local data directory used by
//! the credential store.
//!
//! Configuration is stored at `~/.config/miqat/config.json`. The
//! `MIQAT_API_URL` environment variable overrides the configured base
//! URL, which is how device builds point at a LAN development server.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application name used for config/data directory paths
const APP_NAME: &str = "miqat";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Default API base URL (local development server)
const DEFAULT_API_BASE_URL: &str = "http://localhost:5000/api";

/// Environment variable overriding the API base URL
const API_URL_ENV: &str = "MIQAT_API_URL";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not determine a platform config directory")]
    NoConfigDir,

    #[error("could not determine a platform data directory")]
    NoDataDir,

    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub api_base_url: String,
    /// Override for the credential store location; defaults to the
    /// platform data dir when absent.
    pub data_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            data_dir: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            serde_json::from_str(&contents)?
        } else {
            Self::default()
        };

        if let Ok(url) = std::env::var(API_URL_ENV) {
            if !url.is_empty() {
                config.api_base_url = url;
            }
        }

        Ok(config)
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory holding the credential store.
    pub fn data_dir(&self) -> Result<PathBuf, ConfigError> {
        if let Some(ref dir) = self.data_dir {
            return Ok(dir.clone());
        }
        let data_dir = dirs::data_dir().ok_or(ConfigError::NoDataDir)?;
        Ok(data_dir.join(APP_NAME))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_points_at_dev_server() {
        let config = Config::default();
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
        assert!(config.data_dir.is_none());
    }

    #[test]
    fn explicit_data_dir_wins() {
        let config = Config {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            data_dir: Some(PathBuf::from("/tmp/miqat-test")),
        };
        assert_eq!(config.data_dir().unwrap(), PathBuf::from("/tmp/miqat-test"));
    }
}
