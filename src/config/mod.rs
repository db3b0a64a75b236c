//! Configuration module
//!
//! Handles loading and saving fastws configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::network::ClientOptions;
use crate::protocol::DEFAULT_SUBPROTOCOL;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings
    #[serde(default)]
    pub general: GeneralConfig,

    /// Client settings
    #[serde(default)]
    pub client: ClientConfig,
}

/// General configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Enable verbose logging
    #[serde(default)]
    pub verbose: bool,
}

/// Client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// WebSocket endpoint
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Subprotocol requested during the upgrade
    #[serde(default = "default_protocol")]
    pub protocol: String,
    /// Heartbeat interval in ms
    #[serde(default = "default_ping_interval")]
    pub ping_interval_ms: u64,
    /// Pong timeout in ms (not enforced)
    #[serde(default = "default_ping_timeout")]
    pub ping_timeout_ms: u64,
    /// Reply timeout in ms
    #[serde(default = "default_reply_timeout")]
    pub reply_timeout_ms: u64,
}

fn default_endpoint() -> String {
    "ws://127.0.0.1:3000/fast-ws".to_string()
}

fn default_protocol() -> String {
    DEFAULT_SUBPROTOCOL.to_string()
}

fn default_ping_interval() -> u64 {
    30_000
}

fn default_ping_timeout() -> u64 {
    1_000
}

fn default_reply_timeout() -> u64 {
    5_000
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            protocol: default_protocol(),
            ping_interval_ms: default_ping_interval(),
            ping_timeout_ms: default_ping_timeout(),
            reply_timeout_ms: default_reply_timeout(),
        }
    }
}

impl From<&ClientConfig> for ClientOptions {
    fn from(config: &ClientConfig) -> Self {
        ClientOptions::default()
            .with_ping_interval(Duration::from_millis(config.ping_interval_ms))
            .with_ping_timeout(Duration::from_millis(config.ping_timeout_ms))
            .with_reply_timeout(Duration::from_millis(config.reply_timeout_ms))
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from the default location
    pub fn load_default() -> ConfigResult<Self> {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("fastws/config.toml")),
            Some(PathBuf::from("./fastws.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path in config_paths.iter().flatten() {
            if path.exists() {
                return Self::load(path);
            }
        }

        Ok(Self::default())
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let contents = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Options for a client built from this configuration
    pub fn client_options(&self) -> ClientOptions {
        ClientOptions::from(&self.client)
    }
}

/// Generate a sample configuration file
pub fn generate_sample_config() -> ConfigResult<String> {
    let config = Config {
        general: GeneralConfig { verbose: true },
        client: ClientConfig {
            endpoint: "wss://example.com/fast-ws".to_string(),
            ..Default::default()
        },
    };

    Ok(toml::to_string_pretty(&config)?)
}
