//! Configuration management

use crate::link::RelayMode;
use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Controller connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Host name or IP address of the controller
    #[serde(default = "default_host")]
    pub host: String,
    /// TCP port of the controller
    #[serde(default = "default_port")]
    pub port: u16,
    /// Timeout of one connection attempt in milliseconds
    #[serde(default = "default_attempt_timeout")]
    pub attempt_timeout_ms: u64,
    /// Delay between failed connection attempts in milliseconds
    #[serde(default = "default_retry_interval")]
    pub retry_interval_ms: u64,
    /// Read timeout once connected in milliseconds (0 = blocking reads)
    #[serde(default)]
    pub read_timeout_ms: u64,
}

fn default_host() -> String {
    "monobot.local".to_string()
}
fn default_port() -> u16 {
    80
}
fn default_attempt_timeout() -> u64 {
    5000
}
fn default_retry_interval() -> u64 {
    2000
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            attempt_timeout_ms: default_attempt_timeout(),
            retry_interval_ms: default_retry_interval(),
            read_timeout_ms: 0,
        }
    }
}

impl ControllerConfig {
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        (self.read_timeout_ms > 0).then(|| Duration::from_millis(self.read_timeout_ms))
    }
}

/// Configuration payload uploaded to the controller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayloadConfig {
    /// Path of the JSON document sent after connecting
    #[serde(default = "default_payload_path")]
    pub path: PathBuf,
    /// Abort the session when the payload cannot be read
    #[serde(default)]
    pub fail_on_missing_config: bool,
}

fn default_payload_path() -> PathBuf {
    PathBuf::from("config.json")
}

impl Default for PayloadConfig {
    fn default() -> Self {
        Self {
            path: default_payload_path(),
            fail_on_missing_config: false,
        }
    }
}

/// Command relay configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Motion command encoding
    #[serde(default)]
    pub mode: RelayMode,
    /// Repeat interval of held-mode commands in milliseconds
    #[serde(default = "default_send_interval")]
    pub send_interval_ms: u64,
    /// Pause between log reads in milliseconds (only useful with a read timeout)
    #[serde(default)]
    pub log_poll_interval_ms: u64,
}

fn default_send_interval() -> u64 {
    1
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            mode: RelayMode::default(),
            send_interval_ms: default_send_interval(),
            log_poll_interval_ms: 0,
        }
    }
}

impl RelayConfig {
    pub fn send_interval(&self) -> Duration {
        Duration::from_millis(self.send_interval_ms)
    }

    pub fn log_poll_interval(&self) -> Duration {
        Duration::from_millis(self.log_poll_interval_ms)
    }
}

/// Invalid configuration values
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("controller host must not be empty")]
    EmptyHost,
    #[error("controller port must not be 0")]
    ZeroPort,
    #[error("attempt_timeout_ms must be greater than 0")]
    ZeroAttemptTimeout,
    #[error("send_interval_ms must be greater than 0")]
    ZeroSendInterval,
}

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Controller connection configuration
    #[serde(default)]
    pub controller: ControllerConfig,
    /// Configuration payload
    #[serde(default)]
    pub payload: PayloadConfig,
    /// Command relay configuration
    #[serde(default)]
    pub relay: RelayConfig,
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from `path`, falling back to defaults if it doesn't exist
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;
        config
            .validate()
            .with_context(|| format!("Invalid config file: {:?}", path))?;
        Ok(config)
    }

    /// Check values that would make the session misbehave
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.controller.host.trim().is_empty() {
            return Err(ConfigError::EmptyHost);
        }
        if self.controller.port == 0 {
            return Err(ConfigError::ZeroPort);
        }
        if self.controller.attempt_timeout_ms == 0 {
            return Err(ConfigError::ZeroAttemptTimeout);
        }
        if self.relay.send_interval_ms == 0 {
            return Err(ConfigError::ZeroSendInterval);
        }
        Ok(())
    }

    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("com", "monobot", "MonobotRemote")
            .context("Failed to determine config directory")?;
        Ok(proj_dirs.config_dir().join("config.toml"))
    }

    /// Get the default configuration embedded in the binary
    pub fn default_config_str() -> &'static str {
        include_str!("../../config/default.toml")
    }
}
