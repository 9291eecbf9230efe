//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/agentpulse/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/agentpulse/` (~/.config/agentpulse/)
//! - State/Logs: `$XDG_STATE_HOME/agentpulse/` (~/.local/state/agentpulse/)

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Streaming pipeline configuration
    #[serde(default)]
    pub stream: StreamConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Streaming pipeline configuration
///
/// Controls the producer's heartbeat cadence and idle thresholds, and the
/// consumer's slow-tool detection.
#[derive(Debug, Deserialize, Clone)]
pub struct StreamConfig {
    /// Heartbeat tick interval in milliseconds
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,

    /// Minimum idle time before the monitor emits a status, in milliseconds
    #[serde(default = "default_idle_threshold_ms")]
    pub idle_threshold_ms: u64,

    /// Running time after which the consumer marks a tool as slow, in milliseconds
    #[serde(default = "default_slow_tool_threshold_ms")]
    pub slow_tool_threshold_ms: u64,

    /// Maximum characters kept in tool output previews
    #[serde(default = "default_preview_chars")]
    pub preview_chars: usize,

    /// Capture restorable checkpoints on human turns
    #[serde(default = "default_checkpoints")]
    pub checkpoints: bool,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            idle_threshold_ms: default_idle_threshold_ms(),
            slow_tool_threshold_ms: default_slow_tool_threshold_ms(),
            preview_chars: default_preview_chars(),
            checkpoints: default_checkpoints(),
        }
    }
}

impl StreamConfig {
    /// Heartbeat interval as a [`Duration`]
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Idle threshold as a [`Duration`]
    pub fn idle_threshold(&self) -> Duration {
        Duration::from_millis(self.idle_threshold_ms)
    }

    /// Slow-tool threshold as a [`Duration`]
    pub fn slow_tool_threshold(&self) -> Duration {
        Duration::from_millis(self.slow_tool_threshold_ms)
    }

    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        if self.heartbeat_interval_ms == 0 {
            return Err(Error::Config(
                "stream.heartbeat_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.slow_tool_threshold_ms == 0 {
            return Err(Error::Config(
                "stream.slow_tool_threshold_ms must be greater than 0".to_string(),
            ));
        }
        if self.preview_chars == 0 {
            return Err(Error::Config(
                "stream.preview_chars must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_heartbeat_interval_ms() -> u64 {
    1000
}

fn default_idle_threshold_ms() -> u64 {
    500
}

fn default_slow_tool_threshold_ms() -> u64 {
    10_000
}

fn default_preview_chars() -> usize {
    200
}

fn default_checkpoints() -> bool {
    true
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        config.stream.validate()?;

        Ok(config)
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/agentpulse/config.toml` (~/.config/agentpulse/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("agentpulse").join("config.toml")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/agentpulse/` (~/.local/state/agentpulse/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("agentpulse")
    }

    /// Returns the log file path
    ///
    /// `$XDG_STATE_HOME/agentpulse/agentpulse.log` (~/.local/state/agentpulse/agentpulse.log)
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("agentpulse.log")
    }

    /// Ensure XDG base directory environment variables are set.
    ///
    /// This is mainly for CLI binaries that want explicit, stable path behavior
    /// before invoking other components that read these env vars.
    pub fn ensure_xdg_env() {
        let home = home_dir();

        if std::env::var("XDG_STATE_HOME").is_err() {
            std::env::set_var("XDG_STATE_HOME", home.join(".local/state"));
        }

        if std::env::var("XDG_CONFIG_HOME").is_err() {
            std::env::set_var("XDG_CONFIG_HOME", home.join(".config"));
        }
    }
}
