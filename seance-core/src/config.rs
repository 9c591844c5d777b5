//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/seance/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/seance/` (~/.config/seance/)
//! - State/Logs: `$XDG_STATE_HOME/seance/` (~/.local/state/seance/)

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
    /// Change monitor configuration
    #[serde(default)]
    pub monitor: MonitorConfig,

    /// Retry policy for backend calls
    #[serde(default)]
    pub retry: RetryConfig,

    /// Cache freshness windows
    #[serde(default)]
    pub cache: CacheConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Change monitor configuration
#[derive(Debug, Deserialize, Clone)]
pub struct MonitorConfig {
    /// Enable/disable change monitoring
    #[serde(default = "default_monitor_enabled")]
    pub enabled: bool,

    /// Quiet period after the last event before a refresh fires
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Trailing delay before the refreshing flag clears (anti-flicker)
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: default_monitor_enabled(),
            debounce_ms: default_debounce_ms(),
            settle_ms: default_settle_ms(),
        }
    }
}

impl MonitorConfig {
    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

fn default_monitor_enabled() -> bool {
    true
}

fn default_debounce_ms() -> u64 {
    300
}

fn default_settle_ms() -> u64 {
    500
}

/// Retry policy for backend calls
#[derive(Debug, Deserialize, Clone)]
pub struct RetryConfig {
    /// Max retry attempts after the first failure
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay; attempt N waits base_delay * N (linear backoff)
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }
}

fn default_max_retries() -> u32 {
    2
}

fn default_base_delay_ms() -> u64 {
    250
}

/// Cache freshness windows
///
/// Preferences are long-lived; message/QA content is short-lived with a
/// periodic background refetch while a surface is active.
#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    /// Preference entries are served without refetch for this long
    #[serde(default = "default_preference_stale_secs")]
    pub preference_stale_secs: u64,

    /// Preference entries older than this are evicted
    #[serde(default = "default_preference_ttl_secs")]
    pub preference_ttl_secs: u64,

    /// Content entries are served without refetch for this long
    #[serde(default = "default_content_stale_secs")]
    pub content_stale_secs: u64,

    /// Content entries older than this are evicted
    #[serde(default = "default_content_ttl_secs")]
    pub content_ttl_secs: u64,

    /// Background refetch interval while a surface is active
    #[serde(default = "default_refetch_interval_secs")]
    pub refetch_interval_secs: u64,

    /// Disable to suppress all periodic refetch (batch/background contexts)
    #[serde(default = "default_auto_refresh")]
    pub auto_refresh: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            preference_stale_secs: default_preference_stale_secs(),
            preference_ttl_secs: default_preference_ttl_secs(),
            content_stale_secs: default_content_stale_secs(),
            content_ttl_secs: default_content_ttl_secs(),
            refetch_interval_secs: default_refetch_interval_secs(),
            auto_refresh: default_auto_refresh(),
        }
    }
}

impl CacheConfig {
    pub fn preference_stale_after(&self) -> Duration {
        Duration::from_secs(self.preference_stale_secs)
    }

    pub fn preference_ttl(&self) -> Duration {
        Duration::from_secs(self.preference_ttl_secs)
    }

    pub fn content_stale_after(&self) -> Duration {
        Duration::from_secs(self.content_stale_secs)
    }

    pub fn content_ttl(&self) -> Duration {
        Duration::from_secs(self.content_ttl_secs)
    }

    pub fn refetch_interval(&self) -> Duration {
        Duration::from_secs(self.refetch_interval_secs)
    }

    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        if self.preference_ttl_secs < self.preference_stale_secs {
            return Err(Error::Config(
                "cache.preference_ttl_secs must be >= cache.preference_stale_secs".to_string(),
            ));
        }
        if self.content_ttl_secs < self.content_stale_secs {
            return Err(Error::Config(
                "cache.content_ttl_secs must be >= cache.content_stale_secs".to_string(),
            ));
        }
        if self.refetch_interval_secs == 0 {
            return Err(Error::Config(
                "cache.refetch_interval_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_preference_stale_secs() -> u64 {
    600
}

fn default_preference_ttl_secs() -> u64 {
    1800
}

fn default_content_stale_secs() -> u64 {
    300
}

fn default_content_ttl_secs() -> u64 {
    900
}

fn default_refetch_interval_secs() -> u64 {
    5
}

fn default_auto_refresh() -> bool {
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

        config.validate()?;

        Ok(config)
    }

    /// Validate all sections
    pub fn validate(&self) -> Result<()> {
        if self.monitor.debounce_ms == 0 {
            return Err(Error::Config(
                "monitor.debounce_ms must be greater than zero".to_string(),
            ));
        }
        self.cache.validate()
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/seance/config.toml` (~/.config/seance/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("seance").join("config.toml")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/seance/` (~/.local/state/seance/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("seance")
    }

    /// Returns the log file path
    ///
    /// `$XDG_STATE_HOME/seance/seance.log` (~/.local/state/seance/seance.log)
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("seance.log")
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
