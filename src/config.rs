//! Configuration management for the attendance display
//!
//! Loads settings from TOML file at ~/.attend-display/config.toml

use crate::error::{DisplayError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Backend API configuration
    #[serde(default)]
    pub api: ApiConfig,

    /// Display timing and behaviour
    #[serde(default)]
    pub display: DisplayConfig,

    /// Session storage limits
    #[serde(default)]
    pub storage: StorageConfig,

    /// Log file location
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Backend API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the attendance backend, including the `/api` prefix
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    "http://127.0.0.1:5000/api".to_string()
}

fn default_timeout_secs() -> u64 {
    15
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        ApiConfig {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Display timing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// Seconds between QR token refreshes (5 or 10 in the known deployments)
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u32,

    /// Seconds between recent-scan feed refreshes
    #[serde(default = "default_scans_interval")]
    pub scans_interval_secs: u32,

    /// Session is ended locally once it has been open this long
    #[serde(default = "default_max_duration")]
    pub max_duration_minutes: u32,

    /// Ask for confirmation before ending the session
    #[serde(default = "default_true")]
    pub confirm_end: bool,
}

fn default_refresh_interval() -> u32 {
    10
}

fn default_scans_interval() -> u32 {
    8
}

fn default_max_duration() -> u32 {
    180 // 3 hours
}

fn default_true() -> bool {
    true
}

impl Default for DisplayConfig {
    fn default() -> Self {
        DisplayConfig {
            refresh_interval_secs: default_refresh_interval(),
            scans_interval_secs: default_scans_interval(),
            max_duration_minutes: default_max_duration(),
            confirm_end: true,
        }
    }
}

/// Session storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// When false every storage write fails
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Maximum total bytes held by the storage, 0 for no limit
    #[serde(default = "default_quota")]
    pub quota_bytes: usize,
}

fn default_quota() -> usize {
    5 * 1024 * 1024
}

impl StorageConfig {
    pub fn quota(&self) -> Option<usize> {
        (self.quota_bytes > 0).then_some(self.quota_bytes)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            enabled: true,
            quota_bytes: default_quota(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Directory for the rolling log files (the terminal belongs to the display)
    #[serde(default = "default_log_dir")]
    pub dir: PathBuf,
}

fn default_log_dir() -> PathBuf {
    dirs::home_dir()
        .map(|p| p.join(".attend-display").join("logs"))
        .unwrap_or_else(|| PathBuf::from(".attend-display/logs"))
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            dir: default_log_dir(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let expanded_path = expand_path(path.as_ref());

        if !expanded_path.exists() {
            return Err(DisplayError::Config(format!(
                "Configuration file not found: {}",
                expanded_path.display()
            )));
        }

        let content = std::fs::read_to_string(&expanded_path)?;
        let config: Config = toml::from_str(&content)?;

        Ok(config)
    }

    /// Load configuration from file or use defaults
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        Self::from_file(path).unwrap_or_default()
    }

    /// Get the default configuration file path
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .map(|p| p.join(".attend-display").join("config.toml"))
            .unwrap_or_else(|| PathBuf::from(".attend-display/config.toml"))
    }

    /// Get the log directory, expanding ~ if present
    pub fn log_dir(&self) -> PathBuf {
        expand_path(&self.logging.dir)
    }

    /// Base URL without trailing slashes
    pub fn base_url(&self) -> &str {
        self.api.base_url.trim_end_matches('/')
    }

    /// Reject values the display cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.base_url().is_empty() {
            return Err(DisplayError::Config("api.base_url must not be empty".into()));
        }
        if !(1..=120).contains(&self.api.timeout_secs) {
            return Err(DisplayError::Config(format!(
                "api.timeout_secs must be between 1 and 120, got {}",
                self.api.timeout_secs
            )));
        }
        if !(1..=60).contains(&self.display.refresh_interval_secs) {
            return Err(DisplayError::Config(format!(
                "display.refresh_interval_secs must be between 1 and 60, got {}",
                self.display.refresh_interval_secs
            )));
        }
        if self.display.scans_interval_secs == 0 {
            return Err(DisplayError::Config(
                "display.scans_interval_secs must be at least 1".into(),
            ));
        }
        if self.display.max_duration_minutes == 0 {
            return Err(DisplayError::Config(
                "display.max_duration_minutes must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| DisplayError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path.as_ref(), content)?;
        Ok(())
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("ATTEND_API_URL") {
            if !url.trim().is_empty() {
                self.api.base_url = url;
            }
        }
        if let Ok(timeout) = std::env::var("ATTEND_API_TIMEOUT_SECS") {
            if let Ok(timeout) = timeout.parse() {
                self.api.timeout_secs = timeout;
            }
        }
        if let Ok(interval) = std::env::var("ATTEND_REFRESH_INTERVAL") {
            if let Ok(interval) = interval.parse() {
                self.display.refresh_interval_secs = interval;
            }
        }
        if let Ok(confirm) = std::env::var("ATTEND_CONFIRM_END") {
            self.display.confirm_end = confirm == "true" || confirm == "1";
        }
    }

    /// Create a default configuration file at the given path
    pub fn create_default<P: AsRef<Path>>(path: P) -> Result<()> {
        let content = r#"# Attend display configuration

[api]
# Attendance backend, including the /api prefix
base_url = "http://127.0.0.1:5000/api"
# Seconds before a request is abandoned
timeout_secs = 15

[display]
# QR token rotation in seconds (5 or 10)
refresh_interval_secs = 10
# Recent-scan feed refresh in seconds
scans_interval_secs = 8
# Sessions left open longer than this are ended on the display
max_duration_minutes = 180
# Ask before ending the session
confirm_end = true

[storage]
# Set to false to run without session storage
enabled = true
# Byte limit for stored session data, 0 for no limit
quota_bytes = 5242880

[logging]
dir = "~/.attend-display/logs"
"#;

        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;

        Ok(())
    }
}

/// Expand ~ to home directory in paths
pub fn expand_path(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}
