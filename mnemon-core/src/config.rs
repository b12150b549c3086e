//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/mnemon/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/mnemon/` (~/.config/mnemon/)
//! - Data: `$XDG_DATA_HOME/mnemon/` (~/.local/share/mnemon/)
//! - State/Logs: `$XDG_STATE_HOME/mnemon/` (~/.local/state/mnemon/)

use crate::error::{Error, Result};
use crate::types::Platform;
use serde::Deserialize;
use std::path::PathBuf;

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

/// Returns XDG_DATA_HOME or ~/.local/share
fn xdg_data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
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
    /// Per-platform scheduler settings, keyed by platform id
    #[serde(default)]
    pub platforms: std::collections::BTreeMap<String, PlatformSettings>,

    /// Store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Settings for one platform's scheduler task.
///
/// Supplied by the external configuration collaborator; the engine only reads
/// and reacts to it.
#[derive(Debug, Deserialize, Clone)]
pub struct PlatformSettings {
    /// Whether the platform's task may run at all
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Polling cadence for the platform's timer
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Import-only platforms bypass polling and run only via explicit import
    #[serde(default)]
    pub import_only: bool,

    /// Override for the platform's source root path
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl Default for PlatformSettings {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            poll_interval_ms: default_poll_interval_ms(),
            import_only: false,
            path: None,
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_poll_interval_ms() -> u64 {
    60_000
}

/// Tiered store configuration
#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// Override for the store root directory
    #[serde(default)]
    pub root: Option<PathBuf>,

    /// Deadline for one artifact's parse-through-commit pipeline
    #[serde(default = "default_artifact_timeout_ms")]
    pub artifact_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: None,
            artifact_timeout_ms: default_artifact_timeout_ms(),
        }
    }
}

fn default_artifact_timeout_ms() -> u64 {
    30_000
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

        Ok(config)
    }

    /// Settings for one platform, falling back to per-platform defaults.
    ///
    /// `cursor_export` defaults to import-only since it has no pollable
    /// source directory.
    pub fn platform(&self, platform: Platform) -> PlatformSettings {
        self.platforms
            .get(platform.as_str())
            .cloned()
            .unwrap_or_else(|| PlatformSettings {
                import_only: platform == Platform::CursorExport,
                ..PlatformSettings::default()
            })
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/mnemon/config.toml` (~/.config/mnemon/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("mnemon").join("config.toml")
    }

    /// Returns the data directory path (store root lives here)
    ///
    /// `$XDG_DATA_HOME/mnemon/` (~/.local/share/mnemon/)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join("mnemon")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/mnemon/` (~/.local/state/mnemon/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("mnemon")
    }

    /// Returns the tiered store root directory
    ///
    /// `$XDG_DATA_HOME/mnemon/store` unless overridden in `[store]`
    pub fn store_root(&self) -> PathBuf {
        self.store
            .root
            .clone()
            .unwrap_or_else(|| Self::data_dir().join("store"))
    }

    /// Returns the log file path
    ///
    /// `$XDG_STATE_HOME/mnemon/mnemon.log`
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("mnemon.log")
    }

    /// Ensure XDG base directory environment variables are set.
    ///
    /// This is mainly for CLI binaries that want explicit, stable path behavior
    /// before invoking other components that read these env vars.
    pub fn ensure_xdg_env() {
        let home = home_dir();

        if std::env::var("XDG_DATA_HOME").is_err() {
            std::env::set_var("XDG_DATA_HOME", home.join(".local/share"));
        }

        if std::env::var("XDG_STATE_HOME").is_err() {
            std::env::set_var("XDG_STATE_HOME", home.join(".local/state"));
        }

        if std::env::var("XDG_CONFIG_HOME").is_err() {
            std::env::set_var("XDG_CONFIG_HOME", home.join(".config"));
        }
    }
}
