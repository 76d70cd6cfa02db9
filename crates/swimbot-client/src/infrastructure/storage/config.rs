//! TOML-based configuration for the swimbot client.
//!
//! Reads and writes `AppConfig` to the platform-appropriate config file:
//! - Windows:  `%APPDATA%\Swimbot\config.toml`
//! - Linux:    `~/.config/swimbot/config.toml`
//! - macOS:    `~/Library/Application Support/Swimbot/config.toml`
//!
//! Example:
//!
//! ```toml
//! [device]
//! host = "10.1.100.158"
//! port = 8000
//!
//! [timing]
//! connect_timeout_ms = 5000
//! operation_timeout_ms = 2000
//! poll_interval_ms = 2000
//!
//! [retry]
//! max_retries = 3
//!
//! [[locations]]
//! name = "school"
//! host = "10.100.82.80"
//! ```
//!
//! Every field carries a `#[serde(default = ...)]`, so a missing file, a
//! missing section, or a missing key all fall back to the built-in values.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use swimbot_core::SwimParameters;
use thiserror::Error;

use crate::application::supervisor::SupervisorPolicy;
use crate::infrastructure::transport::{DeviceAddress, DEFAULT_DEVICE_PORT};

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// `--location` named a preset that is not in `[[locations]]`.
    #[error("unknown location '{0}'")]
    UnknownLocation(String),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level configuration stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Gait sent by `swimbot params` when no flag overrides a field.
    #[serde(default)]
    pub swim: SwimParameters,
    #[serde(default = "default_locations")]
    pub locations: Vec<LocationEntry>,
}

/// Robot address used when no location preset is selected.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Timeouts and poll cadence, in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimingConfig {
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_operation_timeout_ms")]
    pub operation_timeout_ms: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryConfig {
    /// Failed connect attempts before automatic reconnects stop.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Consecutive malformed status responses before subscribers are told.
    #[serde(default = "default_malformed_threshold")]
    pub malformed_threshold: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// `tracing` log level: `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`.
    /// `RUST_LOG` wins when set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// A named robot address, e.g. the pool at home vs. the one at school.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LocationEntry {
    pub name: String,
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_host() -> String {
    "10.1.100.158".to_string()
}
fn default_port() -> u16 {
    DEFAULT_DEVICE_PORT
}
fn default_connect_timeout_ms() -> u64 {
    5_000
}
fn default_operation_timeout_ms() -> u64 {
    2_000
}
fn default_poll_interval_ms() -> u64 {
    2_000
}
fn default_max_retries() -> u32 {
    3
}
fn default_malformed_threshold() -> u32 {
    3
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_locations() -> Vec<LocationEntry> {
    vec![
        LocationEntry {
            name: "home".to_string(),
            host: "10.1.100.158".to_string(),
            port: DEFAULT_DEVICE_PORT,
        },
        LocationEntry {
            name: "school".to_string(),
            host: "10.100.82.80".to_string(),
            port: DEFAULT_DEVICE_PORT,
        },
    ]
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            device: DeviceConfig::default(),
            timing: TimingConfig::default(),
            retry: RetryConfig::default(),
            logging: LoggingConfig::default(),
            swim: SwimParameters::default(),
            locations: default_locations(),
        }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            operation_timeout_ms: default_operation_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            malformed_threshold: default_malformed_threshold(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

// ── Conversions ───────────────────────────────────────────────────────────────

impl AppConfig {
    /// Supervisor timeouts and limits taken from `[timing]` and `[retry]`.
    pub fn policy(&self) -> SupervisorPolicy {
        SupervisorPolicy {
            connect_timeout: Duration::from_millis(self.timing.connect_timeout_ms),
            operation_timeout: Duration::from_millis(self.timing.operation_timeout_ms),
            poll_interval: Duration::from_millis(self.timing.poll_interval_ms),
            max_retries: self.retry.max_retries,
            malformed_threshold: self.retry.malformed_threshold,
        }
    }

    /// Looks up a location preset by name, ignoring ASCII case.
    pub fn location(&self, name: &str) -> Option<&LocationEntry> {
        self.locations
            .iter()
            .find(|l| l.name.eq_ignore_ascii_case(name))
    }

    /// The robot address: the named preset if one is given, else `[device]`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownLocation`] if `location` names no preset.
    pub fn device_address(&self, location: Option<&str>) -> Result<DeviceAddress, ConfigError> {
        match location {
            Some(name) => self
                .location(name)
                .map(|l| DeviceAddress::new(l.host.clone(), l.port))
                .ok_or_else(|| ConfigError::UnknownLocation(name.to_string())),
            None => Ok(DeviceAddress::new(self.device.host.clone(), self.device.port)),
        }
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Determines the platform-appropriate directory for the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when the platform config base
/// directory cannot be determined from the environment.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

/// Resolves the full path to the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot be
/// determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

/// Loads `AppConfig` from the platform config file.
///
/// # Errors
///
/// See [`load_config_from`].
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from(&config_file_path()?)
}

/// Loads `AppConfig` from `path`, returning `AppConfig::default()` if the file
/// does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config_from(path: &Path) -> Result<AppConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AppConfig::default()),
        Err(e) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Persists `config` to the platform config file.
///
/// # Errors
///
/// See [`save_config_to`].
pub fn save_config(config: &AppConfig) -> Result<PathBuf, ConfigError> {
    let path = config_file_path()?;
    save_config_to(&path, config)?;
    Ok(path)
}

/// Writes `config` to `path` as pretty TOML, creating parent directories.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config_to(path: &Path, config: &AppConfig) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Resolves the platform config directory, including the `Swimbot` subdirectory.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("Swimbot"))
    }

    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("swimbot"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME")
            .map(|h| PathBuf::from(h).join("Library").join("Application Support").join("Swimbot"))
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
