//! Configuration management for logbus

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::bus::{BusOptions, DEFAULT_MAX_CAPACITY, DEFAULT_STORAGE_KEY};

/// Categories of disk errors for user-friendly messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiskErrorKind {
    /// Disk is full or quota exceeded
    DiskFull,
    /// Permission denied (read or write)
    PermissionDenied,
    /// File or directory not found
    NotFound,
    /// Other IO error
    Other,
}

impl DiskErrorKind {
    /// Get a user-friendly message for this error kind
    pub fn user_message(&self) -> &'static str {
        match self {
            DiskErrorKind::DiskFull => "disk full or quota exceeded",
            DiskErrorKind::PermissionDenied => "permission denied",
            DiskErrorKind::NotFound => "file or directory not found",
            DiskErrorKind::Other => "storage unavailable",
        }
    }
}

/// Categorize an IO error into a user-friendly category
pub fn categorize_io_error(e: &std::io::Error) -> DiskErrorKind {
    use std::io::ErrorKind;

    match e.kind() {
        ErrorKind::StorageFull | ErrorKind::WriteZero => DiskErrorKind::DiskFull,
        ErrorKind::PermissionDenied => DiskErrorKind::PermissionDenied,
        ErrorKind::NotFound => DiskErrorKind::NotFound,
        _ => {
            #[cfg(unix)]
            {
                if let Some(os_error) = e.raw_os_error() {
                    // ENOSPC = 28; EDQUOT = 122 on Linux, 69 on macOS
                    if os_error == 28 || os_error == 122 || os_error == 69 {
                        return DiskErrorKind::DiskFull;
                    }
                    // EACCES
                    if os_error == 13 {
                        return DiskErrorKind::PermissionDenied;
                    }
                }
            }
            DiskErrorKind::Other
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Maximum entries retained by the bus (default: 1000)
    #[serde(default = "default_max_capacity")]
    pub max_capacity: usize,

    /// Namespace key of the persisted record
    #[serde(default = "default_storage_key")]
    pub storage_key: String,

    /// Directory holding the persisted record
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Re-emit appended entries to the process log
    #[serde(default = "default_console_mirror")]
    pub console_mirror: bool,

    /// Process log file retention in days (default: 7)
    #[serde(default = "default_log_retention_days")]
    pub log_retention_days: u64,

    /// Filter used when RUST_LOG is not set
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

fn default_max_capacity() -> usize {
    DEFAULT_MAX_CAPACITY
}

fn default_storage_key() -> String {
    DEFAULT_STORAGE_KEY.to_string()
}

fn default_data_dir() -> PathBuf {
    config_dir().join("data")
}

fn default_console_mirror() -> bool {
    true
}

fn default_log_retention_days() -> u64 {
    7
}

fn default_log_filter() -> String {
    "logbus=info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_capacity: default_max_capacity(),
            storage_key: default_storage_key(),
            data_dir: default_data_dir(),
            console_mirror: default_console_mirror(),
            log_retention_days: default_log_retention_days(),
            log_filter: default_log_filter(),
        }
    }
}

impl Config {
    /// Load configuration from file, or return default if not found
    pub fn load() -> Result<Self> {
        let path = config_file_path();
        if path.exists() {
            let content = std::fs::read_to_string(&path).context("Failed to read config file")?;
            Self::from_toml(&content)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse configuration text
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config file")
    }

    /// Bus sizing derived from this configuration
    pub fn bus_options(&self) -> BusOptions {
        BusOptions {
            max_capacity: self.max_capacity,
            storage_key: self.storage_key.clone(),
        }
    }
}

/// Get the base configuration directory (~/.logbus)
/// Falls back to ./.logbus if home directory cannot be determined
pub fn config_dir() -> PathBuf {
    try_config_dir().unwrap_or_else(|| {
        tracing::warn!("Could not determine home directory, using current directory for config");
        PathBuf::from(".logbus")
    })
}

/// Try to get the base configuration directory, returning None if home dir is unavailable
pub fn try_config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".logbus"))
}

/// Get the path to the config file
pub fn config_file_path() -> PathBuf {
    config_dir().join("config.toml")
}

/// Get the path to the logs directory
pub fn logs_dir() -> PathBuf {
    config_dir().join("logs")
}

/// Ensure the config and logs directories exist
pub fn ensure_directories() -> Result<()> {
    std::fs::create_dir_all(config_dir()).context("Failed to create config directory")?;
    std::fs::create_dir_all(logs_dir()).context("Failed to create logs directory")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.max_capacity, 1000);
        assert_eq!(config.storage_key, "logbus_entries");
        assert!(config.console_mirror);
        assert!(config.data_dir.ends_with("data"));
    }

    #[test]
    fn test_config_serialization() {
        let mut config = Config::default();
        config.max_capacity = 250;

        let toml_str = toml::to_string(&config).unwrap();
        let parsed = Config::from_toml(&toml_str).unwrap();
        assert_eq!(parsed.max_capacity, 250);
        assert_eq!(parsed.storage_key, config.storage_key);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let parsed = Config::from_toml("max_capacity = 20\nconsole_mirror = false\n").unwrap();
        assert_eq!(parsed.max_capacity, 20);
        assert!(!parsed.console_mirror);
        assert_eq!(parsed.log_retention_days, 7);
        assert_eq!(parsed.log_filter, "logbus=info");
    }

    #[test]
    fn test_invalid_config_is_error() {
        assert!(Config::from_toml("max_capacity = \"lots\"").is_err());
    }

    #[test]
    fn test_bus_options() {
        let config = Config::from_toml("max_capacity = 3\nstorage_key = \"ui_logs\"").unwrap();
        let options = config.bus_options();
        assert_eq!(options.max_capacity, 3);
        assert_eq!(options.storage_key, "ui_logs");
    }

    #[test]
    fn test_config_dir_does_not_panic() {
        let dir = config_dir();
        assert!(dir.ends_with(".logbus"));
    }

    #[test]
    fn test_categorize_io_error() {
        let full = io::Error::from(io::ErrorKind::StorageFull);
        assert_eq!(categorize_io_error(&full), DiskErrorKind::DiskFull);

        let denied = io::Error::from(io::ErrorKind::PermissionDenied);
        assert_eq!(categorize_io_error(&denied), DiskErrorKind::PermissionDenied);

        let missing = io::Error::from(io::ErrorKind::NotFound);
        assert_eq!(categorize_io_error(&missing), DiskErrorKind::NotFound);

        #[cfg(unix)]
        {
            let quota = io::Error::from_raw_os_error(122);
            assert_eq!(categorize_io_error(&quota), DiskErrorKind::DiskFull);
        }
    }
}
