//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/perfvault/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/perfvault/` (~/.config/perfvault/)
//! - Data: `$XDG_DATA_HOME/perfvault/` (~/.local/share/perfvault/)
//! - State/Logs: `$XDG_STATE_HOME/perfvault/` (~/.local/state/perfvault/), one
//!   `perfvault.YYYY-MM-DD.log` file per day

use crate::db::schema::TableName;
use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

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
    /// Store backend and table layout
    #[serde(default)]
    pub store: StoreConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Which implementation backs the profile store
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Sqlite,
    Memory,
}

/// Store configuration
#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// Backend selected at startup
    #[serde(default)]
    pub backend: Backend,

    /// SQLite database file (defaults to the XDG data directory)
    pub path: Option<PathBuf>,

    /// Table holding profile records
    #[serde(default = "default_profiles_table")]
    pub profiles_table: String,

    /// Table holding watch records
    #[serde(default = "default_watches_table")]
    pub watches_table: String,

    /// How long SQLite waits on a locked database before failing
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u64,

    /// Rows fetched per round trip by lazy result sequences
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            path: None,
            profiles_table: default_profiles_table(),
            watches_table: default_watches_table(),
            busy_timeout_ms: default_busy_timeout(),
            batch_size: default_batch_size(),
        }
    }
}

impl StoreConfig {
    /// Database path, falling back to the XDG default
    pub fn database_path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(Config::database_path)
    }

    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        TableName::new(&self.profiles_table)?;
        TableName::new(&self.watches_table)?;

        if self.profiles_table == self.watches_table {
            return Err(Error::Config(
                "store.profiles_table and store.watches_table must differ".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(Error::Config(
                "store.batch_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_profiles_table() -> String {
    "results".to_string()
}

fn default_watches_table() -> String {
    "watches".to_string()
}

fn default_busy_timeout() -> u64 {
    5000
}

fn default_batch_size() -> usize {
    100
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
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        Self::parse(&content)
    }

    /// Parse and validate configuration text
    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        config.store.validate()?;
        Ok(config)
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/perfvault/config.toml` (~/.config/perfvault/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("perfvault").join("config.toml")
    }

    /// Returns the data directory path (for SQLite database)
    ///
    /// `$XDG_DATA_HOME/perfvault/` (~/.local/share/perfvault/)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join("perfvault")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/perfvault/` (~/.local/state/perfvault/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("perfvault")
    }

    /// Returns the database file path
    ///
    /// `$XDG_DATA_HOME/perfvault/profiles.db` (~/.local/share/perfvault/profiles.db)
    pub fn database_path() -> PathBuf {
        Self::data_dir().join("profiles.db")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.store.backend, Backend::Sqlite);
        assert_eq!(config.store.profiles_table, "results");
        assert_eq!(config.store.watches_table, "watches");
        assert_eq!(config.store.batch_size, 100);
        assert_eq!(config.logging.level, "info");
        assert!(config.store.validate().is_ok());
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[store]
backend = "memory"
path = "/tmp/profiles.db"
profiles_table = "xhgui_results"
watches_table = "xhgui_watches"
batch_size = 25

[logging]
level = "debug"
"#;
        let config = Config::parse(toml).unwrap();

        assert_eq!(config.store.backend, Backend::Memory);
        assert_eq!(
            config.store.database_path(),
            PathBuf::from("/tmp/profiles.db")
        );
        assert_eq!(config.store.profiles_table, "xhgui_results");
        assert_eq!(config.store.batch_size, 25);
        assert_eq!(config.store.busy_timeout_ms, 5000);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_invalid_table_name_rejected() {
        let toml = r#"
[store]
profiles_table = "results; DROP TABLE watches"
"#;
        assert!(matches!(Config::parse(toml), Err(Error::Config(_))));
    }

    #[test]
    fn test_store_config_validation() {
        let config = StoreConfig {
            watches_table: "results".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = StoreConfig {
            batch_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_backend_rejected() {
        let toml = r#"
[store]
backend = "mongodb"
"#;
        assert!(Config::parse(toml).is_err());
    }
}
