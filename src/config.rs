//! Application Configuration
//!
//! Settings come from an optional YAML file with defaults for every field.
//! Command-line flags (or their `RESTFS_*` environment variables) override
//! whatever the file says.

use crate::storage::DEFAULT_TOMBSTONE_SUFFIX;
use clap::Parser;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Config file read when `--config` is not given
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Command-line flags
#[derive(Debug, Default, Parser)]
#[command(name = "restfs")]
#[command(about = "Serves a directory tree over HTTP with soft deletes")]
#[command(version)]
pub struct Cli {
    /// Path to a YAML config file
    #[arg(long, env = "RESTFS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Data directory
    #[arg(long, env = "RESTFS_DATA_DIR")]
    pub data_dir: Option<String>,

    /// Listen address
    #[arg(long, env = "RESTFS_LISTEN")]
    pub listen: Option<String>,

    /// Seconds to wait for in-flight requests before forcing shutdown
    #[arg(long, env = "RESTFS_GRACEFUL_TIMEOUT")]
    pub graceful_timeout: Option<u64>,

    /// GC interval in seconds for cleaning deleted files; 0 disables the timer
    #[arg(long, env = "RESTFS_GC_INTERVAL")]
    pub gc_interval: Option<u64>,

    /// Path to access log file, `-` for stdout
    #[arg(long, env = "RESTFS_ACCESS_LOG")]
    pub access_log: Option<String>,

    /// CORS origins (comma-separated)
    #[arg(long, env = "RESTFS_CORS_ORIGINS")]
    pub cors_origins: Option<String>,

    /// Listen address for prometheus
    #[arg(long, env = "RESTFS_PROMETHEUS")]
    pub prometheus: Option<String>,
}

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub gc: GcConfig,
    pub logging: LoggingConfig,
    pub cors: CorsConfig,
    pub metrics: MetricsConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address
    pub listen: String,
    /// Number of worker threads, 0 for one per CPU
    pub workers: usize,
    /// Maximum PUT body size in bytes
    pub max_payload_size: usize,
    /// Shutdown grace period in seconds
    pub graceful_timeout: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8000".to_string(),
            workers: 0,
            max_payload_size: 1024 * 1024 * 1024,
            graceful_timeout: 10,
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory exposed over HTTP
    pub data_dir: String,
    /// Suffix naming tombstone files
    pub tombstone_suffix: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: "./data".to_string(),
            tombstone_suffix: DEFAULT_TOMBSTONE_SUFFIX.to_string(),
        }
    }
}

/// GC configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GcConfig {
    /// Seconds between periodic passes, 0 disables the timer
    pub interval_secs: u64,
    /// Request a pass as soon as the server starts
    pub run_on_start: bool,
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            interval_secs: 3600,
            run_on_start: true,
        }
    }
}

impl GcConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// log4rs YAML file; used instead of the built-in setup when it exists
    pub config_file: String,
    /// Root log level for the built-in setup
    pub level: String,
    /// Access log destination, `-` for stdout
    pub access_log: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            config_file: "server_log.yaml".to_string(),
            level: "info".to_string(),
            access_log: "-".to_string(),
        }
    }
}

/// CORS configuration; an empty origin list disables CORS handling
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CorsConfig {
    pub origins: Vec<String>,
    pub max_age: u32,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            origins: Vec::new(),
            max_age: 600,
        }
    }
}

/// Prometheus exporter configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MetricsConfig {
    /// Listen address for the exporter; disabled when unset
    pub listen: Option<String>,
}

impl AppConfig {
    /// Loads the file named by `--config`, or `config.yaml` if present, then applies flags
    pub fn load(cli: &Cli) -> Result<Self, ConfigError> {
        let mut config = match &cli.config {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?,
            None => {
                warn!("Config file not found, using defaults");
                Self::default()
            }
        };
        config.apply_cli(cli);
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_yaml(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(content)
    }

    /// Overrides file settings with any flag that was given
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(data_dir) = &cli.data_dir {
            self.storage.data_dir = data_dir.clone();
        }
        if let Some(listen) = &cli.listen {
            self.server.listen = listen.clone();
        }
        if let Some(timeout) = cli.graceful_timeout {
            self.server.graceful_timeout = timeout;
        }
        if let Some(interval) = cli.gc_interval {
            self.gc.interval_secs = interval;
        }
        if let Some(access_log) = &cli.access_log {
            self.logging.access_log = access_log.clone();
        }
        if let Some(origins) = &cli.cors_origins {
            self.cors.origins = origins
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(prometheus) = &cli.prometheus {
            self.metrics.listen = Some(prometheus.clone()).filter(|addr| !addr.is_empty());
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let suffix = &self.storage.tombstone_suffix;
        if suffix.len() < 2 || !suffix.starts_with('.') || suffix.contains('/') {
            return Err(ConfigError::Invalid(format!(
                "tombstone_suffix must start with '.', have a name after it and contain no '/': {:?}",
                suffix
            )));
        }
        if self.storage.data_dir.is_empty() {
            return Err(ConfigError::Invalid("data_dir must not be empty".to_string()));
        }
        if self.server.listen.is_empty() {
            return Err(ConfigError::Invalid("listen address must not be empty".to_string()));
        }
        if self.server.max_payload_size == 0 {
            return Err(ConfigError::Invalid("max_payload_size must be positive".to_string()));
        }
        Ok(())
    }
}
