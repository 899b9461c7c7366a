//! Configuration module for the file share server.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::{FileShareError, Result};

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port number to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Maximum number of concurrent connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Seconds to wait for the next command line before closing the connection.
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
    /// Seconds allowed for each payload chunk read or write.
    #[serde(default = "default_transfer_timeout")]
    pub transfer_timeout_secs: u64,
    /// Maximum accepted command line length in bytes.
    #[serde(default = "default_max_line_length")]
    pub max_line_length: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    9999
}

fn default_max_connections() -> usize {
    32
}

fn default_idle_timeout() -> u64 {
    300
}

fn default_transfer_timeout() -> u64 {
    30
}

fn default_max_line_length() -> usize {
    1024
}

impl ServerConfig {
    /// Deadline for awaiting a command line.
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    /// Deadline for a single payload chunk.
    pub fn transfer_timeout(&self) -> Duration {
        Duration::from_secs(self.transfer_timeout_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_connections: default_max_connections(),
            idle_timeout_secs: default_idle_timeout(),
            transfer_timeout_secs: default_transfer_timeout(),
            max_line_length: default_max_line_length(),
        }
    }
}

/// File storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Directory holding the stored files.
    #[serde(default = "default_storage_root")]
    pub root: String,
    /// Path to the CSV transfer log.
    #[serde(default = "default_transfer_log")]
    pub transfer_log: String,
    /// Payload chunk size in bytes.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Maximum declared upload size in bytes (0 = unlimited).
    #[serde(default)]
    pub max_upload_size_bytes: u64,
}

fn default_storage_root() -> String {
    "received_files".to_string()
}

fn default_transfer_log() -> String {
    "transfer_log.csv".to_string()
}

fn default_chunk_size() -> usize {
    4096
}

impl StorageConfig {
    /// Upload size limit, `None` when unlimited.
    pub fn upload_limit(&self) -> Option<u64> {
        (self.max_upload_size_bytes > 0).then_some(self.max_upload_size_bytes)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
            transfer_log: default_transfer_log(),
            chunk_size: default_chunk_size(),
            max_upload_size_bytes: 0,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Path to the log file.
    #[serde(default = "default_log_file")]
    pub file: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> String {
    "logs/fileshare.log".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// File storage configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(FileShareError::Io)?;
        Self::parse(&content)
    }

    /// Load configuration from a TOML file and apply environment variable overrides.
    pub fn load_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| FileShareError::Config(format!("config parse error: {e}")))
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported environment variables:
    /// - `FILESHARE_HOST`: bind address
    /// - `FILESHARE_PORT`: listen port (ignored unless it parses as a port number)
    /// - `FILESHARE_STORAGE_ROOT`: directory holding the stored files
    pub fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("FILESHARE_HOST") {
            if !host.is_empty() {
                self.server.host = host;
            }
        }
        if let Ok(port) = std::env::var("FILESHARE_PORT") {
            if let Ok(port) = port.parse() {
                self.server.port = port;
            }
        }
        if let Ok(root) = std::env::var("FILESHARE_STORAGE_ROOT") {
            if !root.is_empty() {
                self.storage.root = root;
            }
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.storage.chunk_size == 0 {
            return Err(FileShareError::Validation(
                "storage.chunk_size must be greater than zero".to_string(),
            ));
        }
        if self.server.max_connections == 0 {
            return Err(FileShareError::Validation(
                "server.max_connections must be greater than zero".to_string(),
            ));
        }
        if self.server.idle_timeout_secs == 0 {
            return Err(FileShareError::Validation(
                "server.idle_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.server.transfer_timeout_secs == 0 {
            return Err(FileShareError::Validation(
                "server.transfer_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.server.max_line_length == 0 {
            return Err(FileShareError::Validation(
                "server.max_line_length must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
