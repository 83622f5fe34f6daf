//! Configuration loading for a ResQLink node.
//!
//! Configuration is loaded from a TOML file (default: `resq.toml`). Every
//! section and field is optional.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration for a node.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NodeConfig {
    /// Local store configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Orchestrator configuration.
    #[serde(default)]
    pub transport: TransportConfig,
    /// Peer table configuration.
    #[serde(default)]
    pub peers: PeerConfig,
    /// File-drop transport configuration.
    #[serde(default)]
    pub drop_dir: DropDirConfig,
}

/// Local store configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Path to SQLite database file (default: `resq.db`).
    ///
    /// Relative paths are resolved against the data directory by the CLI.
    #[serde(default = "default_database_path")]
    pub database: PathBuf,
}

/// Orchestrator configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct TransportConfig {
    /// Upper bound on a single provider's broadcast (default: 5000 ms).
    #[serde(default = "default_broadcast_timeout_ms")]
    pub broadcast_timeout_ms: u64,
    /// Capacity of each inbound channel (default: 64).
    #[serde(default = "default_inbound_buffer")]
    pub inbound_buffer: usize,
}

/// Peer table configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PeerConfig {
    /// A peer counts as connected for this long after its last traffic
    /// (default: 300 s).
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,
}

/// File-drop transport configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DropDirConfig {
    /// Shared directory (USB stick, synced folder). Disabled when unset.
    pub directory: Option<PathBuf>,
    /// How often the directory is scanned (default: 1000 ms).
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

// Default value functions
fn default_database_path() -> PathBuf {
    PathBuf::from("resq.db")
}

fn default_broadcast_timeout_ms() -> u64 {
    5_000
}

fn default_inbound_buffer() -> usize {
    64
}

fn default_stale_after_secs() -> u64 {
    300 // 5 minutes
}

fn default_poll_interval_ms() -> u64 {
    1_000
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: default_database_path(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            broadcast_timeout_ms: default_broadcast_timeout_ms(),
            inbound_buffer: default_inbound_buffer(),
        }
    }
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            stale_after_secs: default_stale_after_secs(),
        }
    }
}

impl Default for DropDirConfig {
    fn default() -> Self {
        Self {
            directory: None,
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl TransportConfig {
    /// Broadcast timeout as a `Duration`.
    pub fn broadcast_timeout(&self) -> Duration {
        Duration::from_millis(self.broadcast_timeout_ms)
    }
}

impl PeerConfig {
    /// Staleness window in milliseconds.
    pub fn stale_after_ms(&self) -> i64 {
        (self.stale_after_secs as i64).saturating_mul(1_000)
    }
}

impl DropDirConfig {
    /// Poll interval as a `Duration`.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

impl NodeConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
}
