//! Configuration types for IodMap
//!
//! Every field has a default so a partial (or missing) TOML file is valid.

use crate::error::{Error, Result};
use crate::types::PeerAddr;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Root configuration for the map server
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub bulk: BulkConfig,
    #[serde(default)]
    pub dispatcher: DispatcherConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ServerConfig {
    /// Parse from a TOML document
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| Error::Configuration(e.to_string()))
    }

    /// Load from a file; a missing file yields the defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Configuration(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }
}

/// Identity of this server on the bulk fabric
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerSection {
    /// Address clients use to reach this server; requests originating here
    /// are co-resident
    #[serde(default = "default_address")]
    pub address: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            address: default_address(),
        }
    }
}

impl ServerSection {
    #[must_use]
    pub fn peer_addr(&self) -> PeerAddr {
        PeerAddr::new(self.address.clone())
    }
}

/// Bulk transfer configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkConfig {
    /// Longest a pull or push may sit idle before it fails
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,
}

impl Default for BulkConfig {
    fn default() -> Self {
        Self {
            idle_timeout_ms: default_idle_timeout_ms(),
        }
    }
}

impl BulkConfig {
    #[must_use]
    pub const fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }
}

/// Request dispatcher configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Maximum handlers running at once
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
    /// Request queue depth
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_in_flight: default_max_in_flight(),
            queue_depth: default_queue_depth(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_address() -> String {
    "iod-server-0".to_string()
}

fn default_idle_timeout_ms() -> u64 {
    30_000
}

fn default_max_in_flight() -> usize {
    64
}

fn default_queue_depth() -> usize {
    1024
}

fn default_log_level() -> String {
    "info".to_string()
}
