//! Configuration System
//!
//! Loads configuration from YAML files with a cascading priority system:
//! 1. `./aodv.yaml` (current directory - highest priority)
//! 2. `~/.config/aodv/aodv.yaml` (user config directory)
//! 3. `/etc/aodv/aodv.yaml` (system - lowest priority)
//!
//! Values from higher priority files override those from lower priority files.
//!
//! # YAML Structure
//!
//! ```yaml
//! aodv:
//!   hello_interval_ms: 1000
//!   net_diameter: 35
//! cpda:
//!   enable_query_node: true
//!   key_total: 100
//!   key_selection: 10
//! transport:
//!   local_addr: 10.0.0.1
//!   broadcast_addr: 10.0.0.255
//! ```

mod aodv;
mod cpda;
mod transport;

use crate::protocol::CpdaKey;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub use aodv::AodvConfig;
pub use cpda::CpdaConfig;
pub use transport::TransportConfig;

/// Default config filename.
const CONFIG_FILENAME: &str = "aodv.yaml";

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    ParseYaml {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Routing protocol parameters (`aodv.*`).
    #[serde(default)]
    pub aodv: AodvConfig,

    /// Key agreement and clustering (`cpda.*`).
    #[serde(default)]
    pub cpda: CpdaConfig,

    /// Control socket (`transport.*`).
    #[serde(default)]
    pub transport: TransportConfig,
}

impl Config {
    /// Create a new default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from the standard search paths.
    ///
    /// Returns a tuple of (config, paths_loaded) where paths_loaded contains
    /// the paths that were successfully loaded.
    pub fn load() -> Result<(Self, Vec<PathBuf>), ConfigError> {
        let search_paths = Self::search_paths();
        Self::load_from_paths(&search_paths)
    }

    /// Load configuration from specific paths.
    ///
    /// Paths are processed in order, with later paths overriding earlier ones.
    pub fn load_from_paths(paths: &[PathBuf]) -> Result<(Self, Vec<PathBuf>), ConfigError> {
        let mut config = Config::default();
        let mut loaded_paths = Vec::new();

        for path in paths {
            if path.exists() {
                let file_config = Self::load_file(path)?;
                config.merge(file_config);
                loaded_paths.push(path.clone());
            }
        }

        Ok((config, loaded_paths))
    }

    /// Load configuration from a single file.
    pub fn load_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;

        serde_yaml::from_str(&contents).map_err(|e| ConfigError::ParseYaml {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Get the standard search paths in priority order (lowest to highest).
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        // System config (lowest priority)
        paths.push(PathBuf::from("/etc/aodv").join(CONFIG_FILENAME));

        // User config directory
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("aodv").join(CONFIG_FILENAME));
        }

        // Current directory (highest priority)
        paths.push(PathBuf::from(".").join(CONFIG_FILENAME));

        paths
    }

    /// Merge another configuration into this one.
    ///
    /// Values set in `other` override values in `self`.
    pub fn merge(&mut self, other: Config) {
        self.aodv.merge(other.aodv);
        self.cpda.merge(other.cpda);
        self.transport.merge(other.transport);
    }

    /// Reject parameter combinations the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let a = &self.aodv;
        if a.ttl_start() == 0 {
            return Err(invalid("aodv.ttl_start", "must be at least 1"));
        }
        if a.net_diameter() == 0 {
            return Err(invalid("aodv.net_diameter", "must be at least 1"));
        }
        if a.ttl_start() > a.net_diameter() {
            return Err(invalid(
                "aodv.ttl_start",
                format!("exceeds net_diameter ({})", a.net_diameter()),
            ));
        }
        if a.hello_interval_ms() == 0 {
            return Err(invalid("aodv.hello_interval_ms", "must be non-zero"));
        }
        if a.maintenance_interval_ms() == 0 {
            return Err(invalid("aodv.maintenance_interval_ms", "must be non-zero"));
        }
        if a.max_queue_len() == 0 {
            return Err(invalid("aodv.max_queue_len", "must be at least 1"));
        }

        let c = &self.cpda;
        if c.enabled() {
            if c.key_total() == 0 {
                return Err(invalid("cpda.key_total", "must be at least 1"));
            }
            if c.key_selection() > c.key_total() {
                return Err(invalid(
                    "cpda.key_selection",
                    format!("exceeds key_total ({})", c.key_total()),
                ));
            }
            if c.key_selection() as usize > CpdaKey::KEY_SLOTS {
                return Err(invalid(
                    "cpda.key_selection",
                    format!("exceeds {} key slots", CpdaKey::KEY_SLOTS),
                ));
            }
        }

        if self.transport.port() == 0 {
            return Err(invalid("transport.port", "must be non-zero"));
        }
        Ok(())
    }

    /// Serialize this configuration to YAML.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}
