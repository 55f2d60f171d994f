//! # SDK Configuration
//!
//! Unified configuration for the orchestration root.
//!
//! Loaded from a TOML file, then overridden from the environment:
//!
//! | Variable | Field |
//! |----------|-------|
//! | `SN_NETWORK` | `network` |
//! | `SN_AUTH_TIMEOUT_SECS` | `sockets.auth_timeout_secs` |
//! | `SN_LOG` | `logging.filter` |
//!
//! # Config File Format
//!
//! ```toml
//! network = "testnet"
//!
//! [sockets]
//! auth_timeout_secs = 30
//! ready_timeout_secs = 30
//! request_timeout_secs = 30
//!
//! [bus]
//! capacity = 1000
//!
//! [logging]
//! filter = "info"
//! json = false
//!
//! [[directory.testnet]]
//! operator = "0.0.1"
//! address = "wss://node-1.example"
//! ```

use std::fs;
use std::path::Path;
use std::time::Duration;

use node_sockets::SocketsConfig;
use node_sockets::adapters::StaticDirectory;
use serde::Deserialize;
use shared_types::{NetworkEnv, Node, ParseNetworkError};
use thiserror::Error;
use tracing::warn;

/// Complete SDK configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SdkConfig {
    /// Network environment the directory is pointed at.
    pub network: NetworkEnv,
    /// Socket service timeouts.
    pub sockets: SocketsSection,
    /// Event bus configuration.
    pub bus: BusConfig,
    /// Logging configuration.
    pub logging: LoggingConfig,
    /// Static node lists per environment.
    pub directory: DirectoryConfig,
}

/// Socket service timeouts, in seconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketsSection {
    pub auth_timeout_secs: u64,
    pub ready_timeout_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for SocketsSection {
    fn default() -> Self {
        Self {
            auth_timeout_secs: 30,
            ready_timeout_secs: 30,
            request_timeout_secs: 30,
        }
    }
}

/// Event bus configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusConfig {
    /// Events buffered per subscriber before it lags.
    pub capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            capacity: shared_bus::DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".into(),
            json: false,
        }
    }
}

/// Node lists for the static directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DirectoryConfig {
    #[serde(default)]
    pub mainnet: Vec<Node>,
    #[serde(default)]
    pub testnet: Vec<Node>,
    #[serde(default)]
    pub local: Vec<Node>,
}

impl DirectoryConfig {
    pub fn nodes(&self, env: NetworkEnv) -> &[Node] {
        match env {
            NetworkEnv::Mainnet => &self.mainnet,
            NetworkEnv::Testnet => &self.testnet,
            NetworkEnv::Local => &self.local,
        }
    }

    /// Directory serving these lists.
    pub fn static_directory(&self) -> StaticDirectory {
        [NetworkEnv::Mainnet, NetworkEnv::Testnet, NetworkEnv::Local]
            .into_iter()
            .fold(StaticDirectory::new(), |dir, env| {
                dir.with_network(env, self.nodes(env).to_vec())
            })
    }
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// File I/O error.
    #[error("Failed to read {path}: {error}")]
    Io { path: String, error: String },

    /// TOML parsing error.
    #[error("Failed to parse config: {0}")]
    Parse(String),

    /// Unknown network name.
    #[error(transparent)]
    InvalidNetwork(#[from] ParseNetworkError),

    /// A value is out of range.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Configuration file structure.
#[derive(Debug, Deserialize, Default)]
struct ConfigFile {
    network: Option<String>,
    #[serde(default)]
    sockets: SocketsFile,
    #[serde(default)]
    bus: BusFile,
    #[serde(default)]
    logging: LoggingFile,
    #[serde(default)]
    directory: DirectoryConfig,
}

#[derive(Debug, Deserialize, Default)]
struct SocketsFile {
    auth_timeout_secs: Option<u64>,
    ready_timeout_secs: Option<u64>,
    request_timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct BusFile {
    capacity: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct LoggingFile {
    filter: Option<String>,
    json: Option<bool>,
}

impl SdkConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            error: e.to_string(),
        })?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string. Missing values take defaults.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        let defaults = Self::default();

        let network = match file.network {
            Some(name) => name.parse()?,
            None => defaults.network,
        };
        let sc = file.sockets;
        let config = Self {
            network,
            sockets: SocketsSection {
                auth_timeout_secs: sc
                    .auth_timeout_secs
                    .unwrap_or(defaults.sockets.auth_timeout_secs),
                ready_timeout_secs: sc
                    .ready_timeout_secs
                    .unwrap_or(defaults.sockets.ready_timeout_secs),
                request_timeout_secs: sc
                    .request_timeout_secs
                    .unwrap_or(defaults.sockets.request_timeout_secs),
            },
            bus: BusConfig {
                capacity: file.bus.capacity.unwrap_or(defaults.bus.capacity),
            },
            logging: LoggingConfig {
                filter: file.logging.filter.unwrap_or(defaults.logging.filter),
                json: file.logging.json.unwrap_or(defaults.logging.json),
            },
            directory: file.directory,
        };
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`.
    ///
    /// An unknown network is an error; an unparsable timeout is ignored
    /// with a warning.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(network) = lookup("SN_NETWORK") {
            self.network = network.parse()?;
        }
        if let Some(secs) = lookup("SN_AUTH_TIMEOUT_SECS") {
            match secs.parse() {
                Ok(secs) => self.sockets.auth_timeout_secs = secs,
                Err(_) => warn!(value = %secs, "SN_AUTH_TIMEOUT_SECS is not a number, ignored"),
            }
        }
        if let Some(filter) = lookup("SN_LOG") {
            self.logging.filter = filter;
        }
        self.validate()
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let s = &self.sockets;
        if s.auth_timeout_secs == 0 || s.ready_timeout_secs == 0 || s.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid("socket timeouts must be positive".into()));
        }
        if self.bus.capacity == 0 {
            return Err(ConfigError::Invalid("bus capacity must be positive".into()));
        }
        Ok(())
    }

    /// Timeouts for the socket service.
    pub fn sockets_config(&self) -> SocketsConfig {
        SocketsConfig {
            auth_timeout: Duration::from_secs(self.sockets.auth_timeout_secs),
            ready_timeout: Duration::from_secs(self.sockets.ready_timeout_secs),
            request_timeout: Duration::from_secs(self.sockets.request_timeout_secs),
        }
    }
}
