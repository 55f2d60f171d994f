//! # SDK Container
//!
//! Configuration of the orchestration root.

pub mod config;

pub use config::{
    BusConfig, ConfigError, DirectoryConfig, LoggingConfig, SdkConfig, SocketsSection,
};
