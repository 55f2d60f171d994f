//! # Tracing Setup
//!
//! Installs the global `tracing` subscriber for hosts that don't bring
//! their own.

use tracing_subscriber::{fmt, EnvFilter};

use crate::container::LoggingConfig;

/// Install a `fmt` subscriber.
///
/// `RUST_LOG` wins over `config.filter`. Returns `false` when a global
/// subscriber is already installed.
pub fn init_tracing(config: &LoggingConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = fmt().with_env_filter(filter).with_target(true);
    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.is_ok()
}
