//! Domain Layer - Connection lifecycle and handshake logic with no I/O
//!
//! This module contains:
//! - Connection identity, lifecycle signals and one-shot waits
//! - The online status map keyed by node operator
//! - The authentication state machine as a pure transition function
//! - Error types and timeouts

pub mod auth;
pub mod config;
pub mod connection;
pub mod errors;
pub mod status;

pub use auth::*;
pub use config::*;
pub use connection::*;
pub use errors::*;
pub use status::*;
