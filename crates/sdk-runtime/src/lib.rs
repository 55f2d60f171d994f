//! # SDK Runtime Library
//!
//! Orchestration root of the Smart Node SDK. `SmartNodeSdk` wires the node
//! directory, the wallet session provider and the node sockets together,
//! answers node challenges through the wallet and exposes one outward
//! event stream. The `smart-node-demo` binary runs it against loopback
//! nodes.
//!
//! ## Architectural Patterns
//!
//! - **Hexagonal Architecture**: collaborators are ports; hosts plug in adapters
//! - **Event-Driven**: node sockets publish, the root relays and reacts

#![allow(clippy::missing_const_for_fn)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod adapters;
pub mod container;
pub mod errors;
pub mod handlers;
pub mod sdk;
pub mod telemetry;
pub mod wiring;

pub use adapters::{RecordingRestClient, RestClient, RestError};
pub use container::{ConfigError, SdkConfig};
pub use errors::SdkError;
pub use handlers::AuthEventHandler;
pub use sdk::SmartNodeSdk;
pub use telemetry::init_tracing;
pub use wiring::EventRelay;
