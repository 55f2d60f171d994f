//! # Ports Layer - Hexagonal Architecture Boundaries
//!
//! - **Driving Ports (Inbound):** operations the socket service exposes
//! - **Driven Ports (Outbound):** transport, node directory and wallet
//!   provider the host must supply

pub mod inbound;
pub mod outbound;

pub use inbound::NodeSocketsApi;
pub use outbound::{Connection, NodeDirectory, Transport, WalletSessionProvider};
