//! # Node Sockets
//!
//! Keeps one authenticated channel to a primary node of a redundant fleet,
//! fails over when the primary drops and fans server events out onto the
//! SDK event bus.
//!
//! ## Architecture
//!
//! The crate follows Hexagonal Architecture:
//! - **Domain Layer:** connection types, status map, handshake state machine
//! - **Ports Layer:** `Connection`, `Transport`, `NodeDirectory`,
//!   `WalletSessionProvider` and the inbound `NodeSocketsApi`
//! - **Service Layer:** registry, orchestrator and the socket driver
//! - **Adapters Layer:** loopback transport, static directory, mock wallet
//!
//! ## Flow
//!
//! ```text
//! directory ──nodes──► ConnectionRegistry ──primary──► AuthOrchestrator
//!                            │                              │
//!                     lifecycle signals               auth notifications
//!                            ▼                              ▼
//!                      socket driver ──events/errors──► Event Bus
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! let sockets = NodeSockets::new(transport, directory, wallet, bus, SocketsConfig::default());
//! sockets.init(session.as_ref(), nodes).await?;
//! let reservation = sockets.reserve_nft("0.0.42", "0.0.1001").await?;
//! ```

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod service;

pub use domain::{
    channels, AuthState, ConnectionError, ConnectionId, ConnectionState, DisconnectReason,
    LifecycleEvent, NodeStatus, OnlineStatusMap, PayloadStream, PendingEvent, Readiness,
    SocketsConfig, SocketsError,
};
pub use ports::{Connection, NodeDirectory, NodeSocketsApi, Transport, WalletSessionProvider};
pub use service::{AuthOrchestrator, ConnectionRegistry, LifecycleOutcome, NodeSockets};
