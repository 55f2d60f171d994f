//! # Connection Types
//!
//! Identity, state and lifecycle signals of a single link to a node.

use std::fmt;
use std::pin::Pin;

use serde_json::Value;
use tokio::sync::oneshot;
use tokio_stream::Stream;
use uuid::Uuid;

use crate::domain::errors::ConnectionError;

/// Named channels a node speaks on.
pub mod channels {
    /// Challenge pushed by the node.
    pub const AUTHENTICATION: &str = "authentication";
    /// Credential sent by the client, verdict returned by the node.
    pub const AUTHENTICATE: &str = "authenticate";
    /// Server-pushed domain events.
    pub const EVENTS: &str = "events";
    /// Node protocol errors.
    pub const ERRORS: &str = "errors";
    /// Resource reservation request/response.
    pub const RESERVE_NFT: &str = "reserveNft";
    /// Signed pool operation request/response.
    pub const MINT_LP_NFT: &str = "mintLpNft";
}

/// Identity of one connection instance.
///
/// A replaced connection to the same node gets a new id, so signals from the
/// old instance can be told apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Transport state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// Why a connection went down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The client called `disconnect()`.
    Requested,
    /// The link dropped underneath us.
    Transport,
}

/// Emitted exactly once per lifecycle transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    Connected,
    Disconnected(DisconnectReason),
}

/// Unbounded stream of payloads for one named event.
pub type PayloadStream = Pin<Box<dyn Stream<Item = Value> + Send>>;

/// A registered one-shot subscription.
///
/// The subscription is live as soon as this value exists, so a request can
/// be emitted after registering without racing the response.
#[derive(Debug)]
pub struct PendingEvent {
    event: String,
    rx: oneshot::Receiver<Value>,
}

impl PendingEvent {
    pub fn new(event: impl Into<String>, rx: oneshot::Receiver<Value>) -> Self {
        Self {
            event: event.into(),
            rx,
        }
    }

    /// Event name this wait is registered for.
    pub fn event(&self) -> &str {
        &self.event
    }

    /// Resolve with the next payload, or fail if the connection went away.
    pub async fn wait(self) -> Result<Value, ConnectionError> {
        let event = self.event;
        self.rx.await.map_err(|_| ConnectionError::Closed { event })
    }
}
