//! # Driven Ports (Outbound SPI)
//!
//! Interfaces the host application implements. All of them must be
//! `Send + Sync`; the socket service calls them from several tasks.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use shared_types::{
    AuthResult, DirectoryError, NetworkEnv, Node, SignedChallenge, WalletError, WalletSession,
};
use tokio::sync::broadcast;

use crate::domain::{ConnectionId, ConnectionState, LifecycleEvent, PayloadStream, PendingEvent};

/// One transport-level link to a single node.
///
/// # Contract
///
/// - `connect()` and `disconnect()` are idempotent.
/// - Every state change is announced on `lifecycle()` exactly once.
/// - Disconnecting cancels every pending `subscribe_once` wait.
/// - A connection never switches to a different node.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Identity of this instance.
    fn id(&self) -> ConnectionId;

    /// The node this connection talks to.
    fn node(&self) -> &Node;

    fn state(&self) -> ConnectionState;

    /// Open the link.
    async fn connect(&self);

    /// Close the link. Announces `Disconnected(Requested)`.
    async fn disconnect(&self);

    /// Fire-and-forget send. Dropped when the link is down.
    fn emit(&self, topic: &str, payload: Value);

    /// Every future payload of `event`, for the connection's lifetime.
    fn subscribe(&self, event: &str) -> PayloadStream;

    /// The next payload of `event`.
    ///
    /// Registered before this call returns.
    fn subscribe_once(&self, event: &str) -> PendingEvent;

    /// Lifecycle announcements.
    fn lifecycle(&self) -> broadcast::Receiver<LifecycleEvent>;
}

/// Factory for connections.
pub trait Transport: Send + Sync {
    /// Create a (not yet connected) connection to `node`.
    ///
    /// `wallet` is the active account, sent by real transports in the
    /// connection query so the node can scope its challenge.
    fn open(&self, node: &Node, wallet: Option<&str>) -> Arc<dyn Connection>;
}

/// Source of the node list and the current-node selection.
#[async_trait]
pub trait NodeDirectory: Send + Sync {
    /// The node currently selected as primary candidate.
    fn current_node(&self) -> Option<Node>;

    /// Point the directory at a network environment and refresh it.
    async fn set_network(&self, env: NetworkEnv) -> Result<(), DirectoryError>;

    /// Nodes of the current environment.
    async fn network(&self) -> Result<Vec<Node>, DirectoryError>;

    /// Select a different current node.
    fn shuffle_node(&self);

    /// Make `operator` the current node. Returns false when the directory
    /// cannot select it, in which case the current node is unchanged.
    fn select_node(&self, _operator: &str) -> bool {
        false
    }
}

/// Holder of the paired wallet session and its signing capability.
#[async_trait]
pub trait WalletSessionProvider: Send + Sync {
    /// Restore a persisted session, if any.
    async fn load_session(&self) -> Result<Option<WalletSession>, WalletError>;

    /// Pairing and unpairing signals. `None` means the wallet disconnected.
    fn session_changes(&self) -> broadcast::Receiver<Option<WalletSession>>;

    /// A previously obtained credential, if one is cached.
    async fn cached_auth(&self) -> Option<AuthResult>;

    /// Ask the wallet to sign a node challenge.
    async fn authenticate(
        &self,
        account_id: &str,
        signed: &SignedChallenge,
        payload: &Value,
    ) -> Result<AuthResult, WalletError>;

    /// Forget the cached credential.
    fn clear_cached_auth(&self);
}
