//! # Connection Registry
//!
//! Owns one connection per node, the online status map and the primary
//! marker. Lifecycle announcements of every held connection are forwarded
//! to the socket driver as `SocketSignal`s tagged with the connection id;
//! the driver feeds them back through `on_lifecycle`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use shared_types::Node;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::domain::{
    ConnectionId, DisconnectReason, LifecycleEvent, NodeStatus, OnlineStatusMap, SocketsError,
};
use crate::ports::{Connection, Transport};
use crate::service::signals::SocketSignal;

/// What a lifecycle signal changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleOutcome {
    /// The signal came from a connection that is no longer held.
    Ignored,
    /// A status entry was flipped.
    Updated,
    /// The primary dropped for a transport reason.
    PrimaryLost(Node),
}

#[derive(Default)]
struct RegistryInner {
    connections: Vec<Arc<dyn Connection>>,
    status: OnlineStatusMap,
    primary: Option<usize>,
    watchers: Vec<JoinHandle<()>>,
}

impl RegistryInner {
    fn position(&self, id: ConnectionId) -> Option<usize> {
        self.connections.iter().position(|c| c.id() == id)
    }

    fn abort_watchers(&mut self) {
        for watcher in self.watchers.drain(..) {
            watcher.abort();
        }
    }

    /// Drop everything, returning the connections that still need closing.
    fn take_all(&mut self) -> Vec<Arc<dyn Connection>> {
        self.abort_watchers();
        self.primary = None;
        self.status.clear();
        std::mem::take(&mut self.connections)
    }
}

/// Set of connections with at most one primary.
pub struct ConnectionRegistry {
    transport: Arc<dyn Transport>,
    inner: RwLock<RegistryInner>,
}

impl ConnectionRegistry {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            inner: RwLock::new(RegistryInner::default()),
        }
    }

    /// Replace all held connections with one per node.
    ///
    /// Previous connections are fully disconnected first. Every new
    /// connection starts offline and is then opened. Nodes repeating an
    /// operator are skipped.
    pub async fn initialize(
        &self,
        nodes: &[Node],
        wallet: Option<&str>,
        signals: &mpsc::UnboundedSender<SocketSignal>,
    ) {
        let previous = self.inner.write().take_all();
        for connection in &previous {
            connection.disconnect().await;
        }
        if !previous.is_empty() {
            debug!(count = previous.len(), "Previous connections closed");
        }

        let mut seen = HashSet::new();
        let mut fresh: Vec<Arc<dyn Connection>> = Vec::with_capacity(nodes.len());
        let mut status = OnlineStatusMap::new();
        let mut watchers = Vec::with_capacity(nodes.len());

        for node in nodes {
            if !seen.insert(node.operator.as_str()) {
                warn!(operator = %node.operator, "Duplicate node in directory, skipping");
                continue;
            }
            let connection = self.transport.open(node, wallet);
            status.seed(node.clone());
            watchers.push(watch_lifecycle(
                connection.id(),
                connection.lifecycle(),
                signals.clone(),
            ));
            fresh.push(connection);
        }

        {
            let mut inner = self.inner.write();
            inner.connections = fresh.clone();
            inner.status = status;
            inner.watchers = watchers;
        }

        for connection in &fresh {
            connection.connect().await;
        }
        info!(nodes = fresh.len(), "Connection registry initialized");
    }

    /// Mark the connection to `node` primary.
    pub fn select_primary(&self, node: &Node) -> Result<Arc<dyn Connection>, SocketsError> {
        let mut inner = self.inner.write();
        if inner.connections.is_empty() {
            return Err(SocketsError::NoNodes);
        }
        let index = inner
            .connections
            .iter()
            .position(|c| c.node().operator == node.operator)
            .ok_or_else(|| SocketsError::PrimaryNotFound {
                operator: node.operator.clone(),
            })?;
        inner.primary = Some(index);
        debug!(operator = %node.operator, "Primary selected");
        Ok(inner.connections[index].clone())
    }

    pub fn clear_primary(&self) {
        self.inner.write().primary = None;
    }

    pub fn primary(&self) -> Option<Arc<dyn Connection>> {
        let inner = self.inner.read();
        inner.primary.map(|i| inner.connections[i].clone())
    }

    pub fn primary_id(&self) -> Option<ConnectionId> {
        let inner = self.inner.read();
        inner.primary.map(|i| inner.connections[i].id())
    }

    /// Number of connections currently marked primary (0 or 1).
    pub fn primary_count(&self) -> usize {
        usize::from(self.inner.read().primary.is_some())
    }

    /// Apply a lifecycle announcement of connection `id`.
    pub fn on_lifecycle(&self, id: ConnectionId, event: LifecycleEvent) -> LifecycleOutcome {
        let mut inner = self.inner.write();
        let Some(index) = inner.position(id) else {
            debug!(connection = %id, ?event, "Signal from released connection ignored");
            return LifecycleOutcome::Ignored;
        };
        let node = inner.connections[index].node().clone();

        match event {
            LifecycleEvent::Connected => {
                inner.status.set_online(&node.operator, true);
                debug!(operator = %node.operator, "Node online");
                LifecycleOutcome::Updated
            }
            LifecycleEvent::Disconnected(reason) => {
                inner.status.set_online(&node.operator, false);
                debug!(operator = %node.operator, ?reason, "Node offline");
                if inner.primary == Some(index) && reason == DisconnectReason::Transport {
                    LifecycleOutcome::PrimaryLost(node)
                } else {
                    LifecycleOutcome::Updated
                }
            }
        }
    }

    /// Disconnect and release every connection.
    pub async fn teardown(&self) {
        let previous = self.inner.write().take_all();
        for connection in &previous {
            connection.disconnect().await;
        }
        debug!(count = previous.len(), "Connection registry torn down");
    }

    pub fn status(&self) -> HashMap<String, NodeStatus> {
        self.inner.read().status.snapshot()
    }

    pub fn is_online(&self, operator: &str) -> bool {
        self.inner.read().status.is_online(operator)
    }

    /// First held node, in registration order, that is online and not
    /// `except`.
    pub fn online_node_except(&self, except: &str) -> Option<Node> {
        let inner = self.inner.read();
        inner
            .connections
            .iter()
            .map(|connection| connection.node())
            .find(|node| node.operator != except && inner.status.is_online(&node.operator))
            .cloned()
    }

    pub fn contains(&self, operator: &str) -> bool {
        self.inner.read().status.get(operator).is_some()
    }

    pub fn len(&self) -> usize {
        self.inner.read().connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().connections.is_empty()
    }
}

impl Drop for ConnectionRegistry {
    fn drop(&mut self) {
        self.inner.get_mut().abort_watchers();
    }
}

fn watch_lifecycle(
    id: ConnectionId,
    mut lifecycle: broadcast::Receiver<LifecycleEvent>,
    signals: mpsc::UnboundedSender<SocketSignal>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match lifecycle.recv().await {
                Ok(event) => {
                    if signals.send(SocketSignal::Lifecycle { id, event }).is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    warn!(connection = %id, lagged = count, "Lifecycle signals dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
