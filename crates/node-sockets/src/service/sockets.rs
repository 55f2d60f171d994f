//! # Node Sockets Service
//!
//! Wires the registry, the orchestrator and the directory together.
//!
//! A single driver task consumes every `SocketSignal`. Registry updates and
//! failover happen only there, so the callbacks of one connection never run
//! concurrently. Initialisation and failover are serialised by a
//! transition lock; callers are gated on the orchestrator's readiness, so
//! they never use a primary that is connected but unauthenticated.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use shared_bus::{ErrorNotification, EventPublisher, SdkEvent, ServerEvent, Severity};
use shared_types::{AuthChallenge, Node, WalletSession};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_stream::{StreamExt, StreamMap};
use tracing::{debug, error, info, warn};

use crate::domain::{
    ConnectionState, NodeStatus, PayloadStream, Readiness, SocketsConfig, SocketsError,
};
use crate::ports::{Connection, NodeDirectory, NodeSocketsApi, Transport, WalletSessionProvider};
use crate::service::orchestrator::AuthOrchestrator;
use crate::service::registry::{ConnectionRegistry, LifecycleOutcome};
use crate::service::signals::{ServerMessage, SocketSignal};

/// Primary-node connection service.
pub struct NodeSockets {
    registry: ConnectionRegistry,
    orchestrator: AuthOrchestrator,
    directory: Arc<dyn NodeDirectory>,
    bus: Arc<dyn EventPublisher>,
    config: SocketsConfig,
    signals: mpsc::UnboundedSender<SocketSignal>,
    wallet_account: RwLock<Option<String>>,
    transitions: tokio::sync::Mutex<()>,
    pumps: Mutex<Option<JoinHandle<()>>>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl NodeSockets {
    /// Create the service and spawn its driver task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(
        transport: Arc<dyn Transport>,
        directory: Arc<dyn NodeDirectory>,
        wallet: Arc<dyn WalletSessionProvider>,
        bus: Arc<dyn EventPublisher>,
        config: SocketsConfig,
    ) -> Arc<Self> {
        let (signals, rx) = mpsc::unbounded_channel();
        let sockets = Arc::new(Self {
            registry: ConnectionRegistry::new(transport),
            orchestrator: AuthOrchestrator::new(bus.clone(), wallet, config.auth_timeout),
            directory,
            bus,
            config,
            signals,
            wallet_account: RwLock::new(None),
            transitions: tokio::sync::Mutex::new(()),
            pumps: Mutex::new(None),
            driver: Mutex::new(None),
        });
        let driver = tokio::spawn(drive(Arc::downgrade(&sockets), rx));
        *sockets.driver.lock() = Some(driver);
        sockets
    }

    // =========================================================================
    // Initialisation
    // =========================================================================

    /// Rebuild every connection for `nodes` and authenticate the primary.
    ///
    /// `session` scopes the handshake to its active account. Safe to call
    /// again whenever the wallet session or the node list changes.
    pub async fn init(
        &self,
        session: Option<&WalletSession>,
        nodes: Vec<Node>,
    ) -> Result<(), SocketsError> {
        let _guard = self.transitions.lock().await;

        let wallet = session
            .and_then(WalletSession::active_account)
            .map(str::to_string);
        *self.wallet_account.write() = wallet.clone();

        self.stop_pumps();
        self.orchestrator.detach().await;
        self.registry
            .initialize(&nodes, wallet.as_deref(), &self.signals)
            .await;

        if self.registry.is_empty() {
            warn!("Directory returned no nodes");
            return Err(SocketsError::NoNodes);
        }
        self.start_auth().await
    }

    /// Select the directory's current node as primary and run the handshake.
    pub async fn init_auth(&self) -> Result<(), SocketsError> {
        let _guard = self.transitions.lock().await;
        self.start_auth().await
    }

    async fn start_auth(&self) -> Result<(), SocketsError> {
        let current = self.directory.current_node().ok_or(SocketsError::NoPrimary)?;
        let primary = match self.registry.select_primary(&current) {
            Ok(primary) => primary,
            Err(e) => {
                error!(operator = %current.operator, error = %e, "Directory and registry diverged");
                return Err(e);
            }
        };
        self.engage(primary).await;
        Ok(())
    }

    /// Attach pumps, restart the handshake and ask the node to challenge.
    async fn engage(&self, primary: Arc<dyn Connection>) {
        self.attach_primary(&primary);
        let wallet = self.wallet_account.read().clone();
        self.orchestrator.restart(primary.clone(), wallet).await;
        authorize(primary.as_ref()).await;
        info!(operator = %primary.node().operator, "Primary engaged");
    }

    /// Pump the primary's server channels into the driver.
    fn attach_primary(&self, primary: &Arc<dyn Connection>) {
        let mut streams: StreamMap<&'static str, PayloadStream> = StreamMap::new();
        for channel in ServerMessage::CHANNELS {
            streams.insert(channel, primary.subscribe(channel));
        }

        let id = primary.id();
        let signals = self.signals.clone();
        let pump = tokio::spawn(async move {
            while let Some((channel, payload)) = streams.next().await {
                let Some(message) = ServerMessage::from_channel(channel, payload) else {
                    continue;
                };
                if signals.send(SocketSignal::Server { id, message }).is_err() {
                    break;
                }
            }
        });

        if let Some(previous) = self.pumps.lock().replace(pump) {
            previous.abort();
        }
    }

    fn stop_pumps(&self) {
        if let Some(pump) = self.pumps.lock().take() {
            pump.abort();
        }
    }

    /// Restart the handshake and reconnect the primary so the node issues
    /// a fresh challenge.
    pub async fn authorize_wallet(&self) -> Result<(), SocketsError> {
        let _guard = self.transitions.lock().await;
        let primary = self.registry.primary().ok_or(SocketsError::NoPrimary)?;
        self.engage(primary).await;
        Ok(())
    }

    // =========================================================================
    // Driver
    // =========================================================================

    async fn handle_signal(&self, signal: SocketSignal) {
        match signal {
            SocketSignal::Lifecycle { id, event } => match self.registry.on_lifecycle(id, event) {
                LifecycleOutcome::PrimaryLost(node) => self.failover(node).await,
                LifecycleOutcome::Updated | LifecycleOutcome::Ignored => {}
            },
            SocketSignal::Server { id, message } => {
                let Some(primary) = self.registry.primary().filter(|p| p.id() == id) else {
                    debug!(channel = message.channel(), "Message from non-primary ignored");
                    return;
                };
                self.handle_server_message(primary.node(), message).await;
            }
        }
    }

    async fn handle_server_message(&self, node: &Node, message: ServerMessage) {
        match message {
            ServerMessage::Authentication(payload) => {
                match serde_json::from_value::<AuthChallenge>(payload) {
                    Ok(challenge) => self.orchestrator.on_challenge(challenge).await,
                    Err(e) => {
                        warn!(operator = %node.operator, error = %e, "Malformed challenge");
                        self.bus
                            .publish(SdkEvent::Errors(ErrorNotification {
                                node: Some(node.operator.clone()),
                                ..ErrorNotification::local(
                                    "Authentication Error",
                                    format!("Malformed challenge: {e}"),
                                    Severity::Danger,
                                )
                            }))
                            .await;
                    }
                }
            }
            ServerMessage::Authenticate(payload) => {
                let valid = payload
                    .get("isValidSignature")
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                self.orchestrator.on_verdict(valid).await;
            }
            ServerMessage::Events(payload) => {
                self.bus
                    .publish(SdkEvent::Events(ServerEvent {
                        node: node.operator.clone(),
                        payload,
                    }))
                    .await;
            }
            ServerMessage::Errors(payload) => {
                self.bus
                    .publish(SdkEvent::Errors(ErrorNotification::from_node(
                        &node.operator,
                        payload,
                    )))
                    .await;
            }
        }
    }

    /// Replace a primary that dropped.
    async fn failover(&self, lost: Node) {
        let _guard = self.transitions.lock().await;
        if self.registry.primary().map(|p| p.node().clone()) != Some(lost.clone()) {
            debug!(operator = %lost.operator, "Primary already replaced");
            return;
        }

        warn!(operator = %lost.operator, "Primary lost, failing over");
        self.stop_pumps();
        self.orchestrator.suspend().await;

        let next = self
            .failover_candidate(&lost.operator)
            .ok_or_else(|| SocketsError::NoFailoverCandidate {
                operator: lost.operator.clone(),
            })
            .and_then(|node| self.registry.select_primary(&node));

        match next {
            Ok(primary) => {
                info!(from = %lost.operator, to = %primary.node().operator, "Failover selected new primary");
                self.engage(primary).await;
            }
            Err(e) => {
                error!(operator = %lost.operator, error = %e, "Failover failed");
                self.registry.clear_primary();
                self.bus
                    .publish(SdkEvent::Errors(ErrorNotification::local(
                        "Failover Failed",
                        e.to_string(),
                        Severity::Danger,
                    )))
                    .await;
                self.orchestrator.fail(e.to_string()).await;
            }
        }
    }

    /// Shuffle the directory until it names a different held node.
    ///
    /// Online nodes are preferred. When the shuffles only turn up offline
    /// nodes, an online registry entry the directory can select wins over
    /// them; an offline node is the last resort.
    fn failover_candidate(&self, lost: &str) -> Option<Node> {
        let mut fallback = None;
        for _ in 0..self.registry.len() {
            self.directory.shuffle_node();
            let Some(node) = self.directory.current_node() else {
                continue;
            };
            if node.operator == lost || !self.registry.contains(&node.operator) {
                continue;
            }
            if self.registry.is_online(&node.operator) {
                return Some(node);
            }
            fallback.get_or_insert(node);
        }
        if let Some(online) = self.registry.online_node_except(lost) {
            if self.directory.select_node(&online.operator) {
                debug!(operator = %online.operator, "Failover picked online registry entry");
                return Some(online);
            }
        }
        fallback
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn orchestrator(&self) -> &AuthOrchestrator {
        &self.orchestrator
    }

    pub fn directory(&self) -> &Arc<dyn NodeDirectory> {
        &self.directory
    }

    pub fn config(&self) -> &SocketsConfig {
        &self.config
    }

    /// Active wallet account of the last `init`.
    pub fn wallet_account(&self) -> Option<String> {
        self.wallet_account.read().clone()
    }

    pub fn readiness(&self) -> Readiness {
        self.orchestrator.readiness()
    }

    /// Disconnect everything and stop background tasks.
    pub async fn shutdown(&self) {
        let _guard = self.transitions.lock().await;
        self.stop_pumps();
        self.orchestrator.detach().await;
        self.registry.teardown().await;
        if let Some(driver) = self.driver.lock().take() {
            driver.abort();
        }
        info!("Node sockets shut down");
    }

    /// The authenticated primary, waiting out a handshake or a failover.
    ///
    /// A primary whose link dropped still reads as ready until the driver
    /// starts the failover, so its link state is checked too.
    async fn ready_primary(&self) -> Result<Arc<dyn Connection>, SocketsError> {
        let deadline = Instant::now() + self.config.ready_timeout;
        let mut changes = self.orchestrator.subscribe_readiness();
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let operator = self.orchestrator.wait_ready(remaining).await?;
            let primary = self.registry.primary().filter(|p| {
                p.node().operator == operator && p.state() == ConnectionState::Connected
            });
            if let Some(primary) = primary {
                return Ok(primary);
            }
            debug!(operator = %operator, "Primary link down, waiting for failover");
            let remaining = deadline.saturating_duration_since(Instant::now());
            match tokio::time::timeout(remaining, changes.changed()).await {
                Ok(Ok(())) => {}
                Ok(Err(_)) => return Err(SocketsError::NoPrimary),
                Err(_) => return Err(SocketsError::ReadinessTimeout),
            }
        }
    }
}

#[async_trait]
impl NodeSocketsApi for NodeSockets {
    async fn send_message(&self, topic: &str, payload: Value) -> Result<(), SocketsError> {
        let primary = self.ready_primary().await?;
        primary.emit(topic, payload);
        Ok(())
    }

    async fn request(&self, topic: &str, payload: Value) -> Result<Value, SocketsError> {
        let primary = self.ready_primary().await?;
        let pending = primary.subscribe_once(topic);
        primary.emit(topic, payload);

        let response = tokio::time::timeout(self.config.request_timeout, pending.wait())
            .await
            .map_err(|_| SocketsError::RequestTimeout {
                topic: topic.to_string(),
            })??;
        Ok(response)
    }

    fn nodes_online(&self) -> HashMap<String, NodeStatus> {
        self.registry.status()
    }

    fn primary_node(&self) -> Option<Node> {
        self.registry.primary().map(|p| p.node().clone())
    }
}

impl Drop for NodeSockets {
    fn drop(&mut self) {
        if let Some(pump) = self.pumps.get_mut().take() {
            pump.abort();
        }
        if let Some(driver) = self.driver.get_mut().take() {
            driver.abort();
        }
    }
}

async fn drive(sockets: Weak<NodeSockets>, mut signals: mpsc::UnboundedReceiver<SocketSignal>) {
    while let Some(signal) = signals.recv().await {
        let Some(sockets) = sockets.upgrade() else {
            break;
        };
        sockets.handle_signal(signal).await;
    }
    debug!("Socket driver stopped");
}

async fn authorize(primary: &dyn Connection) {
    primary.disconnect().await;
    primary.connect().await;
}
