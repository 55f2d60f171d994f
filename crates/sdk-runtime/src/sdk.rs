//! # Smart Node SDK
//!
//! The orchestration root.
//!
//! ## Startup Sequence
//!
//! 1. Point the directory at the configured network
//! 2. Start the event relay (before any node can publish)
//! 3. Restore the wallet session
//! 4. Initialise the node sockets and authenticate the primary
//! 5. Watch the wallet session; on every change drop the cached credential
//!    and re-initialise

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use node_sockets::{
    AuthOrchestrator, NodeDirectory, NodeSockets, NodeSocketsApi, NodeStatus, Readiness,
    Transport, WalletSessionProvider,
};
use parking_lot::Mutex;
use serde_json::Value;
use shared_bus::{EventFilter, EventPublisher, EventStream, InMemoryEventBus, Subscription};
use shared_types::WalletSession;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::adapters::RestClient;
use crate::container::SdkConfig;
use crate::errors::SdkError;
use crate::handlers::AuthEventHandler;
use crate::wiring::EventRelay;

/// Entry point of the SDK.
pub struct SmartNodeSdk {
    config: SdkConfig,
    internal: Arc<InMemoryEventBus>,
    outward: Arc<InMemoryEventBus>,
    sockets: Arc<NodeSockets>,
    directory: Arc<dyn NodeDirectory>,
    wallet: Arc<dyn WalletSessionProvider>,
    rest: Arc<dyn RestClient>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SmartNodeSdk {
    /// Assemble the SDK. Nothing is contacted until `start()`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(
        config: SdkConfig,
        transport: Arc<dyn Transport>,
        directory: Arc<dyn NodeDirectory>,
        wallet: Arc<dyn WalletSessionProvider>,
        rest: Arc<dyn RestClient>,
    ) -> Self {
        let internal = Arc::new(InMemoryEventBus::with_capacity(config.bus.capacity));
        let outward = Arc::new(InMemoryEventBus::with_capacity(config.bus.capacity));
        let sockets = NodeSockets::new(
            transport,
            directory.clone(),
            wallet.clone(),
            internal.clone(),
            config.sockets_config(),
        );
        Self {
            config,
            internal,
            outward,
            sockets,
            directory,
            wallet,
            rest,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Run the startup sequence.
    ///
    /// # Errors
    ///
    /// Fails when the directory, the wallet provider or the node list is
    /// unusable. Background tasks started before the failure keep running
    /// until `shutdown()`.
    pub async fn start(&self) -> Result<()> {
        info!(network = %self.config.network, "Starting Smart Node SDK");

        self.directory
            .set_network(self.config.network)
            .await
            .with_context(|| format!("Failed to select network {}", self.config.network))?;

        let handler = AuthEventHandler::new(
            self.sockets.clone(),
            self.wallet.clone(),
            self.outward.clone(),
        );
        let relay = EventRelay::new(&self.internal, self.outward.clone(), handler).spawn();
        self.tasks.lock().push(relay);

        // Subscribe before loading so a pairing during startup is not lost.
        let changes = self.wallet.session_changes();
        let session = self
            .wallet
            .load_session()
            .await
            .context("Failed to load wallet session")?;

        init_sockets(&self.directory, &self.sockets, session.as_ref())
            .await
            .context("Failed to initialise node sockets")?;

        let watcher = tokio::spawn(watch_sessions(
            changes,
            self.directory.clone(),
            self.wallet.clone(),
            self.sockets.clone(),
        ));
        self.tasks.lock().push(watcher);

        info!(
            nodes = self.sockets.registry().len(),
            primary = ?self.sockets.primary_node().map(|n| n.operator),
            "Smart Node SDK started"
        );
        Ok(())
    }

    /// Rebuild the connections for the directory's current node list.
    pub async fn init_sockets(&self, session: Option<&WalletSession>) -> Result<(), SdkError> {
        init_sockets(&self.directory, &self.sockets, session).await
    }

    /// Run the handshake against the current primary again.
    pub async fn authorize_wallet(&self) -> Result<(), SdkError> {
        Ok(self.sockets.authorize_wallet().await?)
    }

    // =========================================================================
    // Primary operations
    // =========================================================================

    /// Emit on the authenticated primary.
    pub async fn send_message(&self, topic: &str, payload: Value) -> Result<(), SdkError> {
        Ok(self.sockets.send_message(topic, payload).await?)
    }

    /// Reserve a token for a wallet; resolves with the reservation number.
    pub async fn reserve_nft(&self, token_id: &str, wallet_id: &str) -> Result<u64, SdkError> {
        Ok(self.sockets.reserve_nft(token_id, wallet_id).await?)
    }

    /// Submit a pool join; resolves with the node's payload.
    pub async fn mint_lp_nft(&self, join_pool: Value) -> Result<Value, SdkError> {
        Ok(self.sockets.mint_lp_nft(join_pool).await?)
    }

    // =========================================================================
    // Outward stream
    // =========================================================================

    /// Every event relayed from now on.
    pub fn events(&self) -> Subscription {
        self.outward.subscribe(EventFilter::all())
    }

    /// Relayed events matching `filter`, as a stream.
    pub fn event_stream(&self, filter: EventFilter) -> EventStream {
        self.outward.event_stream(filter)
    }

    /// Events relayed so far.
    pub fn events_relayed(&self) -> u64 {
        self.outward.events_published()
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn sockets(&self) -> &Arc<NodeSockets> {
        &self.sockets
    }

    pub fn orchestrator(&self) -> &AuthOrchestrator {
        self.sockets.orchestrator()
    }

    pub fn directory(&self) -> &Arc<dyn NodeDirectory> {
        &self.directory
    }

    pub fn wallet(&self) -> &Arc<dyn WalletSessionProvider> {
        &self.wallet
    }

    pub fn rest(&self) -> &Arc<dyn RestClient> {
        &self.rest
    }

    pub fn config(&self) -> &SdkConfig {
        &self.config
    }

    pub fn nodes_online(&self) -> HashMap<String, NodeStatus> {
        self.sockets.nodes_online()
    }

    pub fn readiness(&self) -> Readiness {
        self.sockets.readiness()
    }

    /// Stop background tasks and disconnect every node.
    pub async fn shutdown(&self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        self.sockets.shutdown().await;
        info!("Smart Node SDK stopped");
    }
}

impl Drop for SmartNodeSdk {
    fn drop(&mut self) {
        for task in self.tasks.get_mut().drain(..) {
            task.abort();
        }
    }
}

async fn init_sockets(
    directory: &Arc<dyn NodeDirectory>,
    sockets: &NodeSockets,
    session: Option<&WalletSession>,
) -> Result<(), SdkError> {
    let nodes = directory.network().await?;
    sockets.init(session, nodes).await?;
    Ok(())
}

async fn watch_sessions(
    mut changes: tokio::sync::broadcast::Receiver<Option<WalletSession>>,
    directory: Arc<dyn NodeDirectory>,
    wallet: Arc<dyn WalletSessionProvider>,
    sockets: Arc<NodeSockets>,
) {
    loop {
        match changes.recv().await {
            Ok(session) => {
                info!(
                    account = ?session.as_ref().and_then(WalletSession::active_account),
                    "Wallet session changed, re-initialising"
                );
                // A credential signed by the previous session must not be replayed.
                wallet.clear_cached_auth();
                if let Err(e) = init_sockets(&directory, &sockets, session.as_ref()).await {
                    error!(error = %e, "Re-initialisation after wallet change failed");
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Missed wallet session changes");
            }
            Err(RecvError::Closed) => return,
        }
    }
}
