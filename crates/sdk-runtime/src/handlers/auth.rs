//! # Authentication Event Handler
//!
//! Answers node challenges with a wallet credential.
//!
//! ## Flow
//!
//! ```text
//! loading notification ──→ cached credential scoped to the node? ──yes──→ submit
//!                                     │ no
//!                                     ▼
//!                          publish loading outward
//!                                     │
//!                                     ▼
//!                          wallet.authenticate(..)
//!                           ├─ signed    → submit_credential
//!                           ├─ declined  → reject_credential
//!                           └─ error     → signing_failed
//! ```
//!
//! Every answer carries the attempt number of the challenge it signs. The
//! orchestrator drops answers for a challenge that was replaced while the
//! wallet was busy, so a signature never leaves under another wallet id.

use std::sync::Arc;

use node_sockets::{NodeSockets, NodeSocketsApi, WalletSessionProvider};
use shared_bus::{AuthNotification, EventPublisher, SdkEvent};
use shared_types::AuthResult;
use tracing::{debug, info, warn};

/// Title of the notification raised when the wallet provider fails.
pub const SIGNING_ERROR_TITLE: &str = "Authentication Error";

/// Handler for challenge notifications. Cheap to clone.
#[derive(Clone)]
pub struct AuthEventHandler {
    sockets: Arc<NodeSockets>,
    wallet: Arc<dyn WalletSessionProvider>,
    outward: Arc<dyn EventPublisher>,
}

impl AuthEventHandler {
    pub fn new(
        sockets: Arc<NodeSockets>,
        wallet: Arc<dyn WalletSessionProvider>,
        outward: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            sockets,
            wallet,
            outward,
        }
    }

    /// Answer one challenge. Notifications without challenge data are
    /// ignored.
    pub async fn handle_challenge(&self, notification: AuthNotification) {
        let (Some(node), Some(data)) = (notification.node.clone(), notification.data.clone())
        else {
            debug!("Loading notification without challenge, ignored");
            return;
        };

        if let Some(cached) = self.scoped_cached_auth(&node).await {
            info!(operator = %node, "Reusing cached credential");
            self.submit(&node, data.attempt, cached).await;
            return;
        }

        self.outward.publish(SdkEvent::Auth(notification)).await;

        let challenge = &data.auth_response;
        let outcome = self
            .wallet
            .authenticate(&data.wallet, &challenge.signed_data, &challenge.payload)
            .await;

        if !self.is_current(&node) {
            debug!(operator = %node, attempt = data.attempt, "Primary changed while signing, credential dropped");
            return;
        }
        let orchestrator = self.sockets.orchestrator();
        match outcome {
            Ok(result) if result.success => {
                orchestrator.submit_credential(data.attempt, result).await
            }
            Ok(_) => {
                info!(operator = %node, "Wallet declined to sign");
                orchestrator.reject_credential(data.attempt).await;
            }
            Err(e) => {
                warn!(operator = %node, error = %e, "Wallet signing failed");
                orchestrator
                    .signing_failed(data.attempt, SIGNING_ERROR_TITLE, e.to_string())
                    .await;
            }
        }
    }

    async fn scoped_cached_auth(&self, node: &str) -> Option<AuthResult> {
        self.wallet
            .cached_auth()
            .await
            .filter(|cached| cached.is_scoped_to(node))
    }

    async fn submit(&self, node: &str, attempt: u64, result: AuthResult) {
        if self.is_current(node) {
            self.sockets
                .orchestrator()
                .submit_credential(attempt, result)
                .await;
        }
    }

    fn is_current(&self, node: &str) -> bool {
        self.sockets
            .primary_node()
            .is_some_and(|primary| primary.operator == node)
    }
}
