//! # Mock Wallet Provider
//!
//! Scripted wallet session provider for tests and demos.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use shared_types::{AuthResult, SignedChallenge, WalletError, WalletSession};
use tokio::sync::broadcast;

use crate::ports::WalletSessionProvider;

/// How the mock answers the next signing requests.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SigningOutcome {
    #[default]
    Sign,
    Decline,
    Fail(String),
}

/// Wallet provider with scripted answers.
///
/// Signed results are cached and scoped to the challenge's server signing
/// account, like a real provider persisting the last authentication.
pub struct MockWalletProvider {
    session: Mutex<Option<WalletSession>>,
    changes: broadcast::Sender<Option<WalletSession>>,
    cached: Mutex<Option<AuthResult>>,
    outcome: Mutex<SigningOutcome>,
    authenticate_calls: AtomicUsize,
    cleared: AtomicUsize,
}

impl Default for MockWalletProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockWalletProvider {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(16);
        Self {
            session: Mutex::new(None),
            changes,
            cached: Mutex::new(None),
            outcome: Mutex::new(SigningOutcome::Sign),
            authenticate_calls: AtomicUsize::new(0),
            cleared: AtomicUsize::new(0),
        }
    }

    /// Start with a paired session for `account`.
    #[must_use]
    pub fn with_account(self, account: &str) -> Self {
        *self.session.lock() = Some(WalletSession::new(vec![account.to_string()]));
        self
    }

    /// Pair, re-pair or (with `None`) unpair, notifying observers.
    pub fn set_session(&self, session: Option<WalletSession>) {
        *self.session.lock() = session.clone();
        let _ = self.changes.send(session);
    }

    pub fn set_cached(&self, result: Option<AuthResult>) {
        *self.cached.lock() = result;
    }

    pub fn cached(&self) -> Option<AuthResult> {
        self.cached.lock().clone()
    }

    pub fn set_outcome(&self, outcome: SigningOutcome) {
        *self.outcome.lock() = outcome;
    }

    pub fn authenticate_calls(&self) -> usize {
        self.authenticate_calls.load(Ordering::Relaxed)
    }

    pub fn cleared_count(&self) -> usize {
        self.cleared.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl WalletSessionProvider for MockWalletProvider {
    async fn load_session(&self) -> Result<Option<WalletSession>, WalletError> {
        Ok(self.session.lock().clone())
    }

    fn session_changes(&self) -> broadcast::Receiver<Option<WalletSession>> {
        self.changes.subscribe()
    }

    async fn cached_auth(&self) -> Option<AuthResult> {
        self.cached.lock().clone()
    }

    async fn authenticate(
        &self,
        account_id: &str,
        signed: &SignedChallenge,
        payload: &Value,
    ) -> Result<AuthResult, WalletError> {
        self.authenticate_calls.fetch_add(1, Ordering::Relaxed);
        let outcome = self.outcome.lock().clone();
        match outcome {
            SigningOutcome::Sign => {
                let result = AuthResult::signed(
                    signed.server_signing_account.clone(),
                    json!({
                        "accountId": account_id,
                        "payload": payload,
                        "userSignature": format!("signed-by-{account_id}"),
                    }),
                );
                *self.cached.lock() = Some(result.clone());
                Ok(result)
            }
            SigningOutcome::Decline => Ok(AuthResult::declined()),
            SigningOutcome::Fail(message) => Err(WalletError::Provider(message)),
        }
    }

    fn clear_cached_auth(&self) {
        self.cleared.fetch_add(1, Ordering::Relaxed);
        *self.cached.lock() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signed_by(operator: &str) -> SignedChallenge {
        SignedChallenge {
            signature: vec![0xab],
            server_signing_account: operator.into(),
        }
    }

    #[tokio::test]
    async fn test_signing_caches_scoped_result() {
        let wallet = MockWalletProvider::new().with_account("0.0.5");
        let result = wallet
            .authenticate("0.0.5", &signed_by("node-a"), &json!({"n": 1}))
            .await
            .expect("signed");

        assert!(result.is_scoped_to("node-a"));
        assert!(!result.is_scoped_to("node-b"));
        assert_eq!(wallet.cached_auth().await, Some(result));
        assert_eq!(wallet.authenticate_calls(), 1);
    }

    #[tokio::test]
    async fn test_decline_and_failure() {
        let wallet = MockWalletProvider::new();
        wallet.set_outcome(SigningOutcome::Decline);
        let declined = wallet
            .authenticate("0.0.5", &signed_by("a"), &Value::Null)
            .await
            .expect("answered");
        assert!(!declined.success);

        wallet.set_outcome(SigningOutcome::Fail("popup closed".into()));
        assert_eq!(
            wallet
                .authenticate("0.0.5", &signed_by("a"), &Value::Null)
                .await,
            Err(WalletError::Provider("popup closed".into()))
        );
        assert!(wallet.cached_auth().await.is_none());
    }

    #[tokio::test]
    async fn test_session_changes_are_broadcast() {
        let wallet = MockWalletProvider::new();
        let mut changes = wallet.session_changes();

        wallet.set_session(Some(WalletSession::new(vec!["0.0.7".into()])));
        wallet.set_session(None);

        assert_eq!(
            changes.recv().await.expect("paired").and_then(|s| s.active_account().map(str::to_string)),
            Some("0.0.7".to_string())
        );
        assert_eq!(changes.recv().await.expect("unpaired"), None);
        assert_eq!(wallet.load_session().await, Ok(None));
    }

    #[test]
    fn test_clear_cached() {
        let wallet = MockWalletProvider::new();
        wallet.set_cached(Some(AuthResult::signed("a", Value::Null)));
        wallet.clear_cached_auth();
        assert!(wallet.cached().is_none());
        assert_eq!(wallet.cleared_count(), 1);
    }
}
