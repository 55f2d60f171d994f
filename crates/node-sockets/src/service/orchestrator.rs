//! # Authentication Orchestrator
//!
//! Runs the handshake state machine against the current primary and
//! executes the effects of every transition. Effects run while the machine
//! lock is held, so notifications reach the bus in transition order.
//!
//! Readiness is published on a `watch` channel after the effects of a
//! transition have run.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::time::Duration;

use shared_bus::{EventPublisher, SdkEvent};
use shared_types::{AuthChallenge, AuthResult};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::domain::{
    channels, transition, AuthContext, AuthEffect, AuthInput, AuthState, Readiness, SocketsError,
};
use crate::ports::{Connection, WalletSessionProvider};

type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

struct Machine {
    state: AuthState,
    context: AuthContext,
    primary: Option<Arc<dyn Connection>>,
    timer: Option<JoinHandle<()>>,
    timer_epoch: u64,
}

impl Machine {
    fn disarm(&mut self) {
        self.timer_epoch += 1;
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

struct Inner {
    machine: Mutex<Machine>,
    bus: Arc<dyn EventPublisher>,
    wallet: Arc<dyn WalletSessionProvider>,
    readiness: watch::Sender<Readiness>,
    auth_timeout: Duration,
}

/// Handshake driver for the current primary. Cheap to clone.
#[derive(Clone)]
pub struct AuthOrchestrator {
    inner: Arc<Inner>,
}

impl AuthOrchestrator {
    pub fn new(
        bus: Arc<dyn EventPublisher>,
        wallet: Arc<dyn WalletSessionProvider>,
        auth_timeout: Duration,
    ) -> Self {
        let (readiness, _) = watch::channel(Readiness::Unconfigured);
        Self {
            inner: Arc::new(Inner {
                machine: Mutex::new(Machine {
                    state: AuthState::Unauthenticated,
                    context: AuthContext::default(),
                    primary: None,
                    timer: None,
                    timer_epoch: 0,
                }),
                bus,
                wallet,
                readiness,
                auth_timeout,
            }),
        }
    }

    // =========================================================================
    // Primary changes
    // =========================================================================

    /// Start over against a new primary.
    ///
    /// The primary must challenge within the auth timeout; a silent
    /// primary fails readiness instead of leaving it pending.
    pub async fn restart(&self, primary: Arc<dyn Connection>, wallet: Option<String>) {
        let mut machine = self.inner.machine.lock().await;
        machine.context.node = primary.node().operator.clone();
        machine.context.wallet = wallet;
        machine.primary = Some(primary);
        info!(operator = %machine.context.node, "Authentication restarted");
        self.apply(&mut machine, AuthInput::Reset).await;
        self.apply(&mut machine, AuthInput::Engage).await;
    }

    /// Forget the primary. Primary-dependent operations fail until the
    /// next `restart`.
    pub async fn detach(&self) {
        let mut machine = self.inner.machine.lock().await;
        self.apply(&mut machine, AuthInput::Reset).await;
        machine.primary = None;
        self.inner.readiness.send_replace(Readiness::Unconfigured);
    }

    /// The primary is gone and a replacement is being selected.
    pub async fn suspend(&self) {
        let mut machine = self.inner.machine.lock().await;
        self.apply(&mut machine, AuthInput::Reset).await;
        machine.primary = None;
    }

    /// No usable primary could be established.
    pub async fn fail(&self, reason: impl Into<String>) {
        let mut machine = self.inner.machine.lock().await;
        self.apply(&mut machine, AuthInput::Reset).await;
        machine.primary = None;
        self.inner.readiness.send_replace(Readiness::Failed {
            reason: reason.into(),
        });
    }

    // =========================================================================
    // Handshake inputs
    // =========================================================================

    /// The primary pushed a challenge.
    pub async fn on_challenge(&self, challenge: AuthChallenge) {
        self.feed(AuthInput::Challenge(challenge)).await;
    }

    /// The primary returned its verdict.
    pub async fn on_verdict(&self, valid: bool) {
        self.feed(AuthInput::Verdict { valid }).await;
    }

    /// A credential for the challenge of `attempt` was obtained from the
    /// wallet or the cache. Ignored once that challenge was replaced.
    pub async fn submit_credential(&self, attempt: u64, result: AuthResult) {
        self.feed(AuthInput::Credential { attempt, result }).await;
    }

    /// The wallet declined to sign the challenge of `attempt`.
    pub async fn reject_credential(&self, attempt: u64) {
        self.feed(AuthInput::Credential {
            attempt,
            result: AuthResult::declined(),
        })
        .await;
    }

    /// The wallet provider failed on the challenge of `attempt`.
    pub async fn signing_failed(
        &self,
        attempt: u64,
        title: impl Into<String>,
        message: impl Into<String>,
    ) {
        self.feed(AuthInput::SigningFailed {
            attempt,
            title: title.into(),
            message: message.into(),
        })
        .await;
    }

    // =========================================================================
    // Observation
    // =========================================================================

    pub async fn state(&self) -> AuthState {
        self.inner.machine.lock().await.state
    }

    /// Number of the running handshake attempt.
    pub async fn attempt(&self) -> u64 {
        self.inner.machine.lock().await.context.attempt
    }

    pub fn readiness(&self) -> Readiness {
        self.inner.readiness.borrow().clone()
    }

    pub fn subscribe_readiness(&self) -> watch::Receiver<Readiness> {
        self.inner.readiness.subscribe()
    }

    /// Wait until the primary is authenticated.
    ///
    /// Fails at once when no primary is configured or the last attempt
    /// failed, and with `ReadinessTimeout` when `timeout` elapses.
    pub async fn wait_ready(&self, timeout: Duration) -> Result<String, SocketsError> {
        let mut rx = self.inner.readiness.subscribe();
        let wait = async {
            loop {
                match &*rx.borrow_and_update() {
                    Readiness::Ready { operator } => return Ok(operator.clone()),
                    Readiness::Failed { reason } => {
                        return Err(SocketsError::NotAuthenticated {
                            reason: reason.clone(),
                        })
                    }
                    Readiness::Unconfigured => return Err(SocketsError::NoPrimary),
                    Readiness::Pending => {}
                }
                if rx.changed().await.is_err() {
                    return Err(SocketsError::NoPrimary);
                }
            }
        };
        tokio::time::timeout(timeout, wait)
            .await
            .map_err(|_| SocketsError::ReadinessTimeout)?
    }

    // =========================================================================
    // Internals
    // =========================================================================

    async fn feed(&self, input: AuthInput) {
        let mut machine = self.inner.machine.lock().await;
        self.apply(&mut machine, input).await;
    }

    async fn apply(&self, machine: &mut Machine, input: AuthInput) {
        let from = machine.state;
        let step = transition(from, input, &machine.context);
        if step.is_ignored() {
            debug!(state = ?from, "Authentication input ignored");
            return;
        }
        if step.state != from {
            debug!(from = ?from, to = ?step.state, operator = %machine.context.node, "Authentication transition");
        }
        machine.state = step.state;
        machine.context.attempt = step.attempt;

        for effect in step.effects {
            self.execute(machine, effect).await;
        }
        if let Some(readiness) = step.readiness {
            self.inner.readiness.send_replace(readiness);
        }
    }

    async fn execute(&self, machine: &mut Machine, effect: AuthEffect) {
        match effect {
            AuthEffect::Notify(notification) => {
                self.inner.bus.publish(SdkEvent::Auth(notification)).await;
            }
            AuthEffect::SendCredential(frame) => match &machine.primary {
                Some(primary) => primary.emit(channels::AUTHENTICATE, frame),
                None => warn!("Credential ready but no primary attached"),
            },
            AuthEffect::ClearCachedAuth => self.inner.wallet.clear_cached_auth(),
            AuthEffect::ArmTimeout { attempt } => {
                machine.disarm();
                let epoch = machine.timer_epoch;
                let weak = Arc::downgrade(&self.inner);
                let timeout = self.inner.auth_timeout;
                machine.timer = Some(tokio::spawn(async move {
                    tokio::time::sleep(timeout).await;
                    on_timer(weak, epoch, attempt).await;
                }));
            }
            AuthEffect::DisarmTimeout => machine.disarm(),
        }
    }
}

fn on_timer(inner: Weak<Inner>, epoch: u64, attempt: u64) -> BoxFuture {
    Box::pin(async move {
        let Some(inner) = inner.upgrade() else {
            return;
        };
        let orchestrator = AuthOrchestrator { inner };
        let mut machine = orchestrator.inner.machine.lock().await;
        if machine.timer_epoch != epoch {
            return;
        }
        // Detach our own handle so the transition cannot abort this task.
        machine.timer = None;
        warn!(operator = %machine.context.node, attempt, "Authentication timed out");
        orchestrator
            .apply(&mut machine, AuthInput::TimedOut { attempt })
            .await;
    })
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(timer) = self.machine.get_mut().timer.take() {
            timer.abort();
        }
    }
}
