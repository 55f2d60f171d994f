//! # Authentication State Machine
//!
//! Challenge/response handshake run once per primary lifetime:
//!
//! ```text
//!              Engage                     Challenge                   Credential
//! Unauthenticated ──→ AwaitingChallenge ──────────→ ChallengeIssued ──────────→ Verifying
//!        ↑                    │                            │                        │
//!        │                timed out            declined / signing failed     Verdict{valid}
//!        │                    │                      / timed out                    │
//!        └────────────────────┴────────────────────────────┴──── invalid ───────────┴──→ Authenticated
//! ```
//!
//! Every `Engage` and every `Challenge` opens a new attempt. Credentials,
//! signing failures and timers name the attempt they answer; anything
//! naming an older attempt is ignored.
//!
//! `transition` is pure: it returns the next state plus the effects the
//! service must execute. Any (state, input) pair not listed above is ignored.

use serde_json::{json, Value};
use shared_bus::AuthNotification;
use shared_types::{AuthChallenge, AuthResult};

/// Handshake state of the current primary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthState {
    #[default]
    Unauthenticated,
    /// A primary is attached and reconnected; its challenge is due.
    AwaitingChallenge,
    ChallengeIssued,
    Verifying,
    Authenticated,
}

/// Whether primary-dependent operations may proceed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Readiness {
    /// No primary has been configured.
    #[default]
    Unconfigured,
    /// A primary is selected; the handshake has not finished.
    Pending,
    /// The primary is authenticated.
    Ready { operator: String },
    /// The handshake or the failover failed. Reconnecting retries.
    Failed { reason: String },
}

impl Readiness {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready { .. })
    }
}

/// What the transition function needs to know about the primary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthContext {
    /// Operator of the primary node.
    pub node: String,
    /// Active wallet account, if a session is paired.
    pub wallet: Option<String>,
    /// Number of the current handshake attempt.
    pub attempt: u64,
}

/// Discrete inputs of the handshake.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthInput {
    /// The primary pushed a challenge.
    Challenge(AuthChallenge),
    /// The wallet (or the cache) produced a credential for `attempt`.
    Credential { attempt: u64, result: AuthResult },
    /// The wallet provider failed while signing for `attempt`.
    SigningFailed {
        attempt: u64,
        title: String,
        message: String,
    },
    /// The primary returned its verdict.
    Verdict { valid: bool },
    /// The timer armed for `attempt` fired.
    TimedOut { attempt: u64 },
    /// The primary changed.
    Reset,
    /// A primary is attached and asked to challenge.
    Engage,
}

/// Side effects requested by a transition.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthEffect {
    /// Publish an `auth` notification.
    Notify(AuthNotification),
    /// Emit on the primary's `authenticate` channel.
    SendCredential(Value),
    /// Drop the provider's cached credential.
    ClearCachedAuth,
    /// Start the timer for this attempt, replacing any running one.
    ArmTimeout { attempt: u64 },
    /// Stop the running timer.
    DisarmTimeout,
}

/// Result of one transition.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub state: AuthState,
    pub attempt: u64,
    pub effects: Vec<AuthEffect>,
    /// New readiness, if it changes.
    pub readiness: Option<Readiness>,
}

impl Transition {
    fn ignored(state: AuthState, ctx: &AuthContext) -> Self {
        Self {
            state,
            attempt: ctx.attempt,
            effects: Vec::new(),
            readiness: None,
        }
    }

    fn to(state: AuthState, ctx: &AuthContext, effects: Vec<AuthEffect>, readiness: Readiness) -> Self {
        Self {
            state,
            attempt: ctx.attempt,
            effects,
            readiness: Some(readiness),
        }
    }

    pub fn is_ignored(&self) -> bool {
        self.effects.is_empty() && self.readiness.is_none()
    }
}

/// Frame sent on `authenticate` for a credential.
pub fn credential_frame(result: &AuthResult, wallet: &str) -> Value {
    json!({
        "signedData": result,
        "walletId": wallet,
    })
}

/// Apply one input to the handshake.
pub fn transition(state: AuthState, input: AuthInput, ctx: &AuthContext) -> Transition {
    use AuthState::*;

    let node = ctx.node.as_str();
    match (state, input) {
        (Unauthenticated | AwaitingChallenge, AuthInput::Challenge(challenge)) => {
            let Some(wallet) = ctx.wallet.as_deref() else {
                return Transition::to(
                    Unauthenticated,
                    ctx,
                    vec![
                        AuthEffect::DisarmTimeout,
                        AuthEffect::Notify(AuthNotification::error(
                            Some(node),
                            "Wallet Not Connected",
                            "Connect a wallet to authenticate with the node.",
                        )),
                    ],
                    Readiness::Failed {
                        reason: "no wallet session".into(),
                    },
                );
            };
            let attempt = ctx.attempt + 1;
            Transition {
                state: ChallengeIssued,
                attempt,
                effects: vec![
                    AuthEffect::Notify(AuthNotification::loading(node, challenge, wallet, attempt)),
                    AuthEffect::ArmTimeout { attempt },
                ],
                readiness: Some(Readiness::Pending),
            }
        }

        (ChallengeIssued, AuthInput::Credential { attempt, result }) if attempt == ctx.attempt => {
            if !result.success {
                return Transition::to(
                    Unauthenticated,
                    ctx,
                    vec![
                        AuthEffect::DisarmTimeout,
                        AuthEffect::Notify(AuthNotification::declined(node)),
                    ],
                    Readiness::Failed {
                        reason: "wallet declined to sign".into(),
                    },
                );
            }
            let wallet = ctx.wallet.as_deref().unwrap_or_default();
            Transition::to(
                Verifying,
                ctx,
                vec![
                    AuthEffect::SendCredential(credential_frame(&result, wallet)),
                    AuthEffect::ArmTimeout {
                        attempt: ctx.attempt,
                    },
                ],
                Readiness::Pending,
            )
        }

        (
            ChallengeIssued,
            AuthInput::SigningFailed {
                attempt,
                title,
                message,
            },
        ) if attempt == ctx.attempt => Transition::to(
            Unauthenticated,
            ctx,
            vec![
                AuthEffect::DisarmTimeout,
                AuthEffect::Notify(AuthNotification::error(Some(node), title, message.clone())),
            ],
            Readiness::Failed { reason: message },
        ),

        (Verifying, AuthInput::Verdict { valid: true }) => Transition::to(
            Authenticated,
            ctx,
            vec![
                AuthEffect::DisarmTimeout,
                AuthEffect::Notify(AuthNotification::success(node)),
            ],
            Readiness::Ready {
                operator: node.to_string(),
            },
        ),

        (Verifying, AuthInput::Verdict { valid: false }) => Transition::to(
            Unauthenticated,
            ctx,
            vec![
                AuthEffect::DisarmTimeout,
                AuthEffect::Notify(AuthNotification::rejected(node)),
                AuthEffect::ClearCachedAuth,
            ],
            Readiness::Failed {
                reason: "signature rejected".into(),
            },
        ),

        (AwaitingChallenge, AuthInput::TimedOut { attempt }) if attempt == ctx.attempt => {
            Transition::to(
                Unauthenticated,
                ctx,
                vec![AuthEffect::Notify(AuthNotification::error(
                    Some(node),
                    "Authentication Timeout",
                    format!("Node {node} did not issue a challenge in time."),
                ))],
                Readiness::Failed {
                    reason: "no challenge from primary".into(),
                },
            )
        }

        (ChallengeIssued | Verifying, AuthInput::TimedOut { attempt }) if attempt == ctx.attempt => {
            Transition::to(
                Unauthenticated,
                ctx,
                vec![AuthEffect::Notify(AuthNotification::error(
                    Some(node),
                    "Authentication Timeout",
                    format!("Node {node} did not complete authentication in time."),
                ))],
                Readiness::Failed {
                    reason: "authentication timed out".into(),
                },
            )
        }

        (_, AuthInput::Reset) => Transition::to(
            Unauthenticated,
            ctx,
            vec![AuthEffect::DisarmTimeout],
            Readiness::Pending,
        ),

        (_, AuthInput::Engage) => {
            let attempt = ctx.attempt + 1;
            Transition {
                state: AwaitingChallenge,
                attempt,
                effects: vec![AuthEffect::ArmTimeout { attempt }],
                readiness: Some(Readiness::Pending),
            }
        }

        (state, _) => Transition::ignored(state, ctx),
    }
}
