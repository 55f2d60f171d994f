//! # Core Domain Entities
//!
//! Defines the entities exchanged between the SDK crates and the external
//! collaborators (node directory, wallet session provider).
//!
//! ## Clusters
//!
//! - **Network**: `Node`, `NetworkEnv`
//! - **Wallet**: `WalletSession`
//! - **Handshake**: `SignedChallenge`, `AuthChallenge`, `AuthResult`

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::ParseNetworkError;

// =============================================================================
// CLUSTER A: THE NETWORK
// =============================================================================

/// One addressable service endpoint in the fleet.
///
/// Immutable once obtained from the directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Node {
    /// Unique operator identifier.
    pub operator: String,
    /// Network address (URL) of the node.
    pub address: String,
    /// Capability flags advertised by the node.
    #[serde(default)]
    pub capabilities: Vec<String>,
}

impl Node {
    /// Create a node without capability flags.
    pub fn new(operator: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            operator: operator.into(),
            address: address.into(),
            capabilities: Vec::new(),
        }
    }

    /// Add a capability flag.
    #[must_use]
    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.capabilities.push(capability.into());
        self
    }

    /// Check whether the node advertises a capability.
    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|c| c == capability)
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.operator, self.address)
    }
}

/// Network environment the directory is pointed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkEnv {
    Mainnet,
    #[default]
    Testnet,
    Local,
}

impl NetworkEnv {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mainnet => "mainnet",
            Self::Testnet => "testnet",
            Self::Local => "local",
        }
    }
}

impl fmt::Display for NetworkEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NetworkEnv {
    type Err = ParseNetworkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mainnet" => Ok(Self::Mainnet),
            "testnet" => Ok(Self::Testnet),
            "local" => Ok(Self::Local),
            other => Err(ParseNetworkError(other.to_string())),
        }
    }
}

// =============================================================================
// CLUSTER B: THE WALLET
// =============================================================================

/// A paired wallet session, owned by the wallet session provider.
///
/// The SDK never mutates it; it only reads the active account id.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletSession {
    /// Pairing topic of the session.
    #[serde(default)]
    pub topic: String,
    /// Accounts exposed by the wallet; the first one is active.
    #[serde(default)]
    pub account_ids: Vec<String>,
}

impl WalletSession {
    pub fn new(account_ids: Vec<String>) -> Self {
        Self {
            topic: String::new(),
            account_ids,
        }
    }

    /// The active account id (first account of the session).
    pub fn active_account(&self) -> Option<&str> {
        self.account_ids.first().map(String::as_str)
    }
}

// =============================================================================
// CLUSTER C: THE HANDSHAKE
// =============================================================================

/// Challenge signed by the node's server signing account.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedChallenge {
    /// Raw signature bytes.
    pub signature: Vec<u8>,
    /// Account the node used to sign the challenge.
    pub server_signing_account: String,
}

/// Challenge pushed by a node on the `authentication` event.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthChallenge {
    /// Server-side signature over the payload.
    pub signed_data: SignedChallenge,
    /// Opaque payload the wallet must sign.
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// Result of a wallet authentication, as produced by the wallet provider.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResult {
    /// Whether the wallet produced a signature.
    pub success: bool,
    /// Signed material forwarded to the node verbatim.
    #[serde(default)]
    pub data: serde_json::Value,
    /// Operator of the node whose challenge was signed, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<String>,
}

impl AuthResult {
    /// Successful result scoped to a node operator.
    pub fn signed(node: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            success: true,
            data,
            node: Some(node.into()),
        }
    }

    /// Result for a wallet that declined to sign.
    pub fn declined() -> Self {
        Self::default()
    }

    /// Whether this result may be replayed against `operator`.
    ///
    /// Unscoped results are never trusted across connections.
    pub fn is_scoped_to(&self, operator: &str) -> bool {
        self.success && self.node.as_deref() == Some(operator)
    }
}
