//! # Error Types
//!
//! Errors reported by the external collaborators the SDK consumes.

use thiserror::Error;

/// Unknown network environment name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown network environment: {0}")]
pub struct ParseNetworkError(pub String);

/// Errors from the node directory service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DirectoryError {
    /// The directory has no node list for the requested environment.
    #[error("No nodes known for network {network}")]
    UnknownNetwork { network: String },

    /// The directory could not be refreshed.
    #[error("Directory unavailable: {0}")]
    Unavailable(String),
}

/// Errors from the wallet session provider.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WalletError {
    /// No wallet is paired.
    #[error("No wallet session")]
    NoSession,

    /// The user rejected the signing request.
    #[error("Signing rejected: {0}")]
    Rejected(String),

    /// The provider failed for any other reason.
    #[error("Wallet provider error: {0}")]
    Provider(String),
}
