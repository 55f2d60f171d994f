//! # SDK Errors

use node_sockets::SocketsError;
use shared_types::{DirectoryError, WalletError};
use thiserror::Error;

use crate::adapters::RestError;
use crate::container::ConfigError;

/// Errors surfaced by `SmartNodeSdk`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SdkError {
    #[error(transparent)]
    Sockets(#[from] SocketsError),

    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error(transparent)]
    Wallet(#[from] WalletError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Rest(#[from] RestError),
}

impl SdkError {
    /// Whether the error stems from configuration rather than runtime
    /// conditions. Startup is rejected on these.
    pub fn is_configuration(&self) -> bool {
        match self {
            Self::Sockets(e) => e.is_configuration(),
            Self::Directory(_) | Self::Config(_) => true,
            Self::Wallet(_) | Self::Rest(_) => false,
        }
    }
}
