//! # Socket Errors
//!
//! Configuration errors reject the current initialisation attempt.
//! Transport errors are recovered by failover and only surface here when a
//! caller-visible operation cannot complete.

use shared_types::DirectoryError;
use thiserror::Error;

/// Errors from a single connection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    /// The connection went down before the awaited event arrived.
    #[error("Connection closed while waiting for '{event}'")]
    Closed { event: String },

    /// The operation needs a live link.
    #[error("Connection to {operator} is not open")]
    NotConnected { operator: String },
}

/// Errors from the connection registry and the socket service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SocketsError {
    /// The directory returned an empty node list.
    #[error("No nodes configured")]
    NoNodes,

    /// The directory's current node is not held by the registry.
    #[error("Primary node {operator} is not in the registry")]
    PrimaryNotFound { operator: String },

    /// No primary connection has been selected.
    #[error("No primary node selected")]
    NoPrimary,

    /// Failover could not find a different node.
    #[error("No failover candidate after losing {operator}")]
    NoFailoverCandidate { operator: String },

    /// The primary is not authenticated.
    #[error("Primary not authenticated: {reason}")]
    NotAuthenticated { reason: String },

    /// Waiting for an authenticated primary took too long.
    #[error("Timed out waiting for an authenticated primary")]
    ReadinessTimeout,

    /// No response arrived on a request channel in time.
    #[error("No response on '{topic}'")]
    RequestTimeout { topic: String },

    /// The node answered a request with a failure.
    #[error("Request on '{topic}' failed: {message}")]
    Request { topic: String, message: String },

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Directory(#[from] DirectoryError),
}

impl SocketsError {
    /// Whether this error means the directory and the registry disagree.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::NoNodes | Self::PrimaryNotFound { .. } | Self::NoPrimary | Self::Directory(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_taxonomy() {
        assert!(SocketsError::NoNodes.is_configuration());
        assert!(SocketsError::PrimaryNotFound {
            operator: "0.0.3".into()
        }
        .is_configuration());
        assert!(!SocketsError::ReadinessTimeout.is_configuration());
        assert!(!SocketsError::from(ConnectionError::Closed {
            event: "reserveNft".into()
        })
        .is_configuration());
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            SocketsError::PrimaryNotFound {
                operator: "0.0.3".into()
            }
            .to_string(),
            "Primary node 0.0.3 is not in the registry"
        );
        assert_eq!(
            SocketsError::from(ConnectionError::Closed {
                event: "mintLpNft".into()
            })
            .to_string(),
            "Connection closed while waiting for 'mintLpNft'"
        );
    }
}
