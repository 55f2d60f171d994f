//! Socket service timeouts.

use std::time::Duration;

/// Timeouts of the socket service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketsConfig {
    /// How long a challenge or a verification may stay unanswered.
    pub auth_timeout: Duration,
    /// How long a caller waits for an authenticated primary.
    pub ready_timeout: Duration,
    /// How long a request waits for its one-shot response.
    pub request_timeout: Duration,
}

impl Default for SocketsConfig {
    fn default() -> Self {
        Self {
            auth_timeout: Duration::from_secs(30),
            ready_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl SocketsConfig {
    /// Short timeouts for tests.
    pub fn for_testing() -> Self {
        Self {
            auth_timeout: Duration::from_millis(200),
            ready_timeout: Duration::from_secs(2),
            request_timeout: Duration::from_secs(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SocketsConfig::default();
        assert_eq!(config.auth_timeout, Duration::from_secs(30));
        assert!(SocketsConfig::for_testing().auth_timeout < config.auth_timeout);
    }
}
