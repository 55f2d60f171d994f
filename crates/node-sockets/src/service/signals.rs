//! Inputs of the socket driver task.

use serde_json::Value;

use crate::domain::{channels, ConnectionId, LifecycleEvent};

/// Something happened on one of the held connections.
#[derive(Debug, Clone, PartialEq)]
pub enum SocketSignal {
    /// A lifecycle announcement, forwarded by the registry's watcher.
    Lifecycle {
        id: ConnectionId,
        event: LifecycleEvent,
    },
    /// A payload pushed by the primary on one of its pumped channels.
    Server {
        id: ConnectionId,
        message: ServerMessage,
    },
}

/// Payload on one of the primary's pumped channels.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    Authentication(Value),
    Authenticate(Value),
    Events(Value),
    Errors(Value),
}

impl ServerMessage {
    /// Channels pumped from the primary.
    pub const CHANNELS: [&'static str; 4] = [
        channels::AUTHENTICATION,
        channels::AUTHENTICATE,
        channels::EVENTS,
        channels::ERRORS,
    ];

    /// Wrap a payload received on `channel`.
    pub fn from_channel(channel: &str, payload: Value) -> Option<Self> {
        match channel {
            channels::AUTHENTICATION => Some(Self::Authentication(payload)),
            channels::AUTHENTICATE => Some(Self::Authenticate(payload)),
            channels::EVENTS => Some(Self::Events(payload)),
            channels::ERRORS => Some(Self::Errors(payload)),
            _ => None,
        }
    }

    pub fn channel(&self) -> &'static str {
        match self {
            Self::Authentication(_) => channels::AUTHENTICATION,
            Self::Authenticate(_) => channels::AUTHENTICATE,
            Self::Events(_) => channels::EVENTS,
            Self::Errors(_) => channels::ERRORS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_channel_mapping() {
        for channel in ServerMessage::CHANNELS {
            let message = ServerMessage::from_channel(channel, json!(null)).expect("pumped");
            assert_eq!(message.channel(), channel);
        }
        assert!(ServerMessage::from_channel(channels::RESERVE_NFT, json!(1)).is_none());
    }
}
