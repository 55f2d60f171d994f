//! # SDK Events
//!
//! Defines all messages that flow through the event bus. On the wire every
//! message is tagged as `{ "event": "auth" | "events" | "errors", "content": {..} }`.

use serde::{Deserialize, Serialize};
use shared_types::AuthChallenge;

/// All messages that can be published to the event bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "content", rename_all = "lowercase")]
pub enum SdkEvent {
    /// Authentication-flow notification (loading, success, warning, error).
    Auth(AuthNotification),

    /// Raw domain event pushed by the primary node.
    Events(ServerEvent),

    /// Protocol error reported by a node, or a local failure notification.
    Errors(ErrorNotification),
}

impl SdkEvent {
    /// Get the topic for this event.
    #[must_use]
    pub fn topic(&self) -> EventTopic {
        match self {
            Self::Auth(_) => EventTopic::Auth,
            Self::Events(_) => EventTopic::Events,
            Self::Errors(_) => EventTopic::Errors,
        }
    }

    /// Operator of the node the event relates to, if any.
    #[must_use]
    pub fn node(&self) -> Option<&str> {
        match self {
            Self::Auth(n) => n.node.as_deref(),
            Self::Events(e) => Some(e.node.as_str()),
            Self::Errors(e) => e.node.as_deref(),
        }
    }
}

/// Event topics for filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventTopic {
    /// Authentication-flow notifications.
    Auth,
    /// Server-pushed domain events.
    Events,
    /// Error notifications.
    Errors,
}

/// Filter for subscribing to specific event topics.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Topics to subscribe to (empty = all topics).
    pub topics: Vec<EventTopic>,
}

impl EventFilter {
    /// Create a filter that matches all events.
    #[must_use]
    pub fn all() -> Self {
        Self { topics: Vec::new() }
    }

    /// Create a filter for specific topics.
    #[must_use]
    pub fn topics(topics: Vec<EventTopic>) -> Self {
        Self { topics }
    }

    /// Check if an event matches this filter.
    #[must_use]
    pub fn matches(&self, event: &SdkEvent) -> bool {
        self.topics.is_empty() || self.topics.contains(&event.topic())
    }
}

// =============================================================================
// AUTHENTICATION NOTIFICATIONS
// =============================================================================

/// Step of the handshake a notification belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMethod {
    /// A node issued a challenge.
    Authentication,
    /// A node returned its verdict.
    Authenticate,
    /// The handshake failed locally (signing, timeout).
    Error,
}

/// Presentation hint of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Loading,
    Success,
    Warning,
    Error,
}

/// Challenge material handed to the wallet for signing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeData {
    /// Challenge as issued by the node.
    pub auth_response: AuthChallenge,
    /// Active wallet account the challenge is scoped to.
    pub wallet: String,
    /// Handshake attempt the challenge belongs to. Credentials are
    /// accepted only for the attempt that is still running.
    #[serde(default)]
    pub attempt: u64,
}

/// Authentication-flow notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthNotification {
    /// Handshake step.
    pub method: AuthMethod,
    /// Presentation hint.
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    /// Short title for error notifications.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Human-readable message.
    pub message: String,
    /// Operator of the primary node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<String>,
    /// Challenge material (loading notifications only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<ChallengeData>,
}

impl AuthNotification {
    /// A node issued a challenge that the wallet must sign.
    pub fn loading(
        node: &str,
        challenge: AuthChallenge,
        wallet: impl Into<String>,
        attempt: u64,
    ) -> Self {
        Self {
            method: AuthMethod::Authentication,
            kind: NotificationKind::Loading,
            title: None,
            message: "Please authenticate your wallet in order to safely use the app...".into(),
            node: Some(node.to_string()),
            data: Some(ChallengeData {
                auth_response: challenge,
                wallet: wallet.into(),
                attempt,
            }),
        }
    }

    /// The node accepted the signature.
    pub fn success(node: &str) -> Self {
        Self {
            method: AuthMethod::Authenticate,
            kind: NotificationKind::Success,
            title: None,
            message: format!("You are safely connected to the node {node}"),
            node: Some(node.to_string()),
            data: None,
        }
    }

    /// The node rejected the signature.
    pub fn rejected(node: &str) -> Self {
        Self {
            method: AuthMethod::Authenticate,
            kind: NotificationKind::Warning,
            title: None,
            message: format!(
                "You are now connected to node {node}. Authentication is required \
                 every time the app connects to a different node of the network."
            ),
            node: Some(node.to_string()),
            data: None,
        }
    }

    /// The wallet declined to sign.
    pub fn declined(node: &str) -> Self {
        Self {
            method: AuthMethod::Error,
            kind: NotificationKind::Warning,
            title: Some("Authentication Failed".into()),
            message: "You need to authenticate your wallet in order to safely use the app.".into(),
            node: Some(node.to_string()),
            data: None,
        }
    }

    /// The handshake failed with an error.
    pub fn error(node: Option<&str>, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            method: AuthMethod::Error,
            kind: NotificationKind::Error,
            title: Some(title.into()),
            message: message.into(),
            node: node.map(str::to_string),
            data: None,
        }
    }
}

// =============================================================================
// SERVER EVENTS AND ERRORS
// =============================================================================

/// Domain event pushed by a node on its `events` channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerEvent {
    /// Operator of the node that pushed the event.
    pub node: String,
    /// Event payload, uninterpreted.
    pub payload: serde_json::Value,
}

/// Severity of an error notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Danger,
}

/// Structured error notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorNotification {
    pub title: String,
    pub message: String,
    pub mode: Severity,
    /// Operator of the node that reported the error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<String>,
    /// Payload reported by the node, passed through verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

impl ErrorNotification {
    /// Wrap an `errors` payload from a node without interpreting it.
    pub fn from_node(node: &str, payload: serde_json::Value) -> Self {
        let message = payload
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| payload.to_string());
        Self {
            title: "Node Error".into(),
            message,
            mode: Severity::Danger,
            node: Some(node.to_string()),
            payload: Some(payload),
        }
    }

    /// Local failure (failover, configuration).
    pub fn local(title: impl Into<String>, message: impl Into<String>, mode: Severity) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            mode,
            node: None,
            payload: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_topic() {
        let event = SdkEvent::Auth(AuthNotification::success("0.0.3"));
        assert_eq!(event.topic(), EventTopic::Auth);

        let event = SdkEvent::Events(ServerEvent {
            node: "0.0.3".into(),
            payload: json!({"type": "pool"}),
        });
        assert_eq!(event.topic(), EventTopic::Events);
        assert_eq!(event.node(), Some("0.0.3"));
    }

    #[test]
    fn test_filter_all() {
        let filter = EventFilter::all();
        let event = SdkEvent::Errors(ErrorNotification::local("t", "m", Severity::Warning));
        assert!(filter.matches(&event));
    }

    #[test]
    fn test_filter_topics() {
        let filter = EventFilter::topics(vec![EventTopic::Auth]);
        assert!(filter.matches(&SdkEvent::Auth(AuthNotification::success("a"))));
        assert!(!filter.matches(&SdkEvent::Events(ServerEvent {
            node: "a".into(),
            payload: json!(null),
        })));
    }

    #[test]
    fn test_wire_shape() {
        let event = SdkEvent::Auth(AuthNotification::success("0.0.7"));
        let value = serde_json::to_value(&event).expect("serialize");
        assert_eq!(value["event"], "auth");
        assert_eq!(value["content"]["method"], "authenticate");
        assert_eq!(value["content"]["type"], "success");
        assert_eq!(value["content"]["node"], "0.0.7");
        assert!(value["content"].get("data").is_none());
    }

    #[test]
    fn test_loading_carries_challenge_and_wallet() {
        let challenge = AuthChallenge {
            payload: json!({"nonce": 42}),
            ..Default::default()
        };
        let notification = AuthNotification::loading("0.0.7", challenge, "0.0.1001", 4);
        let value = serde_json::to_value(SdkEvent::Auth(notification)).expect("serialize");
        assert_eq!(value["content"]["type"], "loading");
        assert_eq!(value["content"]["data"]["wallet"], "0.0.1001");
        assert_eq!(value["content"]["data"]["attempt"], 4);
        assert_eq!(value["content"]["data"]["authResponse"]["payload"]["nonce"], 42);
    }

    #[test]
    fn test_node_error_is_verbatim() {
        let payload = json!({"message": "pool closed", "code": 17});
        let notification = ErrorNotification::from_node("0.0.4", payload.clone());
        assert_eq!(notification.message, "pool closed");
        assert_eq!(notification.payload, Some(payload));

        let opaque = ErrorNotification::from_node("0.0.4", json!("boom"));
        assert_eq!(opaque.message, "\"boom\"");
    }
}
