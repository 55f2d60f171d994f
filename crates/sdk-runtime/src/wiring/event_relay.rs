//! # Event Relay
//!
//! Dispatches internal bus traffic: challenge notifications go to the
//! `AuthEventHandler`, every other event is re-published outward in the
//! order it was received.

use std::sync::Arc;

use shared_bus::{
    AuthMethod, AuthNotification, EventFilter, EventPublisher, InMemoryEventBus, NotificationKind,
    SdkEvent, Subscription,
};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::handlers::AuthEventHandler;

/// Internal-to-outward dispatcher.
pub struct EventRelay {
    subscription: Subscription,
    outward: Arc<dyn EventPublisher>,
    handler: AuthEventHandler,
}

impl EventRelay {
    /// Subscribe to `internal` now, so nothing published after this call is
    /// missed.
    pub fn new(
        internal: &InMemoryEventBus,
        outward: Arc<dyn EventPublisher>,
        handler: AuthEventHandler,
    ) -> Self {
        Self {
            subscription: internal.subscribe(EventFilter::all()),
            outward,
            handler,
        }
    }

    /// Run the relay on its own task.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Relay until the internal bus closes.
    pub async fn run(mut self) {
        info!("Event relay started");
        while let Some(event) = self.subscription.recv().await {
            match event {
                SdkEvent::Auth(notification) if is_challenge(&notification) => {
                    // Signing may wait on the user; keep relaying meanwhile.
                    let handler = self.handler.clone();
                    tokio::spawn(async move { handler.handle_challenge(notification).await });
                }
                other => {
                    debug!(topic = ?other.topic(), "Relaying event");
                    self.outward.publish(other).await;
                }
            }
        }
        info!("Event relay stopped");
    }
}

fn is_challenge(notification: &AuthNotification) -> bool {
    notification.method == AuthMethod::Authentication
        && notification.kind == NotificationKind::Loading
        && notification.data.is_some()
}
