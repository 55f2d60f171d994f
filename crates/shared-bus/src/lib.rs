//! # Shared Bus - Event Bus for the SDK
//!
//! The single outward-facing stream that aggregates server-pushed events,
//! authentication-flow notifications and error conditions into one ordered
//! sequence.
//!
//! ## Flow
//!
//! ```text
//! ┌──────────────┐                    ┌──────────────┐
//! │ Node sockets │                    │ Orchestration│
//! │              │    publish()       │     root     │
//! │              │ ──────┐            │              │
//! └──────────────┘       │            └──────────────┘
//!                        ▼                    ↑
//!                  ┌──────────────┐          │
//!                  │  Event Bus   │          │
//!                  │              │ ─────────┘
//!                  └──────────────┘  subscribe()
//! ```
//!
//! ## Guarantees
//!
//! - Every current subscriber receives events in publication order.
//! - No buffering or replay for subscribers that join late.
//! - Messages are tagged `auth` / `events` / `errors` on the wire.

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod events;
pub mod publisher;
pub mod subscriber;

// Re-export main types
pub use events::{
    AuthMethod, AuthNotification, ChallengeData, ErrorNotification, EventFilter, EventTopic,
    NotificationKind, SdkEvent, ServerEvent, Severity,
};
pub use publisher::{EventPublisher, InMemoryEventBus};
pub use subscriber::{EventStream, Subscription, SubscriptionError};

/// Maximum events to buffer per subscriber before lagging.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;
