//! # Event Wiring
//!
//! Connects the internal bus of the node sockets to the auth handler and
//! to the outward stream the application consumes.
//!
//! ```text
//! ┌──────────────┐ publish ┌──────────────┐  loading   ┌──────────────┐
//! │ NodeSockets  │ ──────→ │ internal bus │ ─────────→ │ AuthEvent    │
//! └──────────────┘         └──────┬───────┘            │   Handler    │
//!                                 │ everything else    └──────┬───────┘
//!                                 ▼                           │ loading (no cache)
//!                          ┌──────────────┐ ←─────────────────┘
//!                          │ outward bus  │ ──→ application
//!                          └──────────────┘
//! ```

pub mod event_relay;

pub use event_relay::EventRelay;
