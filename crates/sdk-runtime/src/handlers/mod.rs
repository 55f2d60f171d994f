//! # Event Handlers
//!
//! Reactions of the orchestration root to internal bus traffic.

pub mod auth;

pub use auth::AuthEventHandler;
