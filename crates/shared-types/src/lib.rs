//! # Shared Types Crate
//!
//! This crate contains the domain entities shared by the SDK crates and the
//! error types of the external collaborators.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: All cross-crate types are defined here.
//! - **Wire Compatibility**: Handshake types serialise with the camelCase
//!   field names the nodes use on the wire.
//! - **Read-Only Sessions**: `WalletSession` is owned by the wallet provider;
//!   the SDK only reads the active account.

pub mod entities;
pub mod errors;

pub use entities::*;
pub use errors::*;
