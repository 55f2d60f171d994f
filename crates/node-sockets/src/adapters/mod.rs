//! # Adapters
//!
//! In-memory implementations of the outbound ports. Hosts embed them in
//! tests or replace them with real transports and wallet integrations.

pub mod directory;
pub mod loopback;
pub mod mocks;

pub use directory::StaticDirectory;
pub use loopback::{Frame, LoopbackConnection, LoopbackHandle, LoopbackTransport};
pub use mocks::{MockWalletProvider, SigningOutcome};
