//! Service Layer - drives the domain through the ports.
//!
//! - `ConnectionRegistry`: connections, online status, primary marker
//! - `AuthOrchestrator`: executes the handshake state machine
//! - `NodeSockets`: single driver task, failover, request/response

pub mod orchestrator;
pub mod registry;
pub mod signals;
pub mod sockets;

pub use orchestrator::AuthOrchestrator;
pub use registry::{ConnectionRegistry, LifecycleOutcome};
pub use signals::{ServerMessage, SocketSignal};
pub use sockets::NodeSockets;
