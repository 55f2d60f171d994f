//! # Adapters
//!
//! Ports the orchestration root exposes to the host application.

pub mod rest;

pub use rest::{RecordingRestClient, RestCall, RestClient, RestError};
