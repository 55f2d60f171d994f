//! # REST Client Port
//!
//! HTTP access to the node fleet's REST surface. The SDK only holds the
//! handle and hands it out through `SmartNodeSdk::rest()`; hosts bring their
//! own HTTP stack.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

/// Errors from a REST client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RestError {
    /// The server answered with a non-success status.
    #[error("HTTP {status} on {path}")]
    Status { path: String, status: u16 },

    /// The request never reached the server.
    #[error("Transport error: {0}")]
    Transport(String),
}

/// Minimal REST surface.
#[async_trait]
pub trait RestClient: Send + Sync {
    async fn get(&self, path: &str) -> Result<Value, RestError>;

    async fn post(&self, path: &str, body: Value) -> Result<Value, RestError>;
}

/// One recorded call.
#[derive(Debug, Clone, PartialEq)]
pub enum RestCall {
    Get(String),
    Post(String, Value),
}

/// In-memory client answering from a table of canned responses.
///
/// Paths without a response answer `404`.
#[derive(Default)]
pub struct RecordingRestClient {
    responses: Mutex<HashMap<String, Value>>,
    calls: Mutex<Vec<RestCall>>,
}

impl RecordingRestClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `path` with `body` from now on.
    pub fn respond(&self, path: &str, body: Value) {
        self.responses.lock().insert(path.to_string(), body);
    }

    pub fn calls(&self) -> Vec<RestCall> {
        self.calls.lock().clone()
    }

    fn answer(&self, path: &str) -> Result<Value, RestError> {
        self.responses
            .lock()
            .get(path)
            .cloned()
            .ok_or_else(|| RestError::Status {
                path: path.to_string(),
                status: 404,
            })
    }
}

#[async_trait]
impl RestClient for RecordingRestClient {
    async fn get(&self, path: &str) -> Result<Value, RestError> {
        debug!(path, "GET");
        self.calls.lock().push(RestCall::Get(path.to_string()));
        self.answer(path)
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value, RestError> {
        debug!(path, "POST");
        self.calls
            .lock()
            .push(RestCall::Post(path.to_string(), body));
        self.answer(path)
    }
}
