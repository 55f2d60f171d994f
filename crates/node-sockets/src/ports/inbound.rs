//! # Driving Ports (Inbound API)
//!
//! Operations the socket service offers to the orchestration root and to
//! application code.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::{json, Value};
use shared_types::Node;

use crate::domain::{channels, NodeStatus, SocketsError};

/// Primary-node operations.
///
/// Every method that talks to the primary waits until the primary is
/// authenticated, or fails.
#[async_trait]
pub trait NodeSocketsApi: Send + Sync {
    /// Emit `payload` on `topic` of the authenticated primary.
    async fn send_message(&self, topic: &str, payload: Value) -> Result<(), SocketsError>;

    /// Emit on `topic` and wait for the one-shot response on the same topic.
    async fn request(&self, topic: &str, payload: Value) -> Result<Value, SocketsError>;

    /// Online status of every held connection.
    fn nodes_online(&self) -> HashMap<String, NodeStatus>;

    /// The node of the primary connection, if one is selected.
    fn primary_node(&self) -> Option<Node>;

    /// Reserve a token for a wallet. Resolves with the reservation number.
    async fn reserve_nft(&self, token_id: &str, wallet_id: &str) -> Result<u64, SocketsError> {
        let response = self
            .request(
                channels::RESERVE_NFT,
                json!({ "tokenId": token_id, "walletId": wallet_id }),
            )
            .await?;
        response.as_u64().ok_or_else(|| SocketsError::Request {
            topic: channels::RESERVE_NFT.into(),
            message: format!("unexpected response {response}"),
        })
    }

    /// Submit a pool join. Resolves with the node's payload on success.
    async fn mint_lp_nft(&self, join_pool: Value) -> Result<Value, SocketsError> {
        let mut response = self
            .request(channels::MINT_LP_NFT, json!({ "joinPool": join_pool }))
            .await?;
        if response.get("status").and_then(Value::as_str) == Some("success") {
            return Ok(response
                .get_mut("payload")
                .map(Value::take)
                .unwrap_or(Value::Null));
        }
        let message = response
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("request failed")
            .to_string();
        Err(SocketsError::Request {
            topic: channels::MINT_LP_NFT.into(),
            message,
        })
    }
}
