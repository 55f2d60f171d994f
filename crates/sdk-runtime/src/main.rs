//! # Smart Node Demo
//!
//! Runs the SDK against in-process loopback nodes and logs every event on
//! the outward stream.
//!
//! ## Usage
//!
//! ```text
//! smart-node-demo [config.toml]
//! ```
//!
//! Environment overrides: `SN_NETWORK`, `SN_AUTH_TIMEOUT_SECS`, `SN_LOG`.
//! Without configured nodes a three-node demo fleet is used.

use std::sync::Arc;

use anyhow::{Context, Result};
use node_sockets::adapters::{LoopbackTransport, MockWalletProvider};
use node_sockets::channels;
use sdk_runtime::{init_tracing, RecordingRestClient, SdkConfig, SmartNodeSdk};
use serde_json::json;
use shared_types::Node;
use tracing::{info, warn};

const DEMO_ACCOUNT: &str = "0.0.1001";

fn load_config() -> Result<SdkConfig> {
    let mut config = match std::env::args().nth(1) {
        Some(path) => SdkConfig::load(&path).with_context(|| format!("Loading {path}"))?,
        None => SdkConfig::default(),
    };
    config.apply_env().context("Applying environment overrides")?;

    if config.directory.nodes(config.network).is_empty() {
        let demo: Vec<Node> = (1..=3)
            .map(|i| Node::new(format!("0.0.{i}"), format!("ws://node-{i}.loopback")))
            .collect();
        match config.network {
            shared_types::NetworkEnv::Mainnet => config.directory.mainnet = demo,
            shared_types::NetworkEnv::Testnet => config.directory.testnet = demo,
            shared_types::NetworkEnv::Local => config.directory.local = demo,
        }
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = load_config()?;
    init_tracing(&config.logging);

    let transport = LoopbackTransport::new();
    for node in config.directory.nodes(config.network) {
        transport.serve_handshake(&node.operator, true);
        transport.script_response(&node.operator, channels::RESERVE_NFT, json!(1));
    }
    let directory = Arc::new(config.directory.static_directory());
    let wallet = Arc::new(MockWalletProvider::new().with_account(DEMO_ACCOUNT));

    let sdk = SmartNodeSdk::new(
        config,
        Arc::new(transport),
        directory,
        wallet,
        Arc::new(RecordingRestClient::new()),
    );

    let mut events = sdk.events();
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match serde_json::to_string(&event) {
                Ok(line) => info!(target: "smart_node_demo::events", "{line}"),
                Err(e) => warn!(error = %e, "Unserialisable event"),
            }
        }
    });

    sdk.start().await?;

    match sdk.reserve_nft("0.0.4242", DEMO_ACCOUNT).await {
        Ok(reservation) => info!(reservation, "Demo reservation made"),
        Err(e) => warn!(error = %e, "Demo reservation failed"),
    }
    info!(online = sdk.nodes_online().len(), "Press Ctrl+C to stop");

    tokio::signal::ctrl_c().await?;
    sdk.shutdown().await;

    Ok(())
}
