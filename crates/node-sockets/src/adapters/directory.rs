//! # Static Node Directory
//!
//! Fixed per-environment node lists. `shuffle_node` picks a random
//! different node of the current environment.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::Rng;
use shared_types::{DirectoryError, NetworkEnv, Node};
use tracing::debug;

use crate::ports::NodeDirectory;

#[derive(Default)]
struct DirectoryState {
    networks: HashMap<NetworkEnv, Vec<Node>>,
    env: NetworkEnv,
    current: usize,
}

impl DirectoryState {
    fn nodes(&self) -> &[Node] {
        self.networks.get(&self.env).map(Vec::as_slice).unwrap_or_default()
    }
}

/// Directory backed by configured node lists.
#[derive(Default)]
pub struct StaticDirectory {
    state: Mutex<DirectoryState>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the node list of `env`.
    #[must_use]
    pub fn with_network(self, env: NetworkEnv, nodes: Vec<Node>) -> Self {
        self.state.lock().networks.insert(env, nodes);
        self
    }

    /// Make the node with `operator` current. Returns false if unknown.
    pub fn set_current(&self, operator: &str) -> bool {
        let mut state = self.state.lock();
        let position = state.nodes().iter().position(|n| n.operator == operator);
        match position {
            Some(index) => {
                state.current = index;
                true
            }
            None => false,
        }
    }

    pub fn env(&self) -> NetworkEnv {
        self.state.lock().env
    }
}

#[async_trait]
impl NodeDirectory for StaticDirectory {
    fn current_node(&self) -> Option<Node> {
        let state = self.state.lock();
        state.nodes().get(state.current).cloned()
    }

    async fn set_network(&self, env: NetworkEnv) -> Result<(), DirectoryError> {
        let mut state = self.state.lock();
        if !state.networks.contains_key(&env) {
            return Err(DirectoryError::UnknownNetwork {
                network: env.to_string(),
            });
        }
        state.env = env;
        state.current = 0;
        debug!(network = %env, nodes = state.nodes().len(), "Directory network set");
        Ok(())
    }

    async fn network(&self) -> Result<Vec<Node>, DirectoryError> {
        let state = self.state.lock();
        state
            .networks
            .get(&state.env)
            .cloned()
            .ok_or_else(|| DirectoryError::UnknownNetwork {
                network: state.env.to_string(),
            })
    }

    fn shuffle_node(&self) {
        let mut state = self.state.lock();
        let len = state.nodes().len();
        if len < 2 {
            return;
        }
        let mut next = rand::thread_rng().gen_range(0..len - 1);
        if next >= state.current {
            next += 1;
        }
        state.current = next;
        debug!(operator = %state.nodes()[next].operator, "Directory shuffled");
    }

    fn select_node(&self, operator: &str) -> bool {
        self.set_current(operator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn directory() -> StaticDirectory {
        StaticDirectory::new().with_network(
            NetworkEnv::Testnet,
            vec![
                Node::new("a", "ws://a"),
                Node::new("b", "ws://b"),
                Node::new("c", "ws://c"),
            ],
        )
    }

    #[tokio::test]
    async fn test_set_network_selects_first_node() {
        let dir = directory();
        dir.set_network(NetworkEnv::Testnet).await.expect("known");
        assert_eq!(dir.current_node().map(|n| n.operator), Some("a".into()));
        assert_eq!(dir.network().await.expect("list").len(), 3);
    }

    #[tokio::test]
    async fn test_unknown_network() {
        let dir = directory();
        assert_eq!(
            dir.set_network(NetworkEnv::Mainnet).await,
            Err(DirectoryError::UnknownNetwork {
                network: "mainnet".into()
            })
        );
        assert_eq!(dir.env(), NetworkEnv::Testnet);
    }

    #[test]
    fn test_shuffle_always_changes_node() {
        let dir = directory();
        for _ in 0..50 {
            let before = dir.current_node();
            dir.shuffle_node();
            assert_ne!(dir.current_node(), before);
        }
    }

    #[test]
    fn test_shuffle_single_node_is_noop() {
        let dir = StaticDirectory::new()
            .with_network(NetworkEnv::Testnet, vec![Node::new("solo", "ws://solo")]);
        dir.shuffle_node();
        assert_eq!(dir.current_node().map(|n| n.operator), Some("solo".into()));
    }

    #[test]
    fn test_set_current() {
        let dir = directory();
        assert!(dir.set_current("c"));
        assert!(!dir.set_current("z"));
        assert_eq!(dir.current_node().map(|n| n.operator), Some("c".into()));
    }

    #[test]
    fn test_select_node_through_directory_port() {
        let dir: Arc<dyn NodeDirectory> = Arc::new(directory());
        assert!(dir.select_node("b"));
        assert!(!dir.select_node("z"));
        assert_eq!(dir.current_node().map(|n| n.operator), Some("b".into()));
    }
}
