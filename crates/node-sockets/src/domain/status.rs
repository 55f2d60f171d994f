//! # Online Status Map
//!
//! One entry per held connection, keyed by node operator. Entries change
//! only in response to that connection's own lifecycle signals.

use std::collections::HashMap;

use shared_types::Node;

/// Online flag of one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeStatus {
    pub node: Node,
    pub online: bool,
}

/// Operator id → status.
#[derive(Debug, Clone, Default)]
pub struct OnlineStatusMap {
    entries: HashMap<String, NodeStatus>,
}

impl OnlineStatusMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an offline entry for `node`, replacing any previous one.
    pub fn seed(&mut self, node: Node) {
        self.entries.insert(
            node.operator.clone(),
            NodeStatus {
                node,
                online: false,
            },
        );
    }

    /// Flip the online flag. Returns false for unknown operators.
    pub fn set_online(&mut self, operator: &str, online: bool) -> bool {
        match self.entries.get_mut(operator) {
            Some(status) => {
                status.online = online;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, operator: &str) -> Option<&NodeStatus> {
        self.entries.get(operator)
    }

    pub fn is_online(&self, operator: &str) -> bool {
        self.entries.get(operator).is_some_and(|s| s.online)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn online_count(&self) -> usize {
        self.entries.values().filter(|s| s.online).count()
    }

    /// Copy of all entries.
    pub fn snapshot(&self) -> HashMap<String, NodeStatus> {
        self.entries.clone()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
