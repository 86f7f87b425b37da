use graphcore::{Node, NodeKind};
use std::collections::HashMap;
use std::sync::Arc;

/// Dispatch table from node kind to compute strategy
pub struct NodeRegistry {
    nodes: HashMap<NodeKind, Arc<dyn Node>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
        }
    }
    
    /// Register a compute strategy under its own kind
    pub fn register(&mut self, node: Arc<dyn Node>) {
        let kind = node.kind();
        tracing::debug!("Registering node type: {}", kind);
        self.nodes.insert(kind, node);
    }
    
    pub fn get(&self, kind: NodeKind) -> Option<Arc<dyn Node>> {
        self.nodes.get(&kind).cloned()
    }

    pub fn contains(&self, kind: NodeKind) -> bool {
        self.nodes.contains_key(&kind)
    }
    
    /// Registered kinds, sorted
    pub fn list_node_types(&self) -> Vec<NodeKind> {
        let mut kinds: Vec<_> = self.nodes.keys().copied().collect();
        kinds.sort();
        kinds
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
