use graphcore::{NodeId, NodeKind, Workflow};
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;

/// Structural problems found in a workflow graph
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphReport {
    /// Edge ids whose source or target does not exist
    pub dangling_edges: Vec<String>,
    /// `(node id, type tag)` pairs with no known node type
    pub unknown_types: Vec<(NodeId, String)>,
    /// A node on a cycle, if any
    pub cycle_at: Option<NodeId>,
    /// Nodes in dependency order when the graph is acyclic
    pub order: Vec<NodeId>,
}

impl GraphReport {
    pub fn is_ok(&self) -> bool {
        self.dangling_edges.is_empty() && self.unknown_types.is_empty() && self.cycle_at.is_none()
    }

    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        for edge in &self.dangling_edges {
            problems.push(format!("Edge {edge} references a missing node"));
        }
        for (node, tag) in &self.unknown_types {
            problems.push(format!("Node {node}: Node type {tag} not found"));
        }
        if let Some(node) = &self.cycle_at {
            problems.push(format!("Cyclic dependency detected at node {node}"));
        }
        problems
    }
}

/// Check a workflow without running it
pub fn validate_workflow(workflow: &Workflow) -> GraphReport {
    let mut report = GraphReport::default();
    let mut graph: DiGraph<NodeId, ()> = DiGraph::new();
    let mut index: HashMap<&str, NodeIndex> = HashMap::new();

    for node in &workflow.nodes {
        let idx = graph.add_node(node.id.clone());
        index.insert(node.id.as_str(), idx);

        let tag = node.node_type.as_deref().unwrap_or_default();
        if tag.parse::<NodeKind>().is_err() {
            report.unknown_types.push((node.id.clone(), tag.to_string()));
        }
    }

    for edge in &workflow.edges {
        match (index.get(edge.source.as_str()), index.get(edge.target.as_str())) {
            (Some(from), Some(to)) => {
                graph.add_edge(*from, *to, ());
            }
            _ => report.dangling_edges.push(edge.id.clone()),
        }
    }

    match toposort(&graph, None) {
        Ok(order) => {
            report.order = order.into_iter().map(|idx| graph[idx].clone()).collect();
        }
        Err(cycle) => {
            report.cycle_at = Some(graph[cycle.node_id()].clone());
        }
    }

    report
}
