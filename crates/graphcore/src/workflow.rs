use crate::{NodeKind, WorkflowError};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{HashSet, VecDeque};
use uuid::Uuid;

pub type WorkflowId = String;
pub type NodeId = String;

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// First id that appears on more than one node
pub fn duplicate_node_id(nodes: &[NodeSpec]) -> Option<&str> {
    let mut seen = HashSet::new();
    nodes
        .iter()
        .map(|n| n.id.as_str())
        .find(|id| !seen.insert(*id))
}

/// Per-node payload: the base fields every node type shares, plus the
/// type-specific configuration kept as a flat JSON object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeData {
    #[serde(default)]
    pub loading: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub dirty: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl NodeData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.fields.get(key).and_then(Value::as_bool)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(key.into(), value.into());
    }

    /// `output` is defined and not stale
    pub fn is_fresh(&self) -> bool {
        self.output.is_some() && !self.dirty
    }

    /// Shallow merge: keys in `patch` override, everything else is kept.
    /// A `null` value clears the key.
    pub fn merge(&mut self, patch: Map<String, Value>) -> Result<(), serde_json::Error> {
        let mut map = match serde_json::to_value(&*self)? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        for (key, value) in patch {
            if value.is_null() {
                map.remove(&key);
            } else {
                map.insert(key, value);
            }
        }
        *self = serde_json::from_value(Value::Object(map))?;
        Ok(())
    }

    /// Parse the whole payload as a typed configuration.
    pub fn parse_config<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::to_value(self).and_then(serde_json::from_value)
    }

    /// Successful result: `output` set, `error` cleared.
    pub fn succeed(mut self, output: impl Into<String>) -> Self {
        self.loading = false;
        self.error = None;
        self.output = Some(output.into());
        self
    }

    /// Business error that keeps any previous output.
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.loading = false;
        self.error = Some(error.into());
        self
    }

    /// Business error that also drops the previous output.
    pub fn failure(self, error: impl Into<String>) -> Self {
        let mut data = self.with_error(error);
        data.output = None;
        data
    }
}

/// Node in a workflow graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub id: NodeId,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub node_type: Option<String>,
    #[serde(default)]
    pub data: NodeData,
    pub position: Position,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
}

impl NodeSpec {
    pub fn new(kind: NodeKind) -> Self {
        Self {
            id: new_id(),
            node_type: Some(kind.as_str().to_string()),
            data: NodeData::default(),
            position: Position::default(),
            width: None,
            height: None,
        }
    }
    
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.set(key, value);
        self
    }
    
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.data.label = Some(label.into());
        self
    }

    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.data.output = Some(output.into());
        self
    }

    pub fn dirty(mut self) -> Self {
        self.data.dirty = true;
        self
    }
    
    pub fn with_position(mut self, x: f64, y: f64) -> Self {
        self.position = Position { x, y };
        self
    }

    pub fn with_size(mut self, width: f64, height: f64) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    /// Resolve the type tag against the closed registry
    pub fn kind(&self) -> Result<NodeKind, WorkflowError> {
        match self.node_type.as_deref() {
            Some(tag) => tag.parse(),
            None => Err(WorkflowError::UnknownNodeType(String::new())),
        }
    }
}

/// Directed dependency between two nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub id: String,
    pub source: NodeId,
    pub target: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub edge_type: Option<String>,
    #[serde(default)]
    pub animated: bool,
}

impl Edge {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            source: source.into(),
            target: target.into(),
            source_handle: None,
            edge_type: None,
            animated: false,
        }
    }

    /// Branch discriminator for edges leaving a condition node
    pub fn with_handle(mut self, handle: impl Into<String>) -> Self {
        self.source_handle = Some(handle.into());
        self
    }
}

/// Partial edge update
#[derive(Debug, Clone, Default)]
pub struct EdgePatch {
    pub animated: Option<bool>,
    pub source_handle: Option<Option<String>>,
    pub edge_type: Option<Option<String>>,
}

/// Node position on the canvas
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved: Option<bool>,
}

/// Complete workflow: nodes, edges and bookkeeping
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    pub id: WorkflowId,
    pub name: String,
    pub nodes: Vec<NodeSpec>,
    pub edges: Vec<Edge>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: WorkflowMetadata,
}

impl Workflow {
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: new_id(),
            name: name.into(),
            nodes: Vec::new(),
            edges: Vec::new(),
            created_at: now,
            updated_at: now,
            metadata: WorkflowMetadata::default(),
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
    
    pub fn find_node(&self, id: &str) -> Option<&NodeSpec> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn find_node_mut(&mut self, id: &str) -> Option<&mut NodeSpec> {
        self.nodes.iter_mut().find(|n| n.id == id)
    }

    pub fn find_edge(&self, id: &str) -> Option<&Edge> {
        self.edges.iter().find(|e| e.id == id)
    }

    pub fn incoming<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.iter().filter(move |e| e.target == id)
    }

    pub fn outgoing<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.iter().filter(move |e| e.source == id)
    }

    /// Distinct direct children, in edge order
    pub fn children(&self, id: &str) -> Vec<NodeId> {
        let mut seen = HashSet::new();
        self.outgoing(id)
            .filter(|e| self.find_node(&e.target).is_some())
            .filter(|e| seen.insert(e.target.clone()))
            .map(|e| e.target.clone())
            .collect()
    }

    /// Every node reachable through outgoing edges, excluding `id` unless a
    /// cycle leads back to it.
    pub fn descendants(&self, id: &str) -> Vec<NodeId> {
        let mut visited = HashSet::new();
        let mut order = Vec::new();
        let mut queue: VecDeque<NodeId> = self.children(id).into();
        while let Some(next) = queue.pop_front() {
            if !visited.insert(next.clone()) {
                continue;
            }
            queue.extend(self.children(&next));
            order.push(next);
        }
        order
    }
    
    /// Append a node; its id must not be taken yet
    pub fn add_node(&mut self, mut node: NodeSpec) -> Result<NodeId, WorkflowError> {
        if node.id.is_empty() {
            node.id = new_id();
        }
        if self.find_node(&node.id).is_some() {
            return Err(WorkflowError::DuplicateNode(node.id));
        }
        let id = node.id.clone();
        self.nodes.push(node);
        self.touch();
        Ok(id)
    }

    /// Remove a node and every edge touching it
    pub fn remove_node(&mut self, id: &str) -> Result<NodeSpec, WorkflowError> {
        let index = self
            .nodes
            .iter()
            .position(|n| n.id == id)
            .ok_or_else(|| WorkflowError::NodeNotFound(id.to_string()))?;
        let node = self.nodes.remove(index);
        self.edges.retain(|e| e.source != id && e.target != id);
        self.touch();
        Ok(node)
    }
    
    pub fn add_edge(&mut self, mut edge: Edge) -> String {
        if edge.id.is_empty() {
            edge.id = new_id();
        }
        let id = edge.id.clone();
        self.edges.push(edge);
        self.touch();
        id
    }

    pub fn connect(&mut self, source: &str, target: &str) -> String {
        self.add_edge(Edge::new(source, target))
    }

    pub fn remove_edge(&mut self, id: &str) -> Result<Edge, WorkflowError> {
        let index = self
            .edges
            .iter()
            .position(|e| e.id == id)
            .ok_or_else(|| WorkflowError::EdgeNotFound(id.to_string()))?;
        let edge = self.edges.remove(index);
        self.touch();
        Ok(edge)
    }

    pub fn update_edge(&mut self, id: &str, patch: EdgePatch) -> Result<(), WorkflowError> {
        let edge = self
            .edges
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| WorkflowError::EdgeNotFound(id.to_string()))?;
        if let Some(animated) = patch.animated {
            edge.animated = animated;
        }
        if let Some(handle) = patch.source_handle {
            edge.source_handle = handle;
        }
        if let Some(edge_type) = patch.edge_type {
            edge.edge_type = edge_type;
        }
        self.touch();
        Ok(())
    }

    pub fn set_edges_animated(&mut self, ids: &[String], animated: bool) {
        for edge in self.edges.iter_mut().filter(|e| ids.contains(&e.id)) {
            edge.animated = animated;
        }
        self.touch();
    }

    /// Shallow-merge `patch` into a node's data
    pub fn update_node_data(
        &mut self,
        id: &str,
        patch: Map<String, Value>,
    ) -> Result<(), WorkflowError> {
        let node = self
            .find_node_mut(id)
            .ok_or_else(|| WorkflowError::NodeNotFound(id.to_string()))?;
        node.data
            .merge(patch)
            .map_err(|e| WorkflowError::Invalid(format!("node {id}: {e}")))?;
        self.touch();
        Ok(())
    }

    pub fn replace_node_data(&mut self, id: &str, data: NodeData) -> Result<(), WorkflowError> {
        let node = self
            .find_node_mut(id)
            .ok_or_else(|| WorkflowError::NodeNotFound(id.to_string()))?;
        node.data = data;
        self.touch();
        Ok(())
    }

    pub fn move_node(&mut self, id: &str, position: Position) -> Result<(), WorkflowError> {
        let node = self
            .find_node_mut(id)
            .ok_or_else(|| WorkflowError::NodeNotFound(id.to_string()))?;
        node.position = position;
        self.touch();
        Ok(())
    }

    /// Reset transient run state: nothing loading, nothing animated.
    pub fn clear_transient(&mut self) {
        for node in &mut self.nodes {
            node.data.loading = false;
        }
        for edge in &mut self.edges {
            edge.animated = false;
        }
    }

    /// Copy with transient run state reset
    pub fn cleaned(&self) -> Workflow {
        let mut workflow = self.clone();
        workflow.clear_transient();
        workflow
    }
}
