use graphcore::{
    duplicate_node_id, Edge, EdgePatch, FlowError, ImportError, NodeKind, NodeSpec, Position, Workflow,
    WorkflowDocument, WorkflowError, WorkflowId, WorkflowMetadata,
};
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Store handle shared by the runtime and the orchestrator
pub type SharedStore = Arc<RwLock<GraphStore>>;

/// Owner of every workflow and of the "current" selection.
///
/// All node and edge operations without an explicit workflow id act on the
/// current workflow. Every mutation stamps the workflow's `updated_at`.
#[derive(Debug, Default)]
pub struct GraphStore {
    workflows: Vec<Workflow>,
    current: Option<WorkflowId>,
}

impl GraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with workflows; the first one becomes current
    pub fn with_workflows(workflows: Vec<Workflow>) -> Self {
        let current = workflows.first().map(|w| w.id.clone());
        Self { workflows, current }
    }

    pub fn shared(self) -> SharedStore {
        Arc::new(RwLock::new(self))
    }

    pub fn workflows(&self) -> &[Workflow] {
        &self.workflows
    }

    pub fn workflow(&self, id: &str) -> Option<&Workflow> {
        self.workflows.iter().find(|w| w.id == id)
    }

    pub fn workflow_mut(&mut self, id: &str) -> Option<&mut Workflow> {
        self.workflows.iter_mut().find(|w| w.id == id)
    }

    pub fn current_id(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn current(&self) -> Option<&Workflow> {
        self.current.as_deref().and_then(|id| self.workflow(id))
    }

    fn current_mut(&mut self) -> Result<&mut Workflow, WorkflowError> {
        let id = self.current.clone().ok_or(WorkflowError::NoCurrentWorkflow)?;
        self.workflow_mut(&id)
            .ok_or(WorkflowError::NotFound(id))
    }

    /// Create a workflow seeded with a starter graph and make it current
    pub fn create_workflow(&mut self, name: Option<&str>) -> WorkflowId {
        let name = name
            .map(str::to_string)
            .unwrap_or_else(|| format!("Workflow {}", self.workflows.len() + 1));
        let workflow = starter_workflow(name);
        let id = workflow.id.clone();
        self.workflows.push(workflow);
        self.current = Some(id.clone());
        id
    }

    pub fn delete_workflow(&mut self, id: &str) -> Result<Workflow, WorkflowError> {
        let index = self
            .workflows
            .iter()
            .position(|w| w.id == id)
            .ok_or_else(|| WorkflowError::NotFound(id.to_string()))?;
        let removed = self.workflows.remove(index);
        if self.current.as_deref() == Some(id) {
            self.current = self.workflows.first().map(|w| w.id.clone());
        }
        Ok(removed)
    }

    /// Make `id` current and reset its transient run state.
    ///
    /// Callers are responsible for cancelling in-flight work first.
    pub fn select(&mut self, id: &str) -> Result<(), WorkflowError> {
        let workflow = self
            .workflow_mut(id)
            .ok_or_else(|| WorkflowError::NotFound(id.to_string()))?;
        workflow.clear_transient();
        self.current = Some(id.to_string());
        Ok(())
    }

    pub fn rename_workflow(&mut self, id: &str, name: impl Into<String>) -> Result<(), WorkflowError> {
        let workflow = self
            .workflow_mut(id)
            .ok_or_else(|| WorkflowError::NotFound(id.to_string()))?;
        workflow.name = name.into();
        workflow.touch();
        Ok(())
    }

    /// Replace a workflow's whole node and edge collections at once
    pub fn set_workflow_content(
        &mut self,
        id: &str,
        nodes: Vec<NodeSpec>,
        edges: Vec<Edge>,
    ) -> Result<(), WorkflowError> {
        let workflow = self
            .workflow_mut(id)
            .ok_or_else(|| WorkflowError::NotFound(id.to_string()))?;
        if let Some(duplicate) = duplicate_node_id(&nodes) {
            return Err(WorkflowError::DuplicateNode(duplicate.to_string()));
        }
        workflow.nodes = nodes;
        workflow.edges = edges;
        workflow.touch();
        Ok(())
    }

    pub fn set_workflow_metadata(
        &mut self,
        id: &str,
        metadata: WorkflowMetadata,
    ) -> Result<(), WorkflowError> {
        let workflow = self
            .workflow_mut(id)
            .ok_or_else(|| WorkflowError::NotFound(id.to_string()))?;
        if metadata.source.is_some() {
            workflow.metadata.source = metadata.source;
        }
        if metadata.approved.is_some() {
            workflow.metadata.approved = metadata.approved;
        }
        workflow.touch();
        Ok(())
    }

    /// Validate and add a persisted document as a new current workflow.
    /// Nothing changes when validation fails.
    pub fn import_json(&mut self, json: &str) -> Result<WorkflowId, ImportError> {
        let workflow = WorkflowDocument::parse(json)?.into_workflow();
        let id = workflow.id.clone();
        tracing::info!("Imported workflow: {} ({})", workflow.name, id);
        self.workflows.push(workflow);
        self.current = Some(id.clone());
        Ok(id)
    }

    pub fn export_json(&self, id: &str) -> Result<String, FlowError> {
        let workflow = self
            .workflow(id)
            .ok_or_else(|| WorkflowError::NotFound(id.to_string()))?;
        Ok(WorkflowDocument::from_workflow(workflow).to_json()?)
    }

    /// Reset loading/animated flags everywhere
    pub fn clear_transient(&mut self) {
        for workflow in &mut self.workflows {
            workflow.clear_transient();
        }
    }

    pub fn nodes(&self) -> &[NodeSpec] {
        self.current().map(|w| w.nodes.as_slice()).unwrap_or(&[])
    }

    pub fn edges(&self) -> &[Edge] {
        self.current().map(|w| w.edges.as_slice()).unwrap_or(&[])
    }

    pub fn node(&self, id: &str) -> Option<&NodeSpec> {
        self.current().and_then(|w| w.find_node(id))
    }

    pub fn add_node(&mut self, node: NodeSpec) -> Result<String, WorkflowError> {
        self.current_mut()?.add_node(node)
    }

    pub fn remove_node(&mut self, id: &str) -> Result<NodeSpec, WorkflowError> {
        self.current_mut()?.remove_node(id)
    }

    pub fn move_node(&mut self, id: &str, position: Position) -> Result<(), WorkflowError> {
        self.current_mut()?.move_node(id, position)
    }

    pub fn add_edge(&mut self, edge: Edge) -> Result<String, WorkflowError> {
        Ok(self.current_mut()?.add_edge(edge))
    }

    pub fn remove_edge(&mut self, id: &str) -> Result<Edge, WorkflowError> {
        self.current_mut()?.remove_edge(id)
    }

    pub fn update_edge_props(&mut self, id: &str, patch: EdgePatch) -> Result<(), WorkflowError> {
        self.current_mut()?.update_edge(id, patch)
    }

    /// Shallow merge into a node's data
    pub fn update_node_data(
        &mut self,
        id: &str,
        patch: Map<String, Value>,
    ) -> Result<(), WorkflowError> {
        self.current_mut()?.update_node_data(id, patch)
    }

    /// Configuration edit: merge and mark the node stale
    pub fn edit_node_config(
        &mut self,
        id: &str,
        mut patch: Map<String, Value>,
    ) -> Result<(), WorkflowError> {
        patch.insert("dirty".to_string(), Value::Bool(true));
        self.update_node_data(id, patch)
    }
}

/// Prompt feeding a model feeding a display node
fn starter_workflow(name: String) -> Workflow {
    let prompt = NodeSpec::new(NodeKind::Prompt)
        .with_data("prompt", "")
        .with_output("")
        .with_position(0.0, -80.0)
        .with_size(500.0, 200.0);
    let ai = NodeSpec::new(NodeKind::Ai)
        .with_data("systemPrompt", "")
        .dirty()
        .with_position(0.0, 210.0)
        .with_size(500.0, 320.0);
    let markdown = NodeSpec::new(NodeKind::Markdown)
        .with_data("text", "")
        .dirty()
        .with_position(0.0, 620.0)
        .with_size(500.0, 400.0);
    let links = [(prompt.id.clone(), ai.id.clone()), (ai.id.clone(), markdown.id.clone())];

    let mut workflow = Workflow::new(name);
    workflow.nodes = vec![prompt, ai, markdown];
    for (source, target) in links {
        workflow.connect(&source, &target);
    }
    workflow
}
