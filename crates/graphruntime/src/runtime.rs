use crate::{
    cancel::CancellationManager, executor::NodeExecutor, orchestrator::Orchestrator,
    registry::NodeRegistry, store::GraphStore, store::SharedStore, RunSummary,
};
use graphcore::{
    CredentialStore, EventBus, ExecutionEvent, FlowError, ImportError, MemoryCredentials,
    WorkflowError, WorkflowId,
};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;

/// Main runtime: the graph store plus everything needed to run its nodes
pub struct FlowRuntime {
    store: SharedStore,
    registry: Arc<NodeRegistry>,
    cancel: Arc<CancellationManager>,
    event_bus: Arc<EventBus>,
    orchestrator: Orchestrator,
}

impl FlowRuntime {
    /// Create a new runtime with default settings
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    /// Create a new runtime with custom configuration
    pub fn with_config(config: RuntimeConfig) -> Self {
        Self::with_registry(
            Arc::new(NodeRegistry::new()),
            Arc::new(MemoryCredentials::new()),
            config,
        )
    }

    /// Create a new runtime with a pre-configured registry
    pub fn with_registry(
        registry: Arc<NodeRegistry>,
        credentials: Arc<dyn CredentialStore>,
        config: RuntimeConfig,
    ) -> Self {
        let store = GraphStore::new().shared();
        let cancel = Arc::new(CancellationManager::new());
        let event_bus = Arc::new(EventBus::new(config.event_buffer_size));
        let orchestrator = Orchestrator::new(
            store.clone(),
            NodeExecutor::new(registry.clone()),
            cancel.clone(),
            event_bus.clone(),
            credentials,
            config.execution_timeout,
        );

        Self {
            store,
            registry,
            cancel,
            event_bus,
            orchestrator,
        }
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    /// Get access to the node registry
    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    /// Subscribe to execution events
    pub fn subscribe_events(&self) -> tokio::sync::broadcast::Receiver<ExecutionEvent> {
        self.event_bus.subscribe()
    }

    /// Get the event bus for direct access
    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    /// Run a node of the current workflow; resolves when its cascade settles
    pub async fn run_node(&self, node_id: &str, first_run: bool) -> RunSummary {
        self.orchestrator.run_node(node_id, first_run).await
    }

    /// Abort everything in flight and clear transient run state
    pub async fn stop_all(&self) {
        self.cancel.cancel_all();
        self.store.write().await.clear_transient();
    }

    pub async fn switch_workflow(&self, id: &str) -> Result<(), WorkflowError> {
        self.cancel.cancel_all();
        self.store.write().await.select(id)
    }

    pub async fn create_workflow(&self, name: Option<&str>) -> WorkflowId {
        self.cancel.cancel_all();
        self.store.write().await.create_workflow(name)
    }

    /// Import a document as the new current workflow
    pub async fn import_json(&self, json: &str) -> Result<WorkflowId, ImportError> {
        let mut store = self.store.write().await;
        let id = store.import_json(json)?;
        self.cancel.cancel_all();
        Ok(id)
    }

    pub async fn export_json(&self, id: &str) -> Result<String, FlowError> {
        self.store.read().await.export_json(id)
    }

    pub async fn delete_workflow(&self, id: &str) -> Result<(), WorkflowError> {
        let mut store = self.store.write().await;
        let was_current = store.current_id() == Some(id);
        if was_current {
            self.cancel.cancel_all();
        }
        store.delete_workflow(id)?;
        if was_current {
            // The fallback becomes current the same way a switch would
            if let Some(next) = store.current_id().map(str::to_string) {
                store.select(&next)?;
            }
        }
        Ok(())
    }

    /// Configuration edit from the property panel
    pub async fn edit_node_config(
        &self,
        node_id: &str,
        patch: Map<String, Value>,
    ) -> Result<(), WorkflowError> {
        self.store.write().await.edit_node_config(node_id, patch)
    }

    /// Approve a waiting gate and resume its cascade
    pub async fn approve(&self, node_id: &str, approved_by: &str) -> Result<RunSummary, WorkflowError> {
        let patch = json!({
            "approved": true,
            "approvedBy": approved_by,
            "dirty": true,
        });
        if let Value::Object(patch) = patch {
            self.store.write().await.update_node_data(node_id, patch)?;
        }
        Ok(self.run_node(node_id, false).await)
    }
}

impl Default for FlowRuntime {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for the runtime
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Ceiling for a single compute call
    pub execution_timeout: Duration,
    pub event_buffer_size: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            execution_timeout: Duration::from_secs(500),
            event_buffer_size: 1000,
        }
    }
}
