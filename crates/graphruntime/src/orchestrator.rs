use crate::cancel::CancellationManager;
use crate::executor::NodeExecutor;
use crate::store::SharedStore;
use chrono::Utc;
use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use graphcore::{
    ComputeInput, CredentialStore, EventBus, ExecutionEvent, NodeContext, NodeData, NodeError,
    NodeId, NodeKind, RunId, StreamSink, Workflow, WorkflowError, WorkflowId,
};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// What one `run_node` call did
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub run_id: RunId,
    pub workflow_id: Option<WorkflowId>,
    /// Nodes whose compute strategy was invoked, in start order
    pub computed: Vec<NodeId>,
    pub cancelled: bool,
}

/// State shared by every step of one user-initiated run
struct RunScope {
    run_id: RunId,
    workflow_id: WorkflowId,
    token: CancellationToken,
    computed: Mutex<Vec<NodeId>>,
}

impl RunScope {
    fn was_computed(&self, id: &str) -> bool {
        self.computed
            .lock()
            .map(|computed| computed.iter().any(|n| n == id))
            .unwrap_or(false)
    }

    fn record(&self, id: &str) {
        if let Ok(mut computed) = self.computed.lock() {
            computed.push(id.to_string());
        }
    }
}

/// Outcome of the planning step, decided under one store lock
enum Plan {
    Skip,
    /// Stale parents must run first; their cascade comes back here
    Stalled(Vec<NodeId>),
    Compute(Job),
}

struct Job {
    kind: NodeKind,
    previous: NodeData,
    inputs: Vec<ComputeInput>,
    edges: Vec<String>,
    display_children: Vec<NodeId>,
}

enum Outcome {
    Finished(NodeData),
    Cancelled,
}

/// Dependency resolver and run orchestrator.
///
/// A run refreshes stale parents first, computes the node with its parents'
/// outputs ordered by horizontal position, then cascades to every child.
/// The future returned by [`Orchestrator::run_node`] resolves once the whole
/// cascade has settled.
pub struct Orchestrator {
    store: SharedStore,
    executor: NodeExecutor,
    cancel: Arc<CancellationManager>,
    events: Arc<EventBus>,
    credentials: Arc<dyn CredentialStore>,
    execution_timeout: Duration,
}

impl Orchestrator {
    pub fn new(
        store: SharedStore,
        executor: NodeExecutor,
        cancel: Arc<CancellationManager>,
        events: Arc<EventBus>,
        credentials: Arc<dyn CredentialStore>,
        execution_timeout: Duration,
    ) -> Self {
        Self {
            store,
            executor,
            cancel,
            events,
            credentials,
            execution_timeout,
        }
    }

    /// Run `node_id` in the current workflow.
    ///
    /// With `first_run`, every transitive descendant is marked dirty before
    /// anything computes.
    pub async fn run_node(&self, node_id: &str, first_run: bool) -> RunSummary {
        let run_id = RunId::new_v4();
        let workflow_id = self.store.read().await.current_id().map(str::to_string);
        let Some(workflow_id) = workflow_id else {
            tracing::warn!("Run of {} requested without a current workflow", node_id);
            return RunSummary {
                run_id,
                workflow_id: None,
                computed: Vec::new(),
                cancelled: false,
            };
        };

        tracing::info!("Run requested: node={} first_run={} run={}", node_id, first_run, run_id);
        self.events.emit(ExecutionEvent::RunRequested {
            run_id,
            workflow_id: workflow_id.clone(),
            node_id: node_id.to_string(),
            first_run,
            timestamp: Utc::now(),
        });

        let scope = RunScope {
            run_id,
            workflow_id: workflow_id.clone(),
            token: self.cancel.token(),
            computed: Mutex::new(Vec::new()),
        };
        self.run_inner(&scope, node_id.to_string(), first_run, Vec::new())
            .await;

        let computed = scope
            .computed
            .lock()
            .map(|computed| computed.clone())
            .unwrap_or_default();
        RunSummary {
            run_id,
            workflow_id: Some(workflow_id),
            computed,
            cancelled: scope.token.is_cancelled(),
        }
    }

    fn run_inner<'a>(
        &'a self,
        scope: &'a RunScope,
        id: NodeId,
        first_run: bool,
        path: Vec<NodeId>,
    ) -> BoxFuture<'a, ()> {
        async move {
            match self.plan(scope, &id, first_run, &path).await {
                Plan::Skip => {}
                Plan::Stalled(parents) => {
                    tracing::debug!("Node {} waiting on {} stale parent(s)", id, parents.len());
                    self.skipped(scope, &id, format!("waiting on {} stale parent(s)", parents.len()));
                    let mut path = path;
                    path.push(id);
                    let runs = parents
                        .into_iter()
                        .map(|parent| self.run_inner(scope, parent, false, path.clone()));
                    join_all(runs).await;
                }
                Plan::Compute(job) => self.execute(scope, id, job).await,
            }
        }
        .boxed()
    }

    /// Decide what to do with `id`, applying every state change of the
    /// decision under the same write lock so two runs cannot both claim it.
    async fn plan(&self, scope: &RunScope, id: &str, first_run: bool, path: &[NodeId]) -> Plan {
        let mut store = self.store.write().await;
        if scope.token.is_cancelled() {
            return Plan::Skip;
        }
        let Some(workflow) = store.workflow_mut(&scope.workflow_id) else {
            return Plan::Skip;
        };
        let Some(node) = workflow.find_node(id) else {
            tracing::debug!("Node {} not found, ignoring run", id);
            return Plan::Skip;
        };
        let kind = match node.kind() {
            Ok(kind) => kind,
            Err(e) => {
                tracing::warn!("Node {}: {}", id, e);
                return Plan::Skip;
            }
        };
        if node.data.loading {
            tracing::debug!("Node {} is already running", id);
            return Plan::Skip;
        }
        if scope.was_computed(id) {
            return Plan::Skip;
        }

        if first_run {
            for descendant in workflow.descendants(id) {
                if let Some(node) = workflow.find_node_mut(&descendant) {
                    node.data.dirty = true;
                }
            }
        }

        let has_incoming = workflow.incoming(id).next().is_some();
        let parents = live_parents(workflow, id);
        if has_incoming && parents.is_empty() {
            drop(store);
            tracing::debug!("Node {} has no live inputs", id);
            self.skipped(scope, id, "no live inputs".to_string());
            return Plan::Skip;
        }

        let stale: Vec<NodeId> = parents
            .iter()
            .filter_map(|p| workflow.find_node(p))
            .filter(|p| !p.data.is_fresh())
            .map(|p| p.id.clone())
            .collect();
        if !stale.is_empty() {
            if stale.iter().any(|p| p == id || path.contains(p)) {
                let error = WorkflowError::CyclicDependency.to_string();
                if let Some(node) = workflow.find_node_mut(id) {
                    node.data.loading = false;
                    node.data.error = Some(error.clone());
                }
                drop(store);
                tracing::warn!("Node {}: {}", id, error);
                self.failed(scope, id, error);
                return Plan::Skip;
            }
            return Plan::Stalled(stale);
        }

        let inputs = parents
            .iter()
            .filter_map(|p| workflow.find_node(p))
            .map(|p| ComputeInput {
                output: p.data.output.clone().unwrap_or_default(),
                label: p.data.label.clone(),
            })
            .collect();
        let display_children = workflow
            .children(id)
            .into_iter()
            .filter(|c| {
                workflow
                    .find_node(c)
                    .and_then(|n| n.kind().ok())
                    .is_some_and(|k| k.is_display())
            })
            .collect();
        let edges: Vec<String> = workflow.incoming(id).map(|e| e.id.clone()).collect();
        let Some(node) = workflow.find_node_mut(id) else {
            return Plan::Skip;
        };
        let previous = node.data.clone();
        node.data.loading = true;
        workflow.set_edges_animated(&edges, true);
        scope.record(id);

        Plan::Compute(Job {
            kind,
            previous,
            inputs,
            edges,
            display_children,
        })
    }

    async fn execute(&self, scope: &RunScope, id: NodeId, job: Job) {
        let Job {
            kind,
            previous,
            inputs,
            edges,
            display_children,
        } = job;

        tracing::info!("Executing node {} ({}) with {} input(s)", id, kind, inputs.len());
        self.events.emit(ExecutionEvent::NodeStarted {
            run_id: scope.run_id,
            node_id: id.clone(),
            node_type: kind.to_string(),
            input_count: inputs.len(),
            timestamp: Utc::now(),
        });

        let start = Instant::now();
        let (sink, mut partials) = StreamSink::channel();
        let ctx = NodeContext::new(
            id.clone(),
            self.events.create_emitter(scope.run_id, id.clone()),
            self.credentials.clone(),
        )
        .with_inputs(inputs)
        .with_cancellation(scope.token.clone())
        .with_stream(sink);

        let compute = self.executor.compute(kind.as_str(), ctx, previous.clone());
        tokio::pin!(compute);
        let deadline = tokio::time::sleep(self.execution_timeout);
        tokio::pin!(deadline);

        let outcome = loop {
            tokio::select! {
                _ = scope.token.cancelled() => break Outcome::Cancelled,
                _ = &mut deadline => {
                    let seconds = self.execution_timeout.as_secs();
                    tracing::warn!("Node {} timed out after {}s", id, seconds);
                    let error = NodeError::Timeout { seconds }.to_string();
                    break Outcome::Finished(previous.clone().with_error(error));
                }
                Some(text) = partials.recv() => {
                    self.apply_partial(scope, &display_children, text).await;
                }
                result = &mut compute => {
                    break match result {
                        Ok(data) => Outcome::Finished(data),
                        Err(_) => Outcome::Cancelled,
                    };
                }
            }
        };

        let mut next = match outcome {
            Outcome::Finished(data) if !scope.token.is_cancelled() => data,
            _ => {
                self.restore(scope, &id, previous, &edges).await;
                return;
            }
        };
        next.loading = false;
        let pending = kind == NodeKind::ControlApproval && next.get_bool("pendingApproval") == Some(true);
        if next.error.is_none() {
            // A gate still waiting for a decision has no output its children may use
            next.dirty = pending;
        }
        let duration_ms = start.elapsed().as_millis() as u64;

        let children = {
            let mut store = self.store.write().await;
            let Some(workflow) = store.workflow_mut(&scope.workflow_id) else {
                return;
            };
            if workflow.replace_node_data(&id, next.clone()).is_err() {
                return;
            }
            workflow.set_edges_animated(&edges, false);
            workflow.children(&id)
        };

        if let Some(error) = next.error.clone() {
            tracing::error!("Node {} failed: {}", id, error);
            self.failed(scope, &id, error);
            return;
        }

        tracing::info!("Node {} completed in {}ms", id, duration_ms);
        self.events.emit(ExecutionEvent::NodeCompleted {
            run_id: scope.run_id,
            node_id: id.clone(),
            output: next.output.clone(),
            duration_ms,
            timestamp: Utc::now(),
        });

        if pending {
            tracing::info!("Node {} is waiting for approval", id);
            return;
        }

        if !children.is_empty() {
            tracing::debug!("Cascading from {} to {} child(ren)", id, children.len());
        }
        let runs = children
            .into_iter()
            .map(|child| self.run_inner(scope, child, false, Vec::new()));
        join_all(runs).await;
    }

    /// Put the node back the way it was before the run
    async fn restore(&self, scope: &RunScope, id: &str, previous: NodeData, edges: &[String]) {
        tracing::info!("Node {} cancelled", id);
        {
            let mut store = self.store.write().await;
            if let Some(workflow) = store.workflow_mut(&scope.workflow_id) {
                let mut data = previous;
                data.loading = false;
                if let Err(e) = workflow.replace_node_data(id, data) {
                    tracing::debug!("Skipping restore of {}: {}", id, e);
                }
                workflow.set_edges_animated(edges, false);
            }
        }
        self.events.emit(ExecutionEvent::NodeCancelled {
            run_id: scope.run_id,
            node_id: id.to_string(),
            timestamp: Utc::now(),
        });
    }

    /// Show intermediate text on directly connected display nodes
    async fn apply_partial(&self, scope: &RunScope, children: &[NodeId], text: String) {
        if children.is_empty() {
            return;
        }
        let mut store = self.store.write().await;
        let Some(workflow) = store.workflow_mut(&scope.workflow_id) else {
            return;
        };
        for child in children {
            if let Some(node) = workflow.find_node_mut(child) {
                node.data.set("text", text.clone());
                node.data.loading = false;
                node.data.error = None;
                node.data.dirty = false;
            }
        }
        workflow.touch();
    }

    fn skipped(&self, scope: &RunScope, id: &str, reason: String) {
        self.events.emit(ExecutionEvent::NodeSkipped {
            run_id: scope.run_id,
            node_id: id.to_string(),
            reason,
            timestamp: Utc::now(),
        });
    }

    fn failed(&self, scope: &RunScope, id: &str, error: String) {
        self.events.emit(ExecutionEvent::NodeFailed {
            run_id: scope.run_id,
            node_id: id.to_string(),
            error,
            timestamp: Utc::now(),
        });
    }
}

/// Parents whose output reaches `id`, ordered by ascending x.
///
/// An edge leaving a fresh condition node through a named handle is live only
/// when the handle matches the recorded branch; an edge without a handle always
/// is. A stale condition parent is kept so that it gets refreshed before its
/// branch is consulted.
fn live_parents(workflow: &Workflow, id: &str) -> Vec<NodeId> {
    let mut seen = HashSet::new();
    let mut parents: Vec<_> = workflow
        .incoming(id)
        .filter_map(|edge| {
            let parent = workflow.find_node(&edge.source)?;
            let is_condition = parent.kind().ok() == Some(NodeKind::ControlCondition);
            if is_condition && parent.data.is_fresh() {
                if let Some(handle) = edge.source_handle.as_deref() {
                    if Some(handle) != parent.data.get_str("branch") {
                        return None;
                    }
                }
            }
            Some(parent)
        })
        .filter(|parent| seen.insert(parent.id.clone()))
        .collect();
    parents.sort_by(|a, b| a.position.x.total_cmp(&b.position.x));
    parents.into_iter().map(|p| p.id.clone()).collect()
}
