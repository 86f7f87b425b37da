use crate::{
    events::EventEmitter, ComputeInput, CredentialStore, NodeData, NodeError, NodeId, NodeKind,
};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Compute contract every node type implements
#[async_trait]
pub trait Node: Send + Sync {
    /// Type tag this strategy serves
    fn kind(&self) -> NodeKind;
    
    /// Compute the node's next data from its inputs and current data.
    ///
    /// Domain failures are returned as `Ok(data)` with `error` set.
    /// Cancellation must surface as `Err(NodeError::Cancelled)`.
    async fn compute(&self, ctx: NodeContext, data: NodeData) -> Result<NodeData, NodeError>;
}

/// Execution context passed to each compute call
#[derive(Clone)]
pub struct NodeContext {
    /// Node being computed
    pub node_id: NodeId,
    
    /// Upstream outputs, ordered by the horizontal position of their sources
    pub inputs: Vec<ComputeInput>,
    
    /// Event emitter for real-time updates
    pub events: EventEmitter,
    
    /// Cancellation token of the active workflow
    pub cancellation: CancellationToken,

    /// External secret lookup
    pub credentials: Arc<dyn CredentialStore>,

    /// Intermediate text for display nodes downstream
    pub stream: StreamSink,
}

impl NodeContext {
    pub fn new(
        node_id: impl Into<NodeId>,
        events: EventEmitter,
        credentials: Arc<dyn CredentialStore>,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            inputs: Vec::new(),
            events,
            cancellation: CancellationToken::new(),
            credentials,
            stream: StreamSink::disconnected(),
        }
    }

    pub fn with_inputs(mut self, inputs: Vec<ComputeInput>) -> Self {
        self.inputs = inputs;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn with_stream(mut self, stream: StreamSink) -> Self {
        self.stream = stream;
        self
    }

    /// Checkpoint: fail with `Cancelled` once the token has fired
    pub fn check_cancelled(&self) -> Result<(), NodeError> {
        if self.cancellation.is_cancelled() {
            Err(NodeError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Sleep that unwinds as soon as the token fires
    pub async fn sleep(&self, duration: Duration) -> Result<(), NodeError> {
        tokio::select! {
            _ = self.cancellation.cancelled() => Err(NodeError::Cancelled),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }

    pub fn credential(&self, key: &str) -> Option<String> {
        self.credentials.get_credential(key)
    }

    /// Most recent upstream output
    pub fn last_input(&self) -> Option<&str> {
        self.inputs.last().map(|input| input.output.as_str())
    }
}

/// Side channel for text produced while a node is still running.
///
/// The sender half lives in the compute call; the orchestrator owns the
/// receiver for the duration of that one run.
#[derive(Clone, Default)]
pub struct StreamSink {
    sender: Option<mpsc::UnboundedSender<String>>,
}

impl StreamSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender: Some(sender) }, receiver)
    }

    pub fn disconnected() -> Self {
        Self::default()
    }

    pub fn push(&self, text: impl Into<String>) {
        if let Some(sender) = &self.sender {
            let _ = sender.send(text.into());
        }
    }
}
