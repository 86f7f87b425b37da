use crate::registry::NodeRegistry;
use futures::FutureExt;
use graphcore::{NodeContext, NodeData, NodeError, NodeKind, WorkflowError};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// Uniform compute dispatch over the registry.
///
/// Every failure except cancellation comes back as `Ok(data)` with `error`
/// set, so callers only need to distinguish "finished" from "aborted".
#[derive(Clone)]
pub struct NodeExecutor {
    registry: Arc<NodeRegistry>,
}

impl NodeExecutor {
    pub fn new(registry: Arc<NodeRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    pub async fn compute(
        &self,
        node_type: &str,
        ctx: NodeContext,
        data: NodeData,
    ) -> Result<NodeData, NodeError> {
        ctx.check_cancelled()?;

        let node = match node_type.parse::<NodeKind>() {
            Ok(kind) => self.registry.get(kind),
            Err(_) => None,
        };
        let Some(node) = node else {
            let err = WorkflowError::UnknownNodeType(node_type.to_string());
            tracing::warn!(node_id = %ctx.node_id, "{}", err);
            return Ok(data.with_error(err.to_string()));
        };

        let fallback = data.clone();
        let node_id = ctx.node_id.clone();
        match AssertUnwindSafe(node.compute(ctx, data)).catch_unwind().await {
            Ok(Ok(next)) => Ok(next),
            Ok(Err(NodeError::Cancelled)) => Err(NodeError::Cancelled),
            Ok(Err(e)) => {
                tracing::debug!(node_id = %node_id, "Compute failed: {}", e);
                Ok(fallback.with_error(e.to_string()))
            }
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "Unexpected failure".to_string());
                tracing::error!(node_id = %node_id, "Compute panicked: {}", message);
                Ok(fallback.with_error(message))
            }
        }
    }
}
