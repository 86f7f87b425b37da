use async_trait::async_trait;
use graphcore::{Node, NodeContext, NodeData, NodeError, NodeKind};
use std::time::Duration;

/// Longest a delay node actually waits, whatever it is configured for
pub const MAX_DELAY: Duration = Duration::from_secs(10);

/// Delay execution, then forward the most recent input
pub struct DelayNode;

impl DelayNode {
    fn configured(data: &NodeData) -> Duration {
        let number = |key: &str| {
            data.get(key)
                .and_then(|v| v.as_f64())
                .filter(|n| n.is_finite() && *n > 0.0)
                .unwrap_or(0.0)
        };
        let seconds = number("delayMinutes") * 60.0 + number("delayHours") * 3600.0;
        Duration::from_secs_f64(seconds.min(MAX_DELAY.as_secs_f64()))
    }
}

#[async_trait]
impl Node for DelayNode {
    fn kind(&self) -> NodeKind {
        NodeKind::ControlDelay
    }

    async fn compute(&self, ctx: NodeContext, data: NodeData) -> Result<NodeData, NodeError> {
        let delay = Self::configured(&data);
        if !delay.is_zero() {
            ctx.events.info(format!("Delaying for {}ms", delay.as_millis()));
            ctx.sleep(delay).await?;
        }
        let output = ctx.last_input().unwrap_or("{}").to_string();
        Ok(data.succeed(output))
    }
}
