//! Standard node library
//! 
//! Compute strategies for every built-in node kind: text and display nodes,
//! triggers, outbound actions (HTTP, email, Slack), flow control and text
//! generation.

mod ai;
mod control;
mod email;
mod endpoints;
mod http;
mod slack;
mod stub;
mod text;
mod time;
mod trigger;

pub use ai::{GenerationNode, Provider};
pub use control::{ApprovalNode, ConditionNode};
pub use email::EmailNode;
pub use endpoints::ServiceEndpoints;
pub use http::{HttpRequestNode, HttpRetryPolicy};
pub use slack::SlackNode;
pub use stub::PlaceholderNode;
pub use text::{AnnotationNode, MarkdownNode, PromptNode};
pub use time::DelayNode;
pub use trigger::ManualTriggerNode;
use graphcore::NodeKind;
use graphruntime::NodeRegistry;

use std::sync::Arc;

/// Register all standard nodes against the public service endpoints
pub fn register_all(registry: &mut NodeRegistry) {
    register_with(registry, ServiceEndpoints::default());
}

/// Register all standard nodes, sending outbound calls to `endpoints`
pub fn register_with(registry: &mut NodeRegistry, endpoints: ServiceEndpoints) {
    registry.register(Arc::new(PromptNode));
    registry.register(Arc::new(MarkdownNode));
    registry.register(Arc::new(AnnotationNode));
    registry.register(Arc::new(GenerationNode::new(endpoints.clone())));
    registry.register(Arc::new(ManualTriggerNode));
    registry.register(Arc::new(HttpRequestNode::new()));
    registry.register(Arc::new(EmailNode::new(endpoints.clone())));
    registry.register(Arc::new(SlackNode::new(endpoints)));
    registry.register(Arc::new(DelayNode));
    registry.register(Arc::new(ConditionNode));
    registry.register(Arc::new(ApprovalNode));

    for kind in [
        NodeKind::TriggerWebhook,
        NodeKind::TriggerSchedule,
        NodeKind::ActionDocument,
        NodeKind::DataTransform,
    ] {
        registry.register(Arc::new(PlaceholderNode(kind)));
    }
}
