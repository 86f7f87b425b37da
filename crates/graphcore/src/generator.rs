//! Turn generator steps into a linear node chain.
//!
//! The engine does not care how a graph was authored; this is only the
//! deterministic layout applied to whatever steps a generator produced.

use crate::{Edge, NodeKind, NodeSpec};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

const NODE_WIDTH: f64 = 280.0;
const NODE_HEIGHT: f64 = 200.0;
const CONTROL_HEIGHT: f64 = 180.0;
const TRIGGER_HEIGHT: f64 = 120.0;
const GAP_X: f64 = 80.0;
const GAP_Y: f64 = 120.0;

/// One step emitted by a workflow generator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedStep {
    pub id: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_service: Option<String>,
}

impl GeneratedStep {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            suggested_service: None,
        }
    }

    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.suggested_service = Some(service.into());
        self
    }

    fn service(&self) -> Option<String> {
        self.suggested_service.as_deref().map(str::to_lowercase)
    }
}

/// Pick a trigger kind when the first step describes how the run starts
fn trigger_kind(step: &GeneratedStep) -> Option<NodeKind> {
    let desc = step.description.to_lowercase();
    let svc = step.service();
    let svc = svc.as_deref();
    if svc == Some("webhook") || ["webhook", "form submit", "incoming"].iter().any(|k| desc.contains(k)) {
        return Some(NodeKind::TriggerWebhook);
    }
    if svc == Some("schedule")
        || ["schedule", "daily", "weekly", "cron"].iter().any(|k| desc.contains(k))
    {
        return Some(NodeKind::TriggerSchedule);
    }
    None
}

fn step_kind(step: &GeneratedStep) -> NodeKind {
    let desc = step.description.to_lowercase();
    let svc = step.service();
    let has = |keys: &[&str]| keys.iter().any(|k| desc.contains(k));
    match svc.as_deref() {
        Some("email" | "gmail" | "sendgrid") => return NodeKind::ActionEmail,
        Some("slack") => return NodeKind::ActionSlack,
        Some("document") => return NodeKind::ActionDocument,
        Some("condition") => return NodeKind::ControlCondition,
        Some("transform") => return NodeKind::DataTransform,
        Some("approval") => return NodeKind::ControlApproval,
        Some("delay") => return NodeKind::ControlDelay,
        Some("http") => return NodeKind::ActionHttp,
        _ => {}
    }
    if has(&["document", "pdf", "extract"]) {
        NodeKind::ActionDocument
    } else if has(&[" if ", "branch", "else"]) {
        NodeKind::ControlCondition
    } else if has(&["map ", "transform", "reshape"]) {
        NodeKind::DataTransform
    } else if has(&["approval", "approve"]) {
        NodeKind::ControlApproval
    } else if has(&["delay", "wait", "later"]) {
        NodeKind::ControlDelay
    } else if has(&["email"]) {
        NodeKind::ActionEmail
    } else if has(&["slack"]) {
        NodeKind::ActionSlack
    } else {
        NodeKind::ActionHttp
    }
}

/// Starting configuration for a generated node
fn default_data(kind: NodeKind, step: &GeneratedStep) -> Value {
    let d = step.description.as_str();
    match kind {
        NodeKind::TriggerWebhook => json!({"path": "/webhook", "method": "POST"}),
        NodeKind::TriggerSchedule => json!({
            "cron": "0 9 * * 1-5",
            "description": if d.is_empty() { "Weekday 9am" } else { d },
        }),
        NodeKind::ActionEmail => json!({
            "to": "{{to}}", "subject": "Notification", "body": d, "service": "SendGrid",
        }),
        NodeKind::ActionSlack => json!({"operation": "post_message", "channel": "#general", "message": d}),
        NodeKind::ActionDocument => json!({"format": "pdf", "extractFields": ""}),
        NodeKind::ControlCondition => json!({
            "condition": d, "leftOperand": "{{value}}", "operator": "eq", "rightOperand": "",
        }),
        NodeKind::DataTransform => json!({"mapping": "", "outputKey": "payload"}),
        NodeKind::ControlApproval => json!({"title": "Approve", "description": d}),
        NodeKind::ControlDelay => json!({"delayMinutes": 0, "delayHours": 24}),
        NodeKind::ActionHttp => json!({
            "method": "POST", "url": "https://api.example.com/action", "bodyType": "json",
        }),
        _ => json!({}),
    }
}

fn spec_with(kind: NodeKind, data: Value) -> NodeSpec {
    let mut node = NodeSpec::new(kind);
    if let Value::Object(fields) = data {
        node.data.fields = fields;
    }
    node
}

/// Lay steps out top to bottom behind a trigger, with a summary annotation
/// to the right.
pub fn build_graph(steps: &[GeneratedStep], workflow_name: &str) -> (Vec<NodeSpec>, Vec<Edge>) {
    let mut nodes = Vec::new();
    let mut edges = Vec::new();

    let (trigger, rest) = match steps.split_first() {
        Some((first, rest)) => match trigger_kind(first) {
            Some(kind) => (spec_with(kind, default_data(kind, first)), rest),
            None => (NodeSpec::new(NodeKind::TriggerManual), steps),
        },
        None => (NodeSpec::new(NodeKind::TriggerManual), steps),
    };
    let trigger = trigger.with_position(0.0, 0.0).with_size(NODE_WIDTH, TRIGGER_HEIGHT);
    let mut prev = trigger.id.clone();
    nodes.push(trigger);

    let mut y = 0.0;
    for step in rest {
        let kind = step_kind(step);
        let height = if kind.is_control() { CONTROL_HEIGHT } else { NODE_HEIGHT };
        let node = spec_with(kind, default_data(kind, step))
            .with_position(0.0, y + GAP_Y)
            .with_size(NODE_WIDTH, height);
        edges.push(Edge::new(prev.clone(), node.id.clone()));
        prev = node.id.clone();
        nodes.push(node);
        y += GAP_Y + height;
    }

    let summary = format!(
        "**{workflow_name}**\n\nGenerated from your description. Edit nodes to set credentials and parameters. Use **Connections** in the sidebar to link APIs."
    );
    nodes.push(
        NodeSpec::new(NodeKind::Annotation)
            .with_data("text", summary)
            .with_position(NODE_WIDTH + GAP_X, 40.0)
            .with_size(280.0, 120.0),
    );

    (nodes, edges)
}
