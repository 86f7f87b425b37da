use crate::WorkflowError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Closed set of node types known to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeKind {
    Prompt,
    Ai,
    Markdown,
    Annotation,
    TriggerManual,
    TriggerWebhook,
    TriggerSchedule,
    ActionHttp,
    ActionEmail,
    ActionSlack,
    ActionDocument,
    ControlDelay,
    ControlCondition,
    ControlApproval,
    DataTransform,
}

impl NodeKind {
    pub const ALL: [NodeKind; 15] = [
        NodeKind::Prompt,
        NodeKind::Ai,
        NodeKind::Markdown,
        NodeKind::Annotation,
        NodeKind::TriggerManual,
        NodeKind::TriggerWebhook,
        NodeKind::TriggerSchedule,
        NodeKind::ActionHttp,
        NodeKind::ActionEmail,
        NodeKind::ActionSlack,
        NodeKind::ActionDocument,
        NodeKind::ControlDelay,
        NodeKind::ControlCondition,
        NodeKind::ControlApproval,
        NodeKind::DataTransform,
    ];

    /// Type tag as it appears in persisted documents
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Prompt => "prompt",
            NodeKind::Ai => "ai",
            NodeKind::Markdown => "markdown",
            NodeKind::Annotation => "annotation",
            NodeKind::TriggerManual => "trigger-manual",
            NodeKind::TriggerWebhook => "trigger-webhook",
            NodeKind::TriggerSchedule => "trigger-schedule",
            NodeKind::ActionHttp => "action-http",
            NodeKind::ActionEmail => "action-email",
            NodeKind::ActionSlack => "action-slack",
            NodeKind::ActionDocument => "action-document",
            NodeKind::ControlDelay => "control-delay",
            NodeKind::ControlCondition => "control-condition",
            NodeKind::ControlApproval => "control-approval",
            NodeKind::DataTransform => "data-transform",
        }
    }

    pub fn category(&self) -> &'static str {
        match self {
            NodeKind::Prompt | NodeKind::Ai => "text",
            NodeKind::Markdown | NodeKind::Annotation => "display",
            NodeKind::TriggerManual | NodeKind::TriggerWebhook | NodeKind::TriggerSchedule => {
                "trigger"
            }
            NodeKind::ActionHttp
            | NodeKind::ActionEmail
            | NodeKind::ActionSlack
            | NodeKind::ActionDocument => "action",
            NodeKind::ControlDelay | NodeKind::ControlCondition | NodeKind::ControlApproval => {
                "control"
            }
            NodeKind::DataTransform => "data",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            NodeKind::Prompt => "Static text, or its inputs rendered as one prompt",
            NodeKind::Ai => "Generate text with a language model",
            NodeKind::Markdown => "Display upstream outputs as markdown",
            NodeKind::Annotation => "Documentation note (not runnable)",
            NodeKind::TriggerManual => "Start a run by hand, optionally with a list of rows",
            NodeKind::TriggerWebhook => "Start a run from an incoming webhook",
            NodeKind::TriggerSchedule => "Start a run on a cron schedule",
            NodeKind::ActionHttp => "Call an HTTP endpoint with retries",
            NodeKind::ActionEmail => "Send or read email via SendGrid or Gmail",
            NodeKind::ActionSlack => "Post messages and manage Slack channels",
            NodeKind::ActionDocument => "Extract fields from a document",
            NodeKind::ControlDelay => "Wait before continuing (at most 10 seconds)",
            NodeKind::ControlCondition => "Route to the true or false branch",
            NodeKind::ControlApproval => "Hold the run until a person approves",
            NodeKind::DataTransform => "Reshape upstream data",
        }
    }

    /// Display nodes receive intermediate text from a streaming parent.
    pub fn is_display(&self) -> bool {
        matches!(self, NodeKind::Markdown)
    }

    pub fn is_control(&self) -> bool {
        self.category() == "control"
    }
}

impl FromStr for NodeKind {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NodeKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| WorkflowError::UnknownNodeType(s.to_string()))
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
