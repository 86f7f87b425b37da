use serde::{Deserialize, Serialize};

/// A materialized upstream value handed to a compute strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeInput {
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl ComputeInput {
    pub fn new(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            label: None,
        }
    }

    pub fn labelled(output: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            label: Some(label.into()),
        }
    }
}

/// Render inputs as one prompt.
///
/// Labelled inputs are wrapped in `<label>` blocks (lower-cased, spaces become
/// underscores); unlabelled ones pass through verbatim. Blocks are separated
/// by a blank line.
pub fn format_inputs(inputs: &[ComputeInput]) -> String {
    inputs
        .iter()
        .map(|input| match input.label.as_deref() {
            Some(label) if !label.is_empty() => {
                let tag = label.to_lowercase().replace(' ', "_");
                format!("<{tag}>\n{}\n</{tag}>", input.output.trim())
            }
            _ => input.output.clone(),
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
