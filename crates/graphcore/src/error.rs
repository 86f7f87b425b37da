use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("Node error: {0}")]
    Node(#[from] NodeError),
    
    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    #[error(transparent)]
    Import(#[from] ImportError),
    
    #[error("Execution error: {0}")]
    Execution(String),
    
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Failures raised inside a compute strategy.
///
/// Only `Cancelled` is meant to escape the dispatch wrapper; everything else
/// is folded into the node's `error` field.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NodeError {
    #[error("{0}")]
    Configuration(String),

    #[error("Connect {0} in Connections.")]
    MissingCredential(String),

    #[error("{0}")]
    Transient(String),
    
    #[error("{0}")]
    ExecutionFailed(String),
    
    #[error("Node execution timed out after {seconds} seconds")]
    Timeout { seconds: u64 },
    
    #[error("Operation was aborted")]
    Cancelled,
}

impl NodeError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, NodeError::Cancelled)
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum WorkflowError {
    #[error("Workflow not found: {0}")]
    NotFound(String),

    #[error("No workflow is selected")]
    NoCurrentWorkflow,
    
    #[error("Invalid workflow: {0}")]
    Invalid(String),
    
    #[error("Cyclic dependency detected")]
    CyclicDependency,
    
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Edge not found: {0}")]
    EdgeNotFound(String),

    #[error("Duplicate node id: {0}")]
    DuplicateNode(String),
    
    #[error("Node type {0} not found")]
    UnknownNodeType(String),
}

/// Rejection of a persisted workflow document.
#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Failed to import workflow: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid workflow format: {}", join_issues(.issues))]
    Validation { issues: Vec<crate::ValidationIssue> },
}

fn join_issues(issues: &[crate::ValidationIssue]) -> String {
    issues
        .iter()
        .map(|issue| issue.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
