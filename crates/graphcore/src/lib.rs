//! Core abstractions for the graph engine
//! 
//! This crate provides the data model of an editable workflow graph, the
//! compute contract every node type implements, and the run event types.
//! It has no runtime dependencies.

mod credentials;
pub mod document;
mod error;
pub mod events;
pub mod generator;
mod input;
mod kind;
mod node;
mod workflow;

pub use credentials::{CredentialStore, MemoryCredentials};
pub use document::{ValidationIssue, WorkflowDocument};
pub use error::{FlowError, ImportError, NodeError, WorkflowError};
pub use input::{format_inputs, ComputeInput};
pub use kind::NodeKind;
pub use node::{Node, NodeContext, StreamSink};
pub use workflow::{
    duplicate_node_id, Edge, EdgePatch, NodeData, NodeId, NodeSpec, Position, Workflow, WorkflowId,
    WorkflowMetadata,
};
pub use events::*;

/// Result type for flow operations
pub type Result<T> = std::result::Result<T, FlowError>;
