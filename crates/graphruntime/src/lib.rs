//! Workflow execution runtime
//! 
//! This crate owns the mutable graph state and runs nodes: the graph store,
//! the cancellation manager, compute dispatch over the node registry, and
//! the run orchestrator that keeps outputs fresh and cascades downstream.

mod cancel;
mod executor;
mod graph;
mod orchestrator;
mod registry;
mod runtime;
mod store;

pub use cancel::CancellationManager;
pub use executor::NodeExecutor;
pub use graph::{validate_workflow, GraphReport};
pub use orchestrator::{Orchestrator, RunSummary};
pub use registry::NodeRegistry;
pub use runtime::{FlowRuntime, RuntimeConfig};
pub use store::{GraphStore, SharedStore};
