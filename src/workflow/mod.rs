//! Workflow engine: kinds, state graphs, instances, and the manager.

mod instance;
mod kind;
mod manager;
mod registry;

pub use instance::{TaskStatus, TransitionRecord, WorkflowInstance, WorkflowTask};
pub use kind::WorkflowKind;
pub use manager::InstanceManager;
pub use registry::{roles, StateGraph, TransitionRule};
