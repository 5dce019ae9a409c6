//! Workflow automation engine for the marketloop marketing CRM.
//!
//! This crate provides the automation core:
//!
//! - **Node Catalog**: typed step kinds (actions, condition, end) with
//!   per-kind configuration and a validation registry
//! - **Graph Store**: flat node arenas whose structure lives in id pointers
//! - **Graph Builder**: entry-node resolution and ordered traversal with
//!   cycle detection
//! - **Graph Editor**: pure insert/remove operations that keep graphs
//!   well-formed
//! - **Trigger Matcher**: pure event-to-trigger matching
//! - **Execution Engine**: the per-contact state machine with bounded
//!   retries and restartable wait suspension
//! - **Stores**: async persistence seams with in-memory implementations
//! - **Service**: the transport-agnostic operation boundary

pub mod actions;
pub mod builder;
pub mod editor;
pub mod engine;
pub mod error;
pub mod event;
pub mod execution;
pub mod graph;
pub mod node;
pub mod registry;
pub mod service;
pub mod store;
pub mod trigger;
pub mod workflow;

pub use actions::{ActionDispatcher, ActionError, ActionOutcome, ContactDirectory, ContactSnapshot};
pub use builder::{NodePlacement, find_entry_node, flatten};
pub use editor::{insert_node_after, remove_node, replace_nodes};
pub use engine::{Engine, RetryPolicy};
pub use error::{EngineError, GraphError, StoreError, TriggerError};
pub use event::{CrmEvent, EventDetail};
pub use execution::{Execution, ExecutionStatus, StepRecord, StepStatus};
pub use graph::WorkflowGraph;
pub use node::{BranchSide, Node, NodeCategory, NodeConfig, NodeId, NodeKind};
pub use service::{AutomationService, CancellationPolicy, EngineSettings, WorkflowUpdate};
pub use store::{ExecutionStore, MemoryExecutionStore, MemoryWorkflowStore, WorkflowStore};
pub use trigger::{TriggerConfig, TriggerKind};
pub use workflow::{Workflow, WorkflowStats, WorkflowStatus};
