//! Error types for the automation crate.
//!
//! The layering mirrors the operations:
//! - `GraphError`: structural validation and mutation of workflow graphs
//! - `TriggerError`: trigger configuration problems (rejects activation)
//! - `StoreError`: persistence conflicts and lookups
//! - `EngineError`: high-level execution and service failures (wraps the others)

use crate::actions::ActionError;
use crate::node::NodeId;
use crate::trigger::TriggerKind;
use marketloop_core::{ContactId, ExecutionId, WorkflowId};
use std::fmt;

/// Errors from graph validation and structural mutation.
///
/// These errors contain only information available at the graph layer.
/// Workflow-level context (like workflow_id) is added by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// Every node is referenced by another node; there is no entry point.
    MissingEntryNode,
    /// More than one node has no incoming structural reference.
    MultipleEntryNodes { node_ids: Vec<NodeId> },
    /// Node with the given ID was not found in the graph.
    NodeNotFound { node_id: NodeId },
    /// A node already exists under the given ID.
    DuplicateNodeId { node_id: NodeId },
    /// A structural pointer references a node that does not exist.
    DanglingPointer { node_id: NodeId, target: NodeId },
    /// A condition node carries a linear successor pointer.
    ConditionHasSuccessor { node_id: NodeId },
    /// A non-condition node carries branch pointers.
    StrayBranchPointer { node_id: NodeId },
    /// An end node carries an outgoing pointer.
    EndHasPointer { node_id: NodeId },
    /// Traversal visited a node twice.
    CycleDetected { node_id: NodeId },
    /// Nodes exist that cannot be reached from the entry node.
    UnreachableNodes { node_ids: Vec<NodeId> },
    /// A node's configuration is invalid for its kind.
    InvalidConfig { node_id: NodeId, reason: String },
    /// Inserting after a condition node requires a branch side.
    BranchRequired { node_id: NodeId },
    /// A branch side was supplied for a non-condition insertion target.
    UnexpectedBranch { node_id: NodeId },
    /// Nothing can be inserted after an end node.
    InsertAfterEnd { node_id: NodeId },
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingEntryNode => write!(f, "graph has no entry node"),
            Self::MultipleEntryNodes { node_ids } => {
                write!(f, "graph has {} entry nodes, expected one", node_ids.len())
            }
            Self::NodeNotFound { node_id } => write!(f, "node not found: {node_id}"),
            Self::DuplicateNodeId { node_id } => write!(f, "duplicate node id: {node_id}"),
            Self::DanglingPointer { node_id, target } => {
                write!(f, "node {node_id} points at missing node {target}")
            }
            Self::ConditionHasSuccessor { node_id } => {
                write!(f, "condition node {node_id} must not have a linear successor")
            }
            Self::StrayBranchPointer { node_id } => {
                write!(f, "non-condition node {node_id} must not have branch pointers")
            }
            Self::EndHasPointer { node_id } => {
                write!(f, "end node {node_id} must not have an outgoing pointer")
            }
            Self::CycleDetected { node_id } => {
                write!(f, "cycle detected at node {node_id}")
            }
            Self::UnreachableNodes { node_ids } => {
                write!(f, "{} nodes unreachable from the entry node", node_ids.len())
            }
            Self::InvalidConfig { node_id, reason } => {
                write!(f, "invalid configuration on node {node_id}: {reason}")
            }
            Self::BranchRequired { node_id } => {
                write!(f, "inserting after condition node {node_id} requires a branch side")
            }
            Self::UnexpectedBranch { node_id } => {
                write!(f, "node {node_id} is not a condition node, branch side not applicable")
            }
            Self::InsertAfterEnd { node_id } => {
                write!(f, "cannot insert after end node {node_id}")
            }
        }
    }
}

impl std::error::Error for GraphError {}

/// Errors from trigger configuration, surfaced when a workflow is activated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerError {
    /// A required config field for the trigger type is missing or empty.
    MissingField {
        kind: TriggerKind,
        field: &'static str,
    },
    /// The schedule cron expression does not parse.
    InvalidCron { expression: String, reason: String },
}

impl fmt::Display for TriggerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingField { kind, field } => {
                write!(f, "{kind} trigger requires the '{field}' config field")
            }
            Self::InvalidCron { expression, reason } => {
                write!(f, "invalid cron expression '{expression}': {reason}")
            }
        }
    }
}

impl std::error::Error for TriggerError {}

/// Errors from workflow and execution stores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Workflow not found.
    WorkflowNotFound { workflow_id: WorkflowId },
    /// A workflow already exists under the given ID.
    WorkflowExists { workflow_id: WorkflowId },
    /// Execution not found.
    ExecutionNotFound { execution_id: ExecutionId },
    /// The workflow was edited concurrently; the caller should reload and retry.
    VersionConflict {
        workflow_id: WorkflowId,
        expected: u64,
        actual: u64,
    },
    /// The contact already has an active execution of this workflow.
    DuplicateActiveExecution {
        workflow_id: WorkflowId,
        contact_id: ContactId,
    },
    /// No graph snapshot is stored for the given workflow version.
    SnapshotMissing { workflow_id: WorkflowId, version: u64 },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WorkflowNotFound { workflow_id } => {
                write!(f, "workflow not found: {workflow_id}")
            }
            Self::WorkflowExists { workflow_id } => {
                write!(f, "workflow already exists: {workflow_id}")
            }
            Self::ExecutionNotFound { execution_id } => {
                write!(f, "execution not found: {execution_id}")
            }
            Self::VersionConflict {
                workflow_id,
                expected,
                actual,
            } => {
                write!(
                    f,
                    "workflow {workflow_id} was edited concurrently (expected version {expected}, found {actual})"
                )
            }
            Self::DuplicateActiveExecution {
                workflow_id,
                contact_id,
            } => {
                write!(
                    f,
                    "contact {contact_id} already has an active execution of workflow {workflow_id}"
                )
            }
            Self::SnapshotMissing {
                workflow_id,
                version,
            } => {
                write!(f, "no snapshot for workflow {workflow_id} version {version}")
            }
        }
    }
}

impl std::error::Error for StoreError {}

/// High-level errors from the execution engine and service boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// The workflow is not accepting entries.
    WorkflowNotActive { workflow_id: WorkflowId },
    /// The contact already has an active execution of this workflow.
    AlreadyEnrolled {
        workflow_id: WorkflowId,
        contact_id: ContactId,
    },
    /// The execution has already reached a terminal state.
    ExecutionNotActive { execution_id: ExecutionId },
    /// Graph validation or traversal failed.
    Graph(GraphError),
    /// Trigger configuration rejected.
    Trigger(TriggerError),
    /// Store operation failed.
    Store(StoreError),
    /// An external collaborator failed outside a step (e.g. audience lookup).
    Action(ActionError),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WorkflowNotActive { workflow_id } => {
                write!(f, "workflow {workflow_id} is not accepting entries")
            }
            Self::AlreadyEnrolled {
                workflow_id,
                contact_id,
            } => {
                write!(
                    f,
                    "contact {contact_id} is already enrolled in workflow {workflow_id}"
                )
            }
            Self::ExecutionNotActive { execution_id } => {
                write!(f, "execution {execution_id} is no longer active")
            }
            Self::Graph(e) => write!(f, "graph error: {e}"),
            Self::Trigger(e) => write!(f, "trigger error: {e}"),
            Self::Store(e) => write!(f, "store error: {e}"),
            Self::Action(e) => write!(f, "action error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<GraphError> for EngineError {
    fn from(e: GraphError) -> Self {
        Self::Graph(e)
    }
}

impl From<TriggerError> for EngineError {
    fn from(e: TriggerError) -> Self {
        Self::Trigger(e)
    }
}

impl From<ActionError> for EngineError {
    fn from(e: ActionError) -> Self {
        Self::Action(e)
    }
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::DuplicateActiveExecution {
                workflow_id,
                contact_id,
            } => Self::AlreadyEnrolled {
                workflow_id,
                contact_id,
            },
            other => Self::Store(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn graph_error_display() {
        let node_id = NodeId::new();
        let err = GraphError::NodeNotFound { node_id };
        assert!(err.to_string().contains("node not found"));
    }

    #[test]
    fn cycle_error_names_node() {
        let node_id = NodeId::new();
        let err = GraphError::CycleDetected { node_id };
        assert!(err.to_string().contains(&node_id.to_string()));
    }

    #[test]
    fn trigger_error_display() {
        let err = TriggerError::MissingField {
            kind: TriggerKind::TagAdded,
            field: "tag",
        };
        assert!(err.to_string().contains("'tag'"));
    }

    #[test]
    fn version_conflict_display() {
        let err = StoreError::VersionConflict {
            workflow_id: WorkflowId::new(),
            expected: 3,
            actual: 4,
        };
        assert!(err.to_string().contains("edited concurrently"));
    }

    #[test]
    fn duplicate_enrollment_converts_to_already_enrolled() {
        let workflow_id = WorkflowId::new();
        let contact_id = ContactId::new();
        let err: EngineError = StoreError::DuplicateActiveExecution {
            workflow_id,
            contact_id,
        }
        .into();
        assert!(matches!(err, EngineError::AlreadyEnrolled { .. }));
    }
}
