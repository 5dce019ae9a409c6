//! Per-contact execution state.
//!
//! An execution is the runtime record of one contact's progress through one
//! workflow. It binds to the graph snapshot version captured at enrollment,
//! carries the suspension state needed for a restartable polling engine
//! (`resume_at`, `attempt`), and accumulates an append-only step history.
//! Once the status leaves `Active` the record is immutable.

use crate::node::{Node, NodeId};
use chrono::{DateTime, Utc};
use marketloop_core::{ContactId, ExecutionId, TenantId, WorkflowId};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// The status of an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Walking the graph or suspended on a wait step.
    Active,
    /// Reached an end node or the end of a chain.
    Completed,
    /// Terminated early by an external signal.
    Exited,
    /// Terminated by an unrecoverable failure.
    Error,
}

impl ExecutionStatus {
    /// Returns true if this is a terminal status.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Exited | Self::Error)
    }
}

/// Outcome of a single step in the step history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// The step ran.
    Completed,
    /// The step was skipped (e.g., the action did not apply to the contact).
    Skipped,
    /// The step failed.
    Error,
}

/// One entry in an execution's append-only step history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    /// The node that was stepped.
    pub node_id: NodeId,
    /// The node's name at the time of the step.
    pub node_name: String,
    /// The step outcome.
    pub status: StepStatus,
    /// When the step was recorded.
    pub timestamp: DateTime<Utc>,
    /// Step-specific detail (taken branch, attempts, error text).
    pub metadata: JsonValue,
}

/// The runtime record of one contact's progress through one workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    /// Unique identifier for this execution.
    pub id: ExecutionId,
    /// The workflow being executed.
    pub workflow_id: WorkflowId,
    /// The tenant owning the workflow, carried so actions can still be
    /// dispatched while draining after the workflow is deleted.
    pub tenant_id: TenantId,
    /// The graph snapshot version this execution is bound to.
    pub graph_version: u64,
    /// The contact walking the workflow.
    pub contact_id: ContactId,
    /// The node to step next; `None` once terminal.
    pub current_node_id: Option<NodeId>,
    /// Current status.
    pub status: ExecutionStatus,
    /// When the contact entered the workflow.
    pub entered_at: DateTime<Utc>,
    /// When the execution completed, if it did.
    pub completed_at: Option<DateTime<Utc>>,
    /// When the execution exited early, if it did.
    pub exited_at: Option<DateTime<Utc>>,
    /// Why the execution exited early, if it did.
    pub exit_reason: Option<String>,
    /// The failure that terminated the execution, if any.
    pub error: Option<String>,
    /// When the execution becomes due again (wait deadline or retry backoff).
    pub resume_at: Option<DateTime<Utc>>,
    /// Failed attempts at the current node.
    pub attempt: u32,
    /// Append-only audit log of per-node outcomes.
    pub step_history: Vec<StepRecord>,
}

impl Execution {
    /// Creates a new active execution positioned at the entry node.
    #[must_use]
    pub fn new(
        workflow_id: WorkflowId,
        tenant_id: TenantId,
        graph_version: u64,
        contact_id: ContactId,
        entry_node_id: NodeId,
        entered_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ExecutionId::new(),
            workflow_id,
            tenant_id,
            graph_version,
            contact_id,
            current_node_id: Some(entry_node_id),
            status: ExecutionStatus::Active,
            entered_at,
            completed_at: None,
            exited_at: None,
            exit_reason: None,
            error: None,
            resume_at: None,
            attempt: 0,
            step_history: Vec::new(),
        }
    }

    /// Returns true if the execution has reached a terminal status.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Returns true if the execution should be advanced at the given time.
    ///
    /// An active execution with no resume deadline is immediately due.
    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == ExecutionStatus::Active
            && self.resume_at.is_none_or(|resume_at| resume_at <= now)
    }

    /// Appends a step history entry for the given node.
    pub fn record_step(
        &mut self,
        node: &Node,
        status: StepStatus,
        timestamp: DateTime<Utc>,
        metadata: JsonValue,
    ) {
        self.step_history.push(StepRecord {
            node_id: node.id,
            node_name: node.name.clone(),
            status,
            timestamp,
            metadata,
        });
    }

    /// Moves the cursor to the given node, clearing suspension state.
    pub fn advance_to(&mut self, node_id: Option<NodeId>) {
        self.current_node_id = node_id;
        self.resume_at = None;
        self.attempt = 0;
    }

    /// Suspends the execution until the given time.
    pub fn suspend_until(&mut self, resume_at: DateTime<Utc>) {
        self.resume_at = Some(resume_at);
    }

    /// Marks the execution as completed.
    pub fn complete(&mut self, now: DateTime<Utc>) {
        self.status = ExecutionStatus::Completed;
        self.completed_at = Some(now);
        self.current_node_id = None;
        self.resume_at = None;
    }

    /// Terminates the execution early with a reason.
    pub fn exit(&mut self, reason: impl Into<String>, now: DateTime<Utc>) {
        self.status = ExecutionStatus::Exited;
        self.exited_at = Some(now);
        self.exit_reason = Some(reason.into());
        self.current_node_id = None;
        self.resume_at = None;
    }

    /// Terminates the execution with an error.
    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = ExecutionStatus::Error;
        self.error = Some(error.into());
        self.current_node_id = None;
        self.resume_at = None;
    }
}
