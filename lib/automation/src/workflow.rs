//! Workflow definition types.
//!
//! A workflow is a tenant-owned automation: one trigger, one node graph,
//! a lifecycle status, and aggregate counters. Structural edits bump the
//! version counter; executions bind to the graph snapshot of the version
//! they enrolled under, so edits never disturb runs already in flight.

use crate::graph::WorkflowGraph;
use crate::trigger::TriggerConfig;
use chrono::{DateTime, Utc};
use marketloop_core::{TenantId, WorkflowId};
use serde::{Deserialize, Serialize};

/// The lifecycle status of a workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    /// Being edited; not accepting entries.
    Draft,
    /// Accepting entries.
    Active,
    /// Temporarily not accepting entries; existing executions drain.
    Paused,
}

impl WorkflowStatus {
    /// Returns true if contacts may enter the workflow in this status.
    #[must_use]
    pub fn accepts_entries(&self) -> bool {
        matches!(self, Self::Active)
    }
}

/// A complete workflow definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    /// Unique identifier for this workflow.
    pub id: WorkflowId,
    /// The tenant owning this workflow.
    pub tenant_id: TenantId,
    /// Human-readable name.
    pub name: String,
    /// Description of what this workflow does.
    pub description: Option<String>,
    /// Lifecycle status.
    pub status: WorkflowStatus,
    /// The workflow's single trigger.
    pub trigger: TriggerConfig,
    /// The node graph.
    pub graph: WorkflowGraph,
    /// Monotonically increasing version, bumped by every structural edit.
    pub version: u64,
    /// Number of executions ever created; never decremented.
    pub entry_count: u64,
    /// Number of executions that reached the completed state.
    pub completion_count: u64,
    /// When this workflow was created.
    pub created_at: DateTime<Utc>,
    /// When this workflow was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Workflow {
    /// Creates a new draft workflow with an empty graph.
    #[must_use]
    pub fn new(tenant_id: TenantId, name: impl Into<String>, trigger: TriggerConfig) -> Self {
        let now = Utc::now();
        Self {
            id: WorkflowId::new(),
            tenant_id,
            name: name.into(),
            description: None,
            status: WorkflowStatus::Draft,
            trigger,
            graph: WorkflowGraph::new(),
            version: 1,
            entry_count: 0,
            completion_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the graph.
    #[must_use]
    pub fn with_graph(mut self, graph: WorkflowGraph) -> Self {
        self.graph = graph;
        self
    }

    /// Returns true if the workflow accepts new entries.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status.accepts_entries()
    }

    /// Marks the workflow as updated (bumps the updated_at timestamp).
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Aggregate statistics for a workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowStats {
    /// The workflow described.
    pub workflow_id: WorkflowId,
    /// Executions ever created.
    pub entry_count: u64,
    /// Executions that completed.
    pub completion_count: u64,
    /// Executions currently active.
    pub active_count: u64,
    /// Executions exited early.
    pub exited_count: u64,
    /// Executions that terminated with an error.
    pub errored_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft_workflow() -> Workflow {
        Workflow::new(
            TenantId::new(),
            "Lead nurture",
            TriggerConfig::TagAdded {
                tag: "lead".to_string(),
            },
        )
    }

    #[test]
    fn new_workflow_is_draft() {
        let workflow = draft_workflow();
        assert_eq!(workflow.status, WorkflowStatus::Draft);
        assert_eq!(workflow.version, 1);
        assert!(!workflow.is_active());
        assert!(workflow.graph.is_empty());
    }

    #[test]
    fn only_active_accepts_entries() {
        assert!(!WorkflowStatus::Draft.accepts_entries());
        assert!(WorkflowStatus::Active.accepts_entries());
        assert!(!WorkflowStatus::Paused.accepts_entries());
    }

    #[test]
    fn builder_sets_description() {
        let workflow = draft_workflow().with_description("Nurtures new leads");
        assert_eq!(workflow.description.as_deref(), Some("Nurtures new leads"));
    }

    #[test]
    fn workflow_serde_roundtrip() {
        let workflow = draft_workflow();
        let json = serde_json::to_string(&workflow).expect("serialize");
        let parsed: Workflow = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(workflow.id, parsed.id);
        assert_eq!(workflow.trigger, parsed.trigger);
    }
}
