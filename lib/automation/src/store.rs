//! Workflow and execution persistence seams.
//!
//! The stores are async traits so the engine and service can be driven
//! against any backing storage; the in-memory implementations here back
//! tests and single-process deployments.
//!
//! Two guarantees live at this layer because they must be atomic with the
//! write that depends on them:
//! - `WorkflowStore::update` serializes concurrent structural edits per
//!   workflow with an optimistic version check.
//! - `ExecutionStore::insert` rejects a second active execution for the
//!   same (workflow, contact).
//!
//! Every committed workflow version keeps an immutable graph snapshot;
//! executions resolve the snapshot of the version they enrolled under, so
//! later edits never disturb them. Snapshots of a deleted workflow are
//! retained so draining executions can still finish.

use crate::error::StoreError;
use crate::execution::{Execution, ExecutionStatus};
use crate::graph::WorkflowGraph;
use crate::workflow::{Workflow, WorkflowStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use marketloop_core::{ContactId, ExecutionId, TenantId, WorkflowId};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Storage for workflow definitions and their graph snapshots.
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    /// Inserts a new workflow and records its first graph snapshot.
    async fn insert(&self, workflow: Workflow) -> Result<(), StoreError>;

    /// Gets a workflow by ID.
    async fn get(&self, workflow_id: WorkflowId) -> Result<Workflow, StoreError>;

    /// Lists all workflows of a tenant.
    async fn list_for_tenant(&self, tenant_id: TenantId) -> Result<Vec<Workflow>, StoreError>;

    /// Commits an edited workflow.
    ///
    /// The stored version must equal `expected_version`; on success the
    /// workflow is stored with the version bumped and a new graph snapshot
    /// recorded. Returns the stored workflow.
    async fn update(
        &self,
        workflow: Workflow,
        expected_version: u64,
    ) -> Result<Workflow, StoreError>;

    /// Changes a workflow's lifecycle status without bumping the version.
    async fn set_status(
        &self,
        workflow_id: WorkflowId,
        status: WorkflowStatus,
    ) -> Result<Workflow, StoreError>;

    /// Deletes a workflow and its nodes, retaining graph snapshots for
    /// executions still draining.
    async fn delete(&self, workflow_id: WorkflowId) -> Result<(), StoreError>;

    /// Resolves the immutable graph snapshot for a workflow version.
    async fn snapshot(
        &self,
        workflow_id: WorkflowId,
        version: u64,
    ) -> Result<Arc<WorkflowGraph>, StoreError>;

    /// Increments a workflow's entry counter.
    async fn record_entry(&self, workflow_id: WorkflowId) -> Result<(), StoreError>;

    /// Increments a workflow's completion counter.
    async fn record_completion(&self, workflow_id: WorkflowId) -> Result<(), StoreError>;
}

/// Storage for execution records.
#[async_trait]
pub trait ExecutionStore: Send + Sync {
    /// Inserts a new execution.
    ///
    /// Fails with `DuplicateActiveExecution` if the contact already has an
    /// active execution of the workflow; the check and the insert are
    /// atomic.
    async fn insert(&self, execution: Execution) -> Result<(), StoreError>;

    /// Gets an execution by ID.
    async fn get(&self, execution_id: ExecutionId) -> Result<Execution, StoreError>;

    /// Persists an updated execution.
    async fn update(&self, execution: Execution) -> Result<(), StoreError>;

    /// Finds the contact's active execution of a workflow, if any.
    async fn find_active(
        &self,
        workflow_id: WorkflowId,
        contact_id: ContactId,
    ) -> Result<Option<Execution>, StoreError>;

    /// Lists all executions of a workflow.
    async fn list_for_workflow(
        &self,
        workflow_id: WorkflowId,
    ) -> Result<Vec<Execution>, StoreError>;

    /// Lists active executions whose resume deadline has passed, plus any
    /// active executions with no deadline at all.
    async fn due(&self, now: DateTime<Utc>) -> Result<Vec<Execution>, StoreError>;
}

struct StoredWorkflow {
    workflow: Workflow,
    snapshots: HashMap<u64, Arc<WorkflowGraph>>,
}

#[derive(Default)]
struct WorkflowStoreState {
    workflows: HashMap<WorkflowId, StoredWorkflow>,
    /// Snapshots of deleted workflows, kept for draining executions.
    retired_snapshots: HashMap<WorkflowId, HashMap<u64, Arc<WorkflowGraph>>>,
}

/// In-memory workflow store.
#[derive(Default)]
pub struct MemoryWorkflowStore {
    state: RwLock<WorkflowStoreState>,
}

impl MemoryWorkflowStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkflowStore for MemoryWorkflowStore {
    async fn insert(&self, workflow: Workflow) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if state.workflows.contains_key(&workflow.id) {
            return Err(StoreError::WorkflowExists {
                workflow_id: workflow.id,
            });
        }

        let mut snapshots = HashMap::new();
        snapshots.insert(workflow.version, Arc::new(workflow.graph.clone()));
        state.workflows.insert(
            workflow.id,
            StoredWorkflow {
                workflow,
                snapshots,
            },
        );
        Ok(())
    }

    async fn get(&self, workflow_id: WorkflowId) -> Result<Workflow, StoreError> {
        let state = self.state.read().await;
        state
            .workflows
            .get(&workflow_id)
            .map(|stored| stored.workflow.clone())
            .ok_or(StoreError::WorkflowNotFound { workflow_id })
    }

    async fn list_for_tenant(&self, tenant_id: TenantId) -> Result<Vec<Workflow>, StoreError> {
        let state = self.state.read().await;
        let mut workflows: Vec<Workflow> = state
            .workflows
            .values()
            .filter(|stored| stored.workflow.tenant_id == tenant_id)
            .map(|stored| stored.workflow.clone())
            .collect();
        workflows.sort_by_key(|w| w.id);
        Ok(workflows)
    }

    async fn update(
        &self,
        workflow: Workflow,
        expected_version: u64,
    ) -> Result<Workflow, StoreError> {
        let mut state = self.state.write().await;
        let stored = state
            .workflows
            .get_mut(&workflow.id)
            .ok_or(StoreError::WorkflowNotFound {
                workflow_id: workflow.id,
            })?;

        if stored.workflow.version != expected_version {
            return Err(StoreError::VersionConflict {
                workflow_id: workflow.id,
                expected: expected_version,
                actual: stored.workflow.version,
            });
        }

        let mut workflow = workflow;
        workflow.version = expected_version + 1;
        // Counters are owned by the store; an edit never resets them.
        workflow.entry_count = stored.workflow.entry_count;
        workflow.completion_count = stored.workflow.completion_count;
        workflow.touch();

        stored
            .snapshots
            .insert(workflow.version, Arc::new(workflow.graph.clone()));
        stored.workflow = workflow.clone();
        Ok(workflow)
    }

    async fn set_status(
        &self,
        workflow_id: WorkflowId,
        status: WorkflowStatus,
    ) -> Result<Workflow, StoreError> {
        let mut state = self.state.write().await;
        let stored = state
            .workflows
            .get_mut(&workflow_id)
            .ok_or(StoreError::WorkflowNotFound { workflow_id })?;

        stored.workflow.status = status;
        stored.workflow.touch();
        Ok(stored.workflow.clone())
    }

    async fn delete(&self, workflow_id: WorkflowId) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let stored = state
            .workflows
            .remove(&workflow_id)
            .ok_or(StoreError::WorkflowNotFound { workflow_id })?;
        state
            .retired_snapshots
            .insert(workflow_id, stored.snapshots);
        Ok(())
    }

    async fn snapshot(
        &self,
        workflow_id: WorkflowId,
        version: u64,
    ) -> Result<Arc<WorkflowGraph>, StoreError> {
        let state = self.state.read().await;
        let snapshots = state
            .workflows
            .get(&workflow_id)
            .map(|stored| &stored.snapshots)
            .or_else(|| state.retired_snapshots.get(&workflow_id))
            .ok_or(StoreError::WorkflowNotFound { workflow_id })?;

        snapshots
            .get(&version)
            .cloned()
            .ok_or(StoreError::SnapshotMissing {
                workflow_id,
                version,
            })
    }

    async fn record_entry(&self, workflow_id: WorkflowId) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let stored = state
            .workflows
            .get_mut(&workflow_id)
            .ok_or(StoreError::WorkflowNotFound { workflow_id })?;
        stored.workflow.entry_count += 1;
        Ok(())
    }

    async fn record_completion(&self, workflow_id: WorkflowId) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let stored = state
            .workflows
            .get_mut(&workflow_id)
            .ok_or(StoreError::WorkflowNotFound { workflow_id })?;
        stored.workflow.completion_count += 1;
        Ok(())
    }
}

/// In-memory execution store.
#[derive(Default)]
pub struct MemoryExecutionStore {
    executions: RwLock<HashMap<ExecutionId, Execution>>,
}

impl MemoryExecutionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ExecutionStore for MemoryExecutionStore {
    async fn insert(&self, execution: Execution) -> Result<(), StoreError> {
        let mut executions = self.executions.write().await;

        // Checked under the same write lock as the insert, so two racing
        // enrollments cannot both pass.
        let duplicate = executions.values().any(|existing| {
            existing.workflow_id == execution.workflow_id
                && existing.contact_id == execution.contact_id
                && existing.status == ExecutionStatus::Active
        });
        if duplicate {
            return Err(StoreError::DuplicateActiveExecution {
                workflow_id: execution.workflow_id,
                contact_id: execution.contact_id,
            });
        }

        executions.insert(execution.id, execution);
        Ok(())
    }

    async fn get(&self, execution_id: ExecutionId) -> Result<Execution, StoreError> {
        let executions = self.executions.read().await;
        executions
            .get(&execution_id)
            .cloned()
            .ok_or(StoreError::ExecutionNotFound { execution_id })
    }

    async fn update(&self, execution: Execution) -> Result<(), StoreError> {
        let mut executions = self.executions.write().await;
        if !executions.contains_key(&execution.id) {
            return Err(StoreError::ExecutionNotFound {
                execution_id: execution.id,
            });
        }
        executions.insert(execution.id, execution);
        Ok(())
    }

    async fn find_active(
        &self,
        workflow_id: WorkflowId,
        contact_id: ContactId,
    ) -> Result<Option<Execution>, StoreError> {
        let executions = self.executions.read().await;
        Ok(executions
            .values()
            .find(|e| {
                e.workflow_id == workflow_id
                    && e.contact_id == contact_id
                    && e.status == ExecutionStatus::Active
            })
            .cloned())
    }

    async fn list_for_workflow(
        &self,
        workflow_id: WorkflowId,
    ) -> Result<Vec<Execution>, StoreError> {
        let executions = self.executions.read().await;
        let mut found: Vec<Execution> = executions
            .values()
            .filter(|e| e.workflow_id == workflow_id)
            .cloned()
            .collect();
        found.sort_by_key(|e| e.id);
        Ok(found)
    }

    async fn due(&self, now: DateTime<Utc>) -> Result<Vec<Execution>, StoreError> {
        let executions = self.executions.read().await;
        let mut due: Vec<Execution> = executions
            .values()
            .filter(|e| e.is_due(now))
            .cloned()
            .collect();
        due.sort_by_key(|e| e.id);
        Ok(due)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{Node, NodeConfig, NodeId, TagConfig};
    use crate::trigger::TriggerConfig;
    use chrono::Duration;

    fn workflow() -> Workflow {
        let node = Node::new(
            "Tag",
            NodeConfig::AddTag(TagConfig {
                tag: "lead".to_string(),
            }),
        );
        let graph = WorkflowGraph::from_nodes([node]).unwrap();
        Workflow::new(
            TenantId::new(),
            "Test",
            TriggerConfig::Manual,
        )
        .with_graph(graph)
    }

    fn execution(workflow_id: WorkflowId, contact_id: ContactId) -> Execution {
        Execution::new(
            workflow_id,
            TenantId::new(),
            1,
            contact_id,
            NodeId::new(),
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn insert_and_get_workflow() {
        let store = MemoryWorkflowStore::new();
        let workflow = workflow();
        let workflow_id = workflow.id;

        store.insert(workflow).await.unwrap();
        let fetched = store.get(workflow_id).await.unwrap();
        assert_eq!(fetched.id, workflow_id);
        assert_eq!(fetched.version, 1);
    }

    #[tokio::test]
    async fn duplicate_workflow_insert_rejected() {
        let store = MemoryWorkflowStore::new();
        let workflow = workflow();

        store.insert(workflow.clone()).await.unwrap();
        assert!(matches!(
            store.insert(workflow).await,
            Err(StoreError::WorkflowExists { .. })
        ));
    }

    #[tokio::test]
    async fn update_bumps_version_and_keeps_snapshots() {
        let store = MemoryWorkflowStore::new();
        let workflow = workflow();
        let workflow_id = workflow.id;
        store.insert(workflow.clone()).await.unwrap();

        let mut edited = workflow.clone();
        edited.name = "Renamed".to_string();
        let stored = store.update(edited, 1).await.unwrap();
        assert_eq!(stored.version, 2);

        // Both versions' snapshots resolve.
        assert!(store.snapshot(workflow_id, 1).await.is_ok());
        assert!(store.snapshot(workflow_id, 2).await.is_ok());
        assert!(matches!(
            store.snapshot(workflow_id, 3).await,
            Err(StoreError::SnapshotMissing { .. })
        ));
    }

    #[tokio::test]
    async fn stale_update_conflicts() {
        let store = MemoryWorkflowStore::new();
        let workflow = workflow();
        store.insert(workflow.clone()).await.unwrap();

        store.update(workflow.clone(), 1).await.unwrap();

        // A second editor still holding version 1 loses.
        let result = store.update(workflow, 1).await;
        assert!(matches!(
            result,
            Err(StoreError::VersionConflict {
                expected: 1,
                actual: 2,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn update_preserves_counters() {
        let store = MemoryWorkflowStore::new();
        let workflow = workflow();
        let workflow_id = workflow.id;
        store.insert(workflow.clone()).await.unwrap();
        store.record_entry(workflow_id).await.unwrap();
        store.record_completion(workflow_id).await.unwrap();

        let stored = store.update(workflow, 1).await.unwrap();
        assert_eq!(stored.entry_count, 1);
        assert_eq!(stored.completion_count, 1);
    }

    #[tokio::test]
    async fn delete_retains_snapshots_for_draining_executions() {
        let store = MemoryWorkflowStore::new();
        let workflow = workflow();
        let workflow_id = workflow.id;
        store.insert(workflow).await.unwrap();

        store.delete(workflow_id).await.unwrap();
        assert!(matches!(
            store.get(workflow_id).await,
            Err(StoreError::WorkflowNotFound { .. })
        ));
        assert!(store.snapshot(workflow_id, 1).await.is_ok());
    }

    #[tokio::test]
    async fn list_for_tenant_filters_by_owner() {
        let store = MemoryWorkflowStore::new();
        let workflow = workflow();
        let tenant_id = workflow.tenant_id;
        store.insert(workflow).await.unwrap();
        store.insert(self::workflow()).await.unwrap();

        let listed = store.list_for_tenant(tenant_id).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].tenant_id, tenant_id);
    }

    #[tokio::test]
    async fn second_active_execution_rejected() {
        let store = MemoryExecutionStore::new();
        let workflow_id = WorkflowId::new();
        let contact_id = ContactId::new();

        store
            .insert(execution(workflow_id, contact_id))
            .await
            .unwrap();
        let result = store.insert(execution(workflow_id, contact_id)).await;
        assert!(matches!(
            result,
            Err(StoreError::DuplicateActiveExecution { .. })
        ));
    }

    #[tokio::test]
    async fn reentry_allowed_after_terminal_execution() {
        let store = MemoryExecutionStore::new();
        let workflow_id = WorkflowId::new();
        let contact_id = ContactId::new();

        let mut first = execution(workflow_id, contact_id);
        first.complete(Utc::now());
        store.insert(first).await.unwrap();

        // The prior run is terminal, so a new enrollment is accepted.
        assert!(store.insert(execution(workflow_id, contact_id)).await.is_ok());
    }

    #[tokio::test]
    async fn due_returns_overdue_and_undeadlined_executions() {
        let store = MemoryExecutionStore::new();
        let now = Utc::now();
        let workflow_id = WorkflowId::new();

        let immediate = execution(workflow_id, ContactId::new());
        let immediate_id = immediate.id;
        store.insert(immediate).await.unwrap();

        let mut waiting = execution(workflow_id, ContactId::new());
        let waiting_id = waiting.id;
        waiting.suspend_until(now + Duration::hours(2));
        store.insert(waiting).await.unwrap();

        let mut overdue = execution(workflow_id, ContactId::new());
        let overdue_id = overdue.id;
        overdue.suspend_until(now - Duration::minutes(1));
        store.insert(overdue).await.unwrap();

        let due_ids: Vec<ExecutionId> = store
            .due(now)
            .await
            .unwrap()
            .iter()
            .map(|e| e.id)
            .collect();
        assert!(due_ids.contains(&immediate_id));
        assert!(due_ids.contains(&overdue_id));
        assert!(!due_ids.contains(&waiting_id));
    }

    #[tokio::test]
    async fn update_unknown_execution_fails() {
        let store = MemoryExecutionStore::new();
        let exec = execution(WorkflowId::new(), ContactId::new());
        assert!(matches!(
            store.update(exec).await,
            Err(StoreError::ExecutionNotFound { .. })
        ));
    }
}
