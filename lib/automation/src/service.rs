//! The transport-agnostic service boundary.
//!
//! `AutomationService` owns the stores and the engine and exposes the
//! operations the surrounding CRM drives: workflow CRUD and lifecycle,
//! structural edits, manual enrollment, event fan-out, and the periodic
//! sweep that resumes due waits and retries.
//!
//! Settings arrive as an explicit [`EngineSettings`] value; the service
//! holds no ambient global state.

use crate::actions::{ActionDispatcher, ContactDirectory};
use crate::builder;
use crate::editor;
use crate::engine::{Engine, RetryPolicy};
use crate::error::{EngineError, StoreError};
use crate::event::CrmEvent;
use crate::execution::{Execution, ExecutionStatus};
use crate::node::{BranchSide, Node, NodeId};
use crate::store::{ExecutionStore, WorkflowStore};
use crate::trigger::TriggerConfig;
use crate::workflow::{Workflow, WorkflowStats, WorkflowStatus};
use chrono::{DateTime, Utc};
use marketloop_core::{ContactId, ExecutionId, TenantId, WorkflowId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What happens to active executions when their workflow is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancellationPolicy {
    /// Active executions keep running against their snapshot until they
    /// finish on their own.
    #[default]
    Drain,
    /// Active executions are exited immediately.
    ForceExit,
}

/// Settings for the automation service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Retry policy for transient action failures.
    pub retry: RetryPolicy,
    /// Cancellation policy for workflow deletion.
    pub cancellation: CancellationPolicy,
}

/// A partial update to a workflow definition.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WorkflowUpdate {
    /// New name, if changing.
    pub name: Option<String>,
    /// New description, if changing.
    pub description: Option<String>,
    /// New trigger, if changing.
    pub trigger: Option<TriggerConfig>,
    /// New lifecycle status, if changing.
    pub status: Option<WorkflowStatus>,
    /// Full node-list replacement, if changing the graph.
    pub nodes: Option<Vec<Node>>,
}

/// The automation service boundary.
pub struct AutomationService<WS, ES, D, C> {
    workflows: Arc<WS>,
    executions: Arc<ES>,
    contacts: Arc<C>,
    engine: Engine<D, C>,
    settings: EngineSettings,
}

impl<WS, ES, D, C> AutomationService<WS, ES, D, C>
where
    WS: WorkflowStore,
    ES: ExecutionStore,
    D: ActionDispatcher,
    C: ContactDirectory,
{
    /// Creates a new service.
    pub fn new(
        workflows: Arc<WS>,
        executions: Arc<ES>,
        dispatcher: Arc<D>,
        contacts: Arc<C>,
        settings: EngineSettings,
    ) -> Self {
        let engine = Engine::new(dispatcher, Arc::clone(&contacts), settings.retry);
        Self {
            workflows,
            executions,
            contacts,
            engine,
            settings,
        }
    }

    /// Creates a draft workflow.
    ///
    /// # Errors
    ///
    /// Fails if the store rejects the insert.
    pub async fn create_workflow(
        &self,
        tenant_id: TenantId,
        name: impl Into<String>,
        description: Option<String>,
        trigger: TriggerConfig,
    ) -> Result<Workflow, EngineError> {
        let mut workflow = Workflow::new(tenant_id, name, trigger);
        workflow.description = description;

        self.workflows.insert(workflow.clone()).await?;
        info!(workflow_id = %workflow.id, %tenant_id, "workflow created");
        Ok(workflow)
    }

    /// Gets a workflow by ID.
    ///
    /// # Errors
    ///
    /// Fails if the workflow does not exist.
    pub async fn get_workflow(&self, workflow_id: WorkflowId) -> Result<Workflow, EngineError> {
        Ok(self.workflows.get(workflow_id).await?)
    }

    /// Applies a partial update, including full node-list replacement.
    ///
    /// The edit is validated before anything is written and committed with
    /// an optimistic version check; a concurrent edit surfaces as
    /// `StoreError::VersionConflict` and should be retried by the caller.
    ///
    /// # Errors
    ///
    /// Fails on validation errors, activation preconditions (when setting
    /// the status to active), or a version conflict.
    pub async fn update_workflow(
        &self,
        workflow_id: WorkflowId,
        update: WorkflowUpdate,
    ) -> Result<Workflow, EngineError> {
        let mut workflow = self.workflows.get(workflow_id).await?;
        let expected_version = workflow.version;

        if let Some(name) = update.name {
            workflow.name = name;
        }
        if let Some(description) = update.description {
            workflow.description = Some(description);
        }
        if let Some(trigger) = update.trigger {
            workflow.trigger = trigger;
        }
        if let Some(nodes) = update.nodes {
            workflow.graph = editor::replace_nodes(nodes)?;
        }
        if let Some(status) = update.status {
            if status == WorkflowStatus::Active {
                Self::check_activation(&workflow)?;
            }
            workflow.status = status;
        }

        let stored = self.workflows.update(workflow, expected_version).await?;
        info!(%workflow_id, version = stored.version, "workflow updated");
        Ok(stored)
    }

    /// Inserts a node after the given node (or as the new entry node).
    ///
    /// # Errors
    ///
    /// Fails on graph validation errors or a concurrent edit.
    pub async fn insert_node(
        &self,
        workflow_id: WorkflowId,
        node: Node,
        after: Option<NodeId>,
        branch: Option<BranchSide>,
    ) -> Result<Workflow, EngineError> {
        let mut workflow = self.workflows.get(workflow_id).await?;
        let expected_version = workflow.version;

        workflow.graph = editor::insert_node_after(&workflow.graph, node, after, branch)?;
        Ok(self.workflows.update(workflow, expected_version).await?)
    }

    /// Removes a node, relinking around it; a removed condition node
    /// discards its branch sub-chains.
    ///
    /// # Errors
    ///
    /// Fails on graph validation errors or a concurrent edit.
    pub async fn remove_node(
        &self,
        workflow_id: WorkflowId,
        node_id: NodeId,
    ) -> Result<Workflow, EngineError> {
        let mut workflow = self.workflows.get(workflow_id).await?;
        let expected_version = workflow.version;

        workflow.graph = editor::remove_node(&workflow.graph, node_id)?;
        Ok(self.workflows.update(workflow, expected_version).await?)
    }

    /// Activates a workflow so it accepts entries.
    ///
    /// # Errors
    ///
    /// Fails if the trigger config is invalid or the graph is malformed or
    /// empty.
    pub async fn activate_workflow(
        &self,
        workflow_id: WorkflowId,
    ) -> Result<Workflow, EngineError> {
        let workflow = self.workflows.get(workflow_id).await?;
        Self::check_activation(&workflow)?;

        let stored = self
            .workflows
            .set_status(workflow_id, WorkflowStatus::Active)
            .await?;
        info!(%workflow_id, "workflow activated");
        Ok(stored)
    }

    /// Pauses a workflow. New entries stop immediately; active executions
    /// drain.
    ///
    /// # Errors
    ///
    /// Fails if the workflow does not exist.
    pub async fn pause_workflow(&self, workflow_id: WorkflowId) -> Result<Workflow, EngineError> {
        let stored = self
            .workflows
            .set_status(workflow_id, WorkflowStatus::Paused)
            .await?;
        info!(%workflow_id, "workflow paused");
        Ok(stored)
    }

    /// Deletes a workflow and its nodes.
    ///
    /// New entries stop immediately. Active executions are handled per the
    /// configured [`CancellationPolicy`]: drained against their retained
    /// snapshots (default) or force-exited.
    ///
    /// # Errors
    ///
    /// Fails if the workflow does not exist.
    pub async fn delete_workflow(
        &self,
        workflow_id: WorkflowId,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        if self.settings.cancellation == CancellationPolicy::ForceExit {
            for mut execution in self.executions.list_for_workflow(workflow_id).await? {
                if execution.status == ExecutionStatus::Active {
                    execution.exit("workflow_deleted", now);
                    self.executions.update(execution).await?;
                }
            }
        }

        self.workflows.delete(workflow_id).await?;
        info!(%workflow_id, policy = ?self.settings.cancellation, "workflow deleted");
        Ok(())
    }

    /// Enrolls a contact into a workflow (the manual trigger path).
    ///
    /// The execution is created at the entry node, bound to the current
    /// graph version, and run until it suspends or terminates.
    ///
    /// # Errors
    ///
    /// Fails if the workflow is not active or the contact already has an
    /// active execution of it.
    pub async fn enroll(
        &self,
        workflow_id: WorkflowId,
        contact_id: ContactId,
        now: DateTime<Utc>,
    ) -> Result<Execution, EngineError> {
        let workflow = self.workflows.get(workflow_id).await?;
        let mut execution = self.engine.enroll(&workflow, contact_id, now)?;

        self.executions.insert(execution.clone()).await?;
        self.workflows.record_entry(workflow_id).await?;

        self.run_to_suspension(&mut execution, now).await?;
        Ok(execution)
    }

    /// Fans an inbound event out across the tenant's active workflows.
    ///
    /// Every active workflow whose trigger matches enrolls the event's
    /// contact; a contact already enrolled in a matching workflow is
    /// skipped, not duplicated.
    ///
    /// # Errors
    ///
    /// Fails on store errors; per-workflow enrollment rejections are
    /// absorbed.
    pub async fn handle_event(
        &self,
        event: &CrmEvent,
        now: DateTime<Utc>,
    ) -> Result<Vec<Execution>, EngineError> {
        let workflows = self.workflows.list_for_tenant(event.tenant_id).await?;
        let mut entered = Vec::new();

        for workflow in workflows {
            if !workflow.is_active() || !workflow.trigger.matches(&event.detail) {
                continue;
            }
            match self.enroll(workflow.id, event.contact_id, now).await {
                Ok(execution) => entered.push(execution),
                Err(EngineError::AlreadyEnrolled { workflow_id, contact_id }) => {
                    debug!(%workflow_id, %contact_id, "contact already enrolled, skipping");
                }
                Err(e) => return Err(e),
            }
        }

        Ok(entered)
    }

    /// Enrolls a schedule-triggered workflow's audience (called by the
    /// scheduler when the workflow's cron fires).
    ///
    /// The audience is the trigger's segment, or every tenant contact when
    /// no segment is configured. Contacts already enrolled are skipped.
    ///
    /// # Errors
    ///
    /// Fails if the workflow is not active or the audience lookup fails.
    pub async fn enroll_schedule_audience(
        &self,
        workflow_id: WorkflowId,
        now: DateTime<Utc>,
    ) -> Result<Vec<Execution>, EngineError> {
        let workflow = self.workflows.get(workflow_id).await?;
        if !workflow.is_active() {
            return Err(EngineError::WorkflowNotActive { workflow_id });
        }
        let TriggerConfig::Schedule { segment_id, .. } = workflow.trigger else {
            debug!(%workflow_id, "not schedule-triggered, nothing to enroll");
            return Ok(Vec::new());
        };

        let contacts = self
            .contacts
            .contacts_in_segment(workflow.tenant_id, segment_id)
            .await?;

        let mut entered = Vec::new();
        for contact_id in contacts {
            match self.enroll(workflow_id, contact_id, now).await {
                Ok(execution) => entered.push(execution),
                Err(EngineError::AlreadyEnrolled { .. }) => {}
                Err(e) => return Err(e),
            }
        }

        info!(%workflow_id, entered = entered.len(), "schedule fire enrolled audience");
        Ok(entered)
    }

    /// Terminates an execution early with a reason (e.g., the contact
    /// unsubscribed). Never decrements the workflow's entry counter.
    ///
    /// # Errors
    ///
    /// Fails if the execution does not exist or is already terminal.
    pub async fn exit_execution(
        &self,
        execution_id: ExecutionId,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<Execution, EngineError> {
        let mut execution = self.executions.get(execution_id).await?;
        if execution.is_terminal() {
            return Err(EngineError::ExecutionNotActive { execution_id });
        }

        execution.exit(reason, now);
        self.executions.update(execution.clone()).await?;
        info!(%execution_id, reason = execution.exit_reason.as_deref().unwrap_or(""), "execution exited");
        Ok(execution)
    }

    /// The scheduler sweep: advances every due execution (elapsed waits and
    /// retry backoffs).
    ///
    /// Failures of individual executions land in their status; the sweep
    /// keeps going.
    ///
    /// # Errors
    ///
    /// Fails only on store errors.
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<Vec<Execution>, EngineError> {
        let due = self.executions.due(now).await?;
        let mut advanced = Vec::new();

        for mut execution in due {
            self.run_to_suspension(&mut execution, now).await?;
            advanced.push(execution);
        }

        if !advanced.is_empty() {
            debug!(count = advanced.len(), "sweep advanced due executions");
        }
        Ok(advanced)
    }

    /// Computes aggregate statistics for a workflow.
    ///
    /// # Errors
    ///
    /// Fails if the workflow does not exist.
    pub async fn stats(&self, workflow_id: WorkflowId) -> Result<WorkflowStats, EngineError> {
        let workflow = self.workflows.get(workflow_id).await?;
        let executions = self.executions.list_for_workflow(workflow_id).await?;

        let count = |status: ExecutionStatus| {
            executions.iter().filter(|e| e.status == status).count() as u64
        };

        Ok(WorkflowStats {
            workflow_id,
            entry_count: workflow.entry_count,
            completion_count: workflow.completion_count,
            active_count: count(ExecutionStatus::Active),
            exited_count: count(ExecutionStatus::Exited),
            errored_count: count(ExecutionStatus::Error),
        })
    }

    /// Runs an execution against its bound snapshot and persists the result.
    async fn run_to_suspension(
        &self,
        execution: &mut Execution,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        let graph = self
            .workflows
            .snapshot(execution.workflow_id, execution.graph_version)
            .await?;

        self.engine.run(execution, &graph, now).await;

        if execution.status == ExecutionStatus::Completed {
            match self.workflows.record_completion(execution.workflow_id).await {
                Ok(()) => {}
                // The workflow was deleted while this execution drained.
                Err(StoreError::WorkflowNotFound { .. }) => {
                    warn!(
                        execution_id = %execution.id,
                        workflow_id = %execution.workflow_id,
                        "completed execution of a deleted workflow"
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }

        self.executions.update(execution.clone()).await?;
        Ok(())
    }

    /// Activation preconditions: a valid trigger and a well-formed,
    /// non-empty graph.
    fn check_activation(workflow: &Workflow) -> Result<(), EngineError> {
        workflow.trigger.validate()?;
        workflow.graph.validate()?;
        builder::find_entry_node(&workflow.graph)?;
        Ok(())
    }
}
