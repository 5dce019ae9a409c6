//! The per-contact execution engine.
//!
//! The engine walks one execution through its workflow's graph snapshot:
//! actions are dispatched to external collaborators, waits suspend the
//! execution on a persisted deadline, conditions pick a branch from contact
//! state, and end nodes (or running off the end of a chain) complete the
//! run.
//!
//! Failures never escape as panics or errors from `run`: action failures
//! are retried on a persisted backoff deadline up to a bounded attempt
//! count, then land in the execution's terminal `Error` status; a traversal
//! revisit is fatal to the one execution only.
//!
//! All suspension state lives on the execution record, so a restarted
//! process resumes exactly where the polling sweep left off.

use crate::actions::{ActionDispatcher, ActionError, ActionOutcome, ContactDirectory};
use crate::builder;
use crate::error::{EngineError, GraphError};
use crate::execution::{Execution, ExecutionStatus, StepStatus};
use crate::graph::WorkflowGraph;
use crate::node::{BranchSide, Node, NodeConfig};
use crate::workflow::Workflow;
use chrono::{DateTime, Utc};
use marketloop_core::{ContactId, TenantId};
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Bounded retry policy for transient action failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum total attempts at one node, including the first.
    pub max_attempts: u32,
    /// Base delay for exponential backoff between attempts, in seconds.
    pub base_delay_secs: u64,
}

impl RetryPolicy {
    /// Returns the backoff delay after the given failed attempt count.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> chrono::Duration {
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        let secs = self.base_delay_secs.saturating_mul(factor);
        chrono::Duration::seconds(secs.min(i64::MAX as u64) as i64)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_secs: 300,
        }
    }
}

/// The workflow execution engine.
///
/// Pure state machine over execution records; persistence is the caller's
/// concern.
pub struct Engine<D, C> {
    dispatcher: Arc<D>,
    contacts: Arc<C>,
    retry: RetryPolicy,
}

impl<D, C> Engine<D, C>
where
    D: ActionDispatcher,
    C: ContactDirectory,
{
    /// Creates a new engine.
    pub fn new(dispatcher: Arc<D>, contacts: Arc<C>, retry: RetryPolicy) -> Self {
        Self {
            dispatcher,
            contacts,
            retry,
        }
    }

    /// Creates an execution for a contact entering the workflow.
    ///
    /// The execution binds to the workflow's current graph version and is
    /// positioned at the entry node. Duplicate-enrollment rejection is
    /// enforced by the execution store on insert.
    ///
    /// # Errors
    ///
    /// Fails if the workflow is not accepting entries or its graph has no
    /// unique entry node.
    pub fn enroll(
        &self,
        workflow: &Workflow,
        contact_id: ContactId,
        now: DateTime<Utc>,
    ) -> Result<Execution, EngineError> {
        if !workflow.is_active() {
            return Err(EngineError::WorkflowNotActive {
                workflow_id: workflow.id,
            });
        }
        let entry = builder::find_entry_node(&workflow.graph)?;

        debug!(workflow_id = %workflow.id, %contact_id, "contact entering workflow");
        Ok(Execution::new(
            workflow.id,
            workflow.tenant_id,
            workflow.version,
            contact_id,
            entry.id,
            now,
        ))
    }

    /// Advances an execution as far as it can go at the given time.
    ///
    /// Stops when the execution suspends on a wait or retry deadline, or
    /// reaches a terminal status. Failures are recorded on the execution;
    /// this method never panics on a malformed snapshot.
    pub async fn run(&self, execution: &mut Execution, graph: &WorkflowGraph, now: DateTime<Utc>) {
        let tenant_id = execution.tenant_id;
        let mut visited = HashSet::new();

        while execution.status == ExecutionStatus::Active {
            if let Some(resume_at) = execution.resume_at {
                if resume_at > now {
                    break;
                }
            }

            let Some(node_id) = execution.current_node_id else {
                execution.complete(now);
                break;
            };

            if !visited.insert(node_id) {
                let reason = GraphError::CycleDetected { node_id }.to_string();
                warn!(execution_id = %execution.id, %node_id, "traversal revisited a node");
                execution.fail(reason);
                break;
            }

            let Some(node) = graph.get(node_id) else {
                let reason = GraphError::NodeNotFound { node_id }.to_string();
                warn!(execution_id = %execution.id, %node_id, "snapshot is missing a node");
                execution.fail(reason);
                break;
            };

            match &node.config {
                NodeConfig::Wait(config) => {
                    if execution.resume_at.is_some() {
                        // The deadline passed; the wait resumes like any step.
                        execution.record_step(
                            node,
                            StepStatus::Completed,
                            now,
                            json!({ "waited": config.delay }),
                        );
                        execution.advance_to(node.next_node_id);
                    } else {
                        let resume_at = now + config.delay.to_duration();
                        execution.suspend_until(resume_at);
                        debug!(
                            execution_id = %execution.id,
                            %node_id,
                            %resume_at,
                            "execution suspended on wait"
                        );
                        break;
                    }
                }
                NodeConfig::Condition(config) => {
                    let (side, metadata) = self
                        .pick_branch(tenant_id, execution.contact_id, config)
                        .await;
                    execution.record_step(node, StepStatus::Completed, now, metadata);
                    execution.advance_to(node.branch_head(side));
                }
                NodeConfig::End => {
                    execution.complete(now);
                    debug!(execution_id = %execution.id, "execution completed");
                }
                _ => {
                    self.perform_action(execution, node, tenant_id, now).await;
                }
            }
        }
    }

    /// Evaluates a condition node's predicate against contact state.
    ///
    /// Missing data and lookup failures default to the false branch.
    async fn pick_branch(
        &self,
        tenant_id: TenantId,
        contact_id: ContactId,
        config: &crate::node::ConditionConfig,
    ) -> (BranchSide, JsonValue) {
        match self.contacts.snapshot(tenant_id, contact_id).await {
            Ok(snapshot) => match config.predicate.evaluate(&snapshot) {
                Some(true) => (BranchSide::True, json!({ "branch": "true" })),
                Some(false) => (BranchSide::False, json!({ "branch": "false" })),
                None => (
                    BranchSide::False,
                    json!({ "branch": "false", "missing_field": config.predicate.field }),
                ),
            },
            Err(e) => {
                warn!(%contact_id, error = %e, "condition evaluation failed");
                (
                    BranchSide::False,
                    json!({ "branch": "false", "evaluation_error": e.message() }),
                )
            }
        }
    }

    /// Dispatches an action node and applies the retry policy to failures.
    async fn perform_action(
        &self,
        execution: &mut Execution,
        node: &Node,
        tenant_id: TenantId,
        now: DateTime<Utc>,
    ) {
        match self.dispatch(tenant_id, execution.contact_id, node).await {
            Ok(outcome) => {
                let metadata = if execution.attempt > 0 {
                    json!({ "attempts": execution.attempt + 1 })
                } else {
                    JsonValue::Null
                };
                let status = match outcome {
                    ActionOutcome::Performed => StepStatus::Completed,
                    ActionOutcome::Skipped => StepStatus::Skipped,
                };
                execution.record_step(node, status, now, metadata);
                execution.advance_to(node.next_node_id);
            }
            Err(ActionError::Permanent { message }) => {
                warn!(
                    execution_id = %execution.id,
                    node_id = %node.id,
                    error = %message,
                    "action failed permanently"
                );
                execution.record_step(
                    node,
                    StepStatus::Error,
                    now,
                    json!({ "error": message.clone() }),
                );
                execution.fail(message);
            }
            Err(ActionError::Transient { message }) => {
                let attempt = execution.attempt + 1;
                if attempt >= self.retry.max_attempts {
                    warn!(
                        execution_id = %execution.id,
                        node_id = %node.id,
                        attempt,
                        error = %message,
                        "action retries exhausted"
                    );
                    execution.record_step(
                        node,
                        StepStatus::Error,
                        now,
                        json!({ "error": message.clone(), "attempts": attempt }),
                    );
                    execution.fail(message);
                } else {
                    let resume_at = now + self.retry.backoff(attempt);
                    execution.attempt = attempt;
                    execution.suspend_until(resume_at);
                    warn!(
                        execution_id = %execution.id,
                        node_id = %node.id,
                        attempt,
                        max_attempts = self.retry.max_attempts,
                        %resume_at,
                        error = %message,
                        "transient action failure, retry scheduled"
                    );
                }
            }
        }
    }

    /// Routes an action node to the matching dispatcher call.
    async fn dispatch(
        &self,
        tenant_id: TenantId,
        contact_id: ContactId,
        node: &Node,
    ) -> Result<ActionOutcome, ActionError> {
        match &node.config {
            NodeConfig::SendEmail(config) => {
                self.dispatcher.send_email(tenant_id, contact_id, config).await
            }
            NodeConfig::SendSms(config) => {
                self.dispatcher.send_sms(tenant_id, contact_id, config).await
            }
            NodeConfig::AddTag(config) => {
                self.dispatcher.add_tag(tenant_id, contact_id, &config.tag).await
            }
            NodeConfig::RemoveTag(config) => {
                self.dispatcher
                    .remove_tag(tenant_id, contact_id, &config.tag)
                    .await
            }
            NodeConfig::UpdateField(config) => {
                self.dispatcher
                    .update_field(tenant_id, contact_id, config)
                    .await
            }
            NodeConfig::NotifyUser(config) => {
                self.dispatcher
                    .notify_user(tenant_id, contact_id, config.user_id, &config.message)
                    .await
            }
            NodeConfig::Handoff(config) => {
                self.dispatcher.handoff(tenant_id, contact_id, config).await
            }
            // Wait, condition, and end are handled by the run loop.
            NodeConfig::Wait(_) | NodeConfig::Condition(_) | NodeConfig::End => {
                Ok(ActionOutcome::Skipped)
            }
        }
    }
}
