//! Next-fire bookkeeping for schedule-triggered workflows.
//!
//! A [`ScheduleBook`] holds one entry per active schedule-triggered
//! workflow. The periodic sweep asks for the entries that are due and the
//! book advances each one strictly past `now`, so a fire instant is never
//! observed twice.

use crate::error::ScheduleError;
use crate::schedule::CronSchedule;
use chrono::{DateTime, Duration, Utc};
use marketloop_automation::actions::{ActionDispatcher, ContactDirectory};
use marketloop_automation::store::{ExecutionStore, WorkflowStore};
use marketloop_automation::{AutomationService, Execution};
use marketloop_core::WorkflowId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

/// What to do with a fire that was due while the process was down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissedFireBehavior {
    /// Skip the stale fire and wait for the next occurrence.
    #[default]
    Skip,
    /// Deliver one catch-up fire on the next sweep.
    RunImmediately,
}

/// One tracked schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    /// The workflow fired by this schedule.
    pub workflow_id: WorkflowId,
    /// The schedule itself.
    pub schedule: CronSchedule,
    /// The next instant this schedule fires.
    pub next_fire: DateTime<Utc>,
}

/// Tracks next-fire instants for active schedule-triggered workflows.
pub struct ScheduleBook {
    entries: HashMap<WorkflowId, ScheduleEntry>,
    missed: MissedFireBehavior,
    /// How far past its instant a fire may be and still count as on time.
    missed_threshold: Duration,
}

impl ScheduleBook {
    /// Creates an empty book with the default missed-fire behavior.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            missed: MissedFireBehavior::default(),
            missed_threshold: Duration::hours(1),
        }
    }

    /// Sets the missed-fire behavior.
    #[must_use]
    pub fn with_missed_behavior(mut self, missed: MissedFireBehavior) -> Self {
        self.missed = missed;
        self
    }

    /// Sets the staleness threshold for missed-fire detection.
    #[must_use]
    pub fn with_missed_threshold(mut self, threshold: Duration) -> Self {
        self.missed_threshold = threshold;
        self
    }

    /// Starts tracking a workflow's schedule from the given time.
    ///
    /// # Errors
    ///
    /// Fails if the expression does not parse or never fires.
    pub fn track(
        &mut self,
        workflow_id: WorkflowId,
        schedule: CronSchedule,
        now: DateTime<Utc>,
    ) -> Result<(), ScheduleError> {
        let next_fire = schedule.next_after(now)?;
        debug!(%workflow_id, %next_fire, "schedule tracked");
        self.entries.insert(
            workflow_id,
            ScheduleEntry {
                workflow_id,
                schedule,
                next_fire,
            },
        );
        Ok(())
    }

    /// Stops tracking a workflow (paused or deleted).
    pub fn untrack(&mut self, workflow_id: WorkflowId) {
        self.entries.remove(&workflow_id);
    }

    /// Returns the next fire instant for a workflow, if tracked.
    #[must_use]
    pub fn next_fire(&self, workflow_id: WorkflowId) -> Option<DateTime<Utc>> {
        self.entries.get(&workflow_id).map(|e| e.next_fire)
    }

    /// Returns the number of tracked schedules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no schedules are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the workflows whose schedules fire at or before `now`, and
    /// advances every due entry strictly past `now`.
    ///
    /// A fire older than the staleness threshold counts as missed and is
    /// delivered or skipped per the configured [`MissedFireBehavior`]; in
    /// both cases the entry advances, so no instant fires twice.
    pub fn due(&mut self, now: DateTime<Utc>) -> Vec<WorkflowId> {
        let mut fired = Vec::new();
        let mut broken = Vec::new();

        for entry in self.entries.values_mut() {
            if entry.next_fire > now {
                continue;
            }

            let stale = now - entry.next_fire > self.missed_threshold;
            if stale && self.missed == MissedFireBehavior::Skip {
                warn!(
                    workflow_id = %entry.workflow_id,
                    missed = %entry.next_fire,
                    "skipping missed schedule fire"
                );
            } else {
                fired.push(entry.workflow_id);
            }

            match entry.schedule.next_after(now) {
                Ok(next_fire) => entry.next_fire = next_fire,
                Err(e) => {
                    warn!(workflow_id = %entry.workflow_id, error = %e, "schedule untracked");
                    broken.push(entry.workflow_id);
                }
            }
        }

        for workflow_id in broken {
            self.entries.remove(&workflow_id);
        }

        fired.sort();
        fired
    }
}

impl Default for ScheduleBook {
    fn default() -> Self {
        Self::new()
    }
}

/// Fires every due schedule through the automation service, enrolling each
/// workflow's audience.
///
/// Per-workflow enrollment failures are logged and do not stop the sweep.
pub async fn fire_due<WS, ES, D, C>(
    book: &mut ScheduleBook,
    service: &AutomationService<WS, ES, D, C>,
    now: DateTime<Utc>,
) -> Vec<Execution>
where
    WS: WorkflowStore,
    ES: ExecutionStore,
    D: ActionDispatcher,
    C: ContactDirectory,
{
    let mut entered = Vec::new();

    for workflow_id in book.due(now) {
        match service.enroll_schedule_audience(workflow_id, now).await {
            Ok(executions) => entered.extend(executions),
            Err(e) => {
                warn!(%workflow_id, error = %e, "schedule fire failed");
            }
        }
    }

    entered
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use marketloop_automation::actions::{ActionError, ActionOutcome, ContactSnapshot};
    use marketloop_automation::node::{
        HandoffConfig, Node, NodeConfig, SendEmailConfig, SendSmsConfig, TagConfig,
        UpdateFieldConfig,
    };
    use marketloop_automation::store::{MemoryExecutionStore, MemoryWorkflowStore};
    use marketloop_automation::{
        EngineSettings, ExecutionStatus, TriggerConfig, WorkflowUpdate,
    };
    use marketloop_core::{ContactId, SegmentId, TenantId, UserId};
    use std::sync::Arc;
    use std::sync::Mutex;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 1, hour, 0, 0).unwrap()
    }

    #[test]
    fn track_computes_next_fire() {
        let mut book = ScheduleBook::new();
        let workflow_id = WorkflowId::new();

        book.track(workflow_id, CronSchedule::new("0 9 * * *"), at(0))
            .unwrap();
        assert_eq!(book.next_fire(workflow_id), Some(at(9)));
        assert_eq!(book.len(), 1);
    }

    #[test]
    fn track_rejects_bad_expression() {
        let mut book = ScheduleBook::new();
        let result = book.track(WorkflowId::new(), CronSchedule::new("bogus"), at(0));
        assert!(result.is_err());
        assert!(book.is_empty());
    }

    #[test]
    fn nothing_due_before_the_fire_instant() {
        let mut book = ScheduleBook::new();
        let workflow_id = WorkflowId::new();
        book.track(workflow_id, CronSchedule::new("0 9 * * *"), at(0))
            .unwrap();

        assert!(book.due(at(8)).is_empty());
        assert_eq!(book.next_fire(workflow_id), Some(at(9)));
    }

    #[test]
    fn due_fires_once_and_advances() {
        let mut book = ScheduleBook::new();
        let workflow_id = WorkflowId::new();
        book.track(workflow_id, CronSchedule::new("0 9 * * *"), at(0))
            .unwrap();

        let fired = book.due(at(9));
        assert_eq!(fired, vec![workflow_id]);

        // Advanced to the next day; the same sweep time fires nothing more.
        assert_eq!(
            book.next_fire(workflow_id),
            Some(Utc.with_ymd_and_hms(2026, 8, 2, 9, 0, 0).unwrap())
        );
        assert!(book.due(at(9)).is_empty());
    }

    #[test]
    fn stale_fire_is_skipped_by_default() {
        let mut book = ScheduleBook::new();
        let workflow_id = WorkflowId::new();
        book.track(workflow_id, CronSchedule::new("0 9 * * *"), at(0))
            .unwrap();

        // The sweep comes back five hours late.
        let fired = book.due(at(14));
        assert!(fired.is_empty());

        // Still advanced past now, so the miss is not redelivered.
        assert_eq!(
            book.next_fire(workflow_id),
            Some(Utc.with_ymd_and_hms(2026, 8, 2, 9, 0, 0).unwrap())
        );
    }

    #[test]
    fn stale_fire_runs_immediately_when_configured() {
        let mut book =
            ScheduleBook::new().with_missed_behavior(MissedFireBehavior::RunImmediately);
        let workflow_id = WorkflowId::new();
        book.track(workflow_id, CronSchedule::new("0 9 * * *"), at(0))
            .unwrap();

        let fired = book.due(at(14));
        assert_eq!(fired, vec![workflow_id]);
        // One catch-up fire only.
        assert!(book.due(at(14)).is_empty());
    }

    #[test]
    fn untrack_stops_firing() {
        let mut book = ScheduleBook::new();
        let workflow_id = WorkflowId::new();
        book.track(workflow_id, CronSchedule::new("0 9 * * *"), at(0))
            .unwrap();

        book.untrack(workflow_id);
        assert!(book.due(at(9)).is_empty());
        assert!(book.is_empty());
    }

    struct OkDispatcher {
        tags: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ActionDispatcher for OkDispatcher {
        async fn send_email(
            &self,
            _tenant_id: TenantId,
            _contact_id: ContactId,
            _config: &SendEmailConfig,
        ) -> Result<ActionOutcome, ActionError> {
            Ok(ActionOutcome::Performed)
        }

        async fn send_sms(
            &self,
            _tenant_id: TenantId,
            _contact_id: ContactId,
            _config: &SendSmsConfig,
        ) -> Result<ActionOutcome, ActionError> {
            Ok(ActionOutcome::Performed)
        }

        async fn add_tag(
            &self,
            _tenant_id: TenantId,
            _contact_id: ContactId,
            tag: &str,
        ) -> Result<ActionOutcome, ActionError> {
            self.tags.lock().unwrap().push(tag.to_string());
            Ok(ActionOutcome::Performed)
        }

        async fn remove_tag(
            &self,
            _tenant_id: TenantId,
            _contact_id: ContactId,
            _tag: &str,
        ) -> Result<ActionOutcome, ActionError> {
            Ok(ActionOutcome::Performed)
        }

        async fn update_field(
            &self,
            _tenant_id: TenantId,
            _contact_id: ContactId,
            _config: &UpdateFieldConfig,
        ) -> Result<ActionOutcome, ActionError> {
            Ok(ActionOutcome::Performed)
        }

        async fn notify_user(
            &self,
            _tenant_id: TenantId,
            _contact_id: ContactId,
            _user_id: UserId,
            _message: &str,
        ) -> Result<ActionOutcome, ActionError> {
            Ok(ActionOutcome::Performed)
        }

        async fn handoff(
            &self,
            _tenant_id: TenantId,
            _contact_id: ContactId,
            _config: &HandoffConfig,
        ) -> Result<ActionOutcome, ActionError> {
            Ok(ActionOutcome::Performed)
        }
    }

    struct SegmentDirectory {
        contacts: Vec<ContactId>,
    }

    #[async_trait]
    impl ContactDirectory for SegmentDirectory {
        async fn snapshot(
            &self,
            _tenant_id: TenantId,
            _contact_id: ContactId,
        ) -> Result<ContactSnapshot, ActionError> {
            Ok(ContactSnapshot::new())
        }

        async fn contacts_in_segment(
            &self,
            _tenant_id: TenantId,
            _segment_id: Option<SegmentId>,
        ) -> Result<Vec<ContactId>, ActionError> {
            Ok(self.contacts.clone())
        }
    }

    #[tokio::test]
    async fn fire_due_enrolls_the_audience_through_the_service() {
        let dispatcher = Arc::new(OkDispatcher {
            tags: Mutex::new(Vec::new()),
        });
        let contacts = vec![ContactId::new(), ContactId::new()];
        let directory = Arc::new(SegmentDirectory {
            contacts: contacts.clone(),
        });
        let service = AutomationService::new(
            Arc::new(MemoryWorkflowStore::new()),
            Arc::new(MemoryExecutionStore::new()),
            Arc::clone(&dispatcher),
            directory,
            EngineSettings::default(),
        );

        let workflow = service
            .create_workflow(
                TenantId::new(),
                "Weekly digest",
                None,
                TriggerConfig::Schedule {
                    cron: "0 9 * * *".to_string(),
                    timezone: None,
                    segment_id: Some(SegmentId::new()),
                },
            )
            .await
            .unwrap();
        service
            .update_workflow(
                workflow.id,
                WorkflowUpdate {
                    nodes: Some(vec![Node::new(
                        "Tag digest",
                        NodeConfig::AddTag(TagConfig {
                            tag: "digest-sent".to_string(),
                        }),
                    )]),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        service.activate_workflow(workflow.id).await.unwrap();

        let mut book = ScheduleBook::new();
        book.track(workflow.id, CronSchedule::new("0 9 * * *"), at(0))
            .unwrap();

        // Nothing fires before nine.
        assert!(fire_due(&mut book, &service, at(8)).await.is_empty());

        let entered = fire_due(&mut book, &service, at(9)).await;
        assert_eq!(entered.len(), 2);
        assert!(entered.iter().all(|e| e.status == ExecutionStatus::Completed));
        assert_eq!(dispatcher.tags.lock().unwrap().len(), 2);

        // The same instant never fires twice.
        assert!(fire_due(&mut book, &service, at(9)).await.is_empty());
    }
}
