//! Trigger types and the trigger matcher.
//!
//! A workflow has exactly one trigger. Event-shaped triggers are matched
//! against inbound [`EventDetail`]s with a pure predicate: the event type
//! must equal the trigger type and every configured predicate field must
//! match exactly. `manual` and `schedule` triggers never match an event:
//! manual entry goes through an explicit enrollment call, and schedule
//! firing is driven by the scheduler's next-fire bookkeeping.

use crate::error::TriggerError;
use crate::event::EventDetail;
use marketloop_core::{FormId, SegmentId};
use serde::{Deserialize, Serialize};

/// The type of a workflow trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    Manual,
    Schedule,
    FormSubmission,
    TagAdded,
    TagRemoved,
    SegmentEntry,
    SegmentExit,
    DealStageChange,
    ContactCreated,
}

impl std::fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Manual => "manual",
            Self::Schedule => "schedule",
            Self::FormSubmission => "form_submission",
            Self::TagAdded => "tag_added",
            Self::TagRemoved => "tag_removed",
            Self::SegmentEntry => "segment_entry",
            Self::SegmentExit => "segment_exit",
            Self::DealStageChange => "deal_stage_change",
            Self::ContactCreated => "contact_created",
        };
        write!(f, "{name}")
    }
}

/// Configuration for a workflow trigger, keyed by trigger type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TriggerConfig {
    /// Entry only through an explicit enrollment call.
    Manual,
    /// Cron-based entry for a contact audience.
    Schedule {
        /// Cron expression (e.g., "0 9 * * 1" for Mondays at 9am).
        cron: String,
        /// Timezone for the schedule.
        timezone: Option<String>,
        /// The segment to enroll on each fire; every tenant contact when absent.
        segment_id: Option<SegmentId>,
    },
    /// A contact submitted a form.
    FormSubmission {
        /// Match only this form; any form when absent.
        form_id: Option<FormId>,
    },
    /// A tag was added to a contact.
    TagAdded {
        /// The tag to match.
        tag: String,
    },
    /// A tag was removed from a contact.
    TagRemoved {
        /// The tag to match.
        tag: String,
    },
    /// A contact entered a segment.
    SegmentEntry {
        /// The segment to match.
        segment_id: SegmentId,
    },
    /// A contact left a segment.
    SegmentExit {
        /// The segment to match.
        segment_id: SegmentId,
    },
    /// A deal moved to a stage.
    DealStageChange {
        /// The target stage to match.
        stage: String,
    },
    /// A contact was created.
    ContactCreated,
}

impl TriggerConfig {
    /// Returns the trigger type.
    #[must_use]
    pub fn kind(&self) -> TriggerKind {
        match self {
            Self::Manual => TriggerKind::Manual,
            Self::Schedule { .. } => TriggerKind::Schedule,
            Self::FormSubmission { .. } => TriggerKind::FormSubmission,
            Self::TagAdded { .. } => TriggerKind::TagAdded,
            Self::TagRemoved { .. } => TriggerKind::TagRemoved,
            Self::SegmentEntry { .. } => TriggerKind::SegmentEntry,
            Self::SegmentExit { .. } => TriggerKind::SegmentExit,
            Self::DealStageChange { .. } => TriggerKind::DealStageChange,
            Self::ContactCreated => TriggerKind::ContactCreated,
        }
    }

    /// Validates the trigger's required config fields.
    ///
    /// Called when a workflow is activated; an invalid trigger rejects the
    /// activation.
    ///
    /// # Errors
    ///
    /// Returns the first missing field or parse failure.
    pub fn validate(&self) -> Result<(), TriggerError> {
        match self {
            Self::Schedule { cron, .. } => {
                if cron.trim().is_empty() {
                    return Err(TriggerError::MissingField {
                        kind: self.kind(),
                        field: "cron",
                    });
                }
                cron.parse::<croner::Cron>()
                    .map(|_| ())
                    .map_err(|e| TriggerError::InvalidCron {
                        expression: cron.clone(),
                        reason: e.to_string(),
                    })
            }
            Self::TagAdded { tag } | Self::TagRemoved { tag } => {
                if tag.trim().is_empty() {
                    return Err(TriggerError::MissingField {
                        kind: self.kind(),
                        field: "tag",
                    });
                }
                Ok(())
            }
            Self::DealStageChange { stage } => {
                if stage.trim().is_empty() {
                    return Err(TriggerError::MissingField {
                        kind: self.kind(),
                        field: "stage",
                    });
                }
                Ok(())
            }
            Self::Manual
            | Self::FormSubmission { .. }
            | Self::SegmentEntry { .. }
            | Self::SegmentExit { .. }
            | Self::ContactCreated => Ok(()),
        }
    }

    /// Returns true if an inbound event should enter a contact into a
    /// workflow with this trigger.
    ///
    /// Pure and side-effect free; entry creation and its dedup policy are
    /// the caller's responsibility.
    #[must_use]
    pub fn matches(&self, event: &EventDetail) -> bool {
        match (self, event) {
            (Self::FormSubmission { form_id }, EventDetail::FormSubmission { form_id: event_form }) => {
                form_id.is_none_or(|configured| configured == *event_form)
            }
            (Self::TagAdded { tag }, EventDetail::TagAdded { tag: event_tag }) => tag == event_tag,
            (Self::TagRemoved { tag }, EventDetail::TagRemoved { tag: event_tag }) => {
                tag == event_tag
            }
            (
                Self::SegmentEntry { segment_id },
                EventDetail::SegmentEntry {
                    segment_id: event_segment,
                },
            ) => segment_id == event_segment,
            (
                Self::SegmentExit { segment_id },
                EventDetail::SegmentExit {
                    segment_id: event_segment,
                },
            ) => segment_id == event_segment,
            (
                Self::DealStageChange { stage },
                EventDetail::DealStageChange {
                    stage: event_stage, ..
                },
            ) => stage == event_stage,
            (Self::ContactCreated, EventDetail::ContactCreated) => true,
            // Manual and schedule triggers never auto-match an event.
            _ => false,
        }
    }
}
