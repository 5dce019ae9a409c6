//! Inbound business events that can enter contacts into workflows.
//!
//! Events are produced by the surrounding CRM (tag changes, form
//! submissions, segment churn, deal movement) and fanned out across the
//! tenant's active workflows by the service boundary.

use chrono::{DateTime, Utc};
use marketloop_core::{ContactId, DealId, FormId, SegmentId, TenantId};
use serde::{Deserialize, Serialize};

/// The payload of a business event, keyed by event type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventDetail {
    /// A contact submitted a form.
    FormSubmission {
        /// The form that was submitted.
        form_id: FormId,
    },
    /// A tag was added to a contact.
    TagAdded {
        /// The tag that was added.
        tag: String,
    },
    /// A tag was removed from a contact.
    TagRemoved {
        /// The tag that was removed.
        tag: String,
    },
    /// A contact entered a segment.
    SegmentEntry {
        /// The segment entered.
        segment_id: SegmentId,
    },
    /// A contact left a segment.
    SegmentExit {
        /// The segment left.
        segment_id: SegmentId,
    },
    /// A deal moved to a new stage.
    DealStageChange {
        /// The deal that moved.
        deal_id: DealId,
        /// The stage it moved to.
        stage: String,
    },
    /// A contact was created.
    ContactCreated,
}

/// A business event scoped to a tenant and contact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrmEvent {
    /// The tenant the event belongs to.
    pub tenant_id: TenantId,
    /// The contact the event concerns.
    pub contact_id: ContactId,
    /// When the event occurred.
    pub occurred_at: DateTime<Utc>,
    /// The event payload.
    pub detail: EventDetail,
}

impl CrmEvent {
    /// Creates a new event stamped with the current time.
    #[must_use]
    pub fn new(tenant_id: TenantId, contact_id: ContactId, detail: EventDetail) -> Self {
        Self {
            tenant_id,
            contact_id,
            occurred_at: Utc::now(),
            detail,
        }
    }

    /// Sets the occurrence timestamp.
    #[must_use]
    pub fn with_occurred_at(mut self, occurred_at: DateTime<Utc>) -> Self {
        self.occurred_at = occurred_at;
        self
    }
}
