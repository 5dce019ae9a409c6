//! External collaborator seams for the execution engine.
//!
//! The engine performs side effects only through these traits. The real
//! implementations live with the email/SMS/notification services and the
//! contact database; the abstractions keep the engine testable without any
//! of them.

use crate::node::{
    ConditionPredicate, HandoffConfig, PredicateOp, SendEmailConfig, SendSmsConfig,
    UpdateFieldConfig,
};
use async_trait::async_trait;
use marketloop_core::{ContactId, SegmentId, TenantId, UserId};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::fmt;

/// Errors from action collaborators.
///
/// Transient failures are retried per the engine's bounded policy;
/// permanent failures terminate the execution immediately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionError {
    /// A temporary failure (timeout, rate limit) worth retrying.
    Transient { message: String },
    /// A failure that retrying cannot fix (unknown contact, bad template).
    Permanent { message: String },
}

impl ActionError {
    /// Creates a transient error.
    #[must_use]
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
        }
    }

    /// Creates a permanent error.
    #[must_use]
    pub fn permanent(message: impl Into<String>) -> Self {
        Self::Permanent {
            message: message.into(),
        }
    }

    /// Returns the error message.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Transient { message } | Self::Permanent { message } => message,
        }
    }
}

impl fmt::Display for ActionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient { message } => write!(f, "transient action failure: {message}"),
            Self::Permanent { message } => write!(f, "permanent action failure: {message}"),
        }
    }
}

impl std::error::Error for ActionError {}

/// What happened when an action was performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    /// The side effect was applied.
    Performed,
    /// The action did not apply to this contact (e.g., tag already present,
    /// contact unsubscribed from the channel).
    Skipped,
}

/// Performs workflow actions against external services.
#[async_trait]
pub trait ActionDispatcher: Send + Sync {
    /// Sends a templated email to the contact.
    async fn send_email(
        &self,
        tenant_id: TenantId,
        contact_id: ContactId,
        config: &SendEmailConfig,
    ) -> Result<ActionOutcome, ActionError>;

    /// Sends an SMS to the contact.
    async fn send_sms(
        &self,
        tenant_id: TenantId,
        contact_id: ContactId,
        config: &SendSmsConfig,
    ) -> Result<ActionOutcome, ActionError>;

    /// Adds a tag to the contact.
    async fn add_tag(
        &self,
        tenant_id: TenantId,
        contact_id: ContactId,
        tag: &str,
    ) -> Result<ActionOutcome, ActionError>;

    /// Removes a tag from the contact.
    async fn remove_tag(
        &self,
        tenant_id: TenantId,
        contact_id: ContactId,
        tag: &str,
    ) -> Result<ActionOutcome, ActionError>;

    /// Writes a contact field.
    async fn update_field(
        &self,
        tenant_id: TenantId,
        contact_id: ContactId,
        config: &UpdateFieldConfig,
    ) -> Result<ActionOutcome, ActionError>;

    /// Notifies a CRM user about the contact.
    async fn notify_user(
        &self,
        tenant_id: TenantId,
        contact_id: ContactId,
        user_id: UserId,
        message: &str,
    ) -> Result<ActionOutcome, ActionError>;

    /// Hands the contact off to a CRM user.
    async fn handoff(
        &self,
        tenant_id: TenantId,
        contact_id: ContactId,
        config: &HandoffConfig,
    ) -> Result<ActionOutcome, ActionError>;
}

/// A point-in-time view of a contact, used for condition evaluation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContactSnapshot {
    /// Contact fields by name (profile fields, deal fields, custom fields).
    pub fields: HashMap<String, JsonValue>,
    /// Tags currently on the contact.
    pub tags: Vec<String>,
}

impl ContactSnapshot {
    /// Creates an empty snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a field value.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Adds a tag.
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Returns a field value by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&JsonValue> {
        self.fields.get(name)
    }
}

/// Reads contact state from the CRM.
#[async_trait]
pub trait ContactDirectory: Send + Sync {
    /// Fetches a point-in-time snapshot of a contact.
    async fn snapshot(
        &self,
        tenant_id: TenantId,
        contact_id: ContactId,
    ) -> Result<ContactSnapshot, ActionError>;

    /// Lists the contacts in a segment, or every tenant contact when
    /// `segment_id` is `None`.
    async fn contacts_in_segment(
        &self,
        tenant_id: TenantId,
        segment_id: Option<SegmentId>,
    ) -> Result<Vec<ContactId>, ActionError>;
}

impl ConditionPredicate {
    /// Evaluates the predicate against a contact snapshot.
    ///
    /// Returns `None` when the inspected field is absent and the operator
    /// needs it; the engine defaults that case to the false branch.
    #[must_use]
    pub fn evaluate(&self, snapshot: &ContactSnapshot) -> Option<bool> {
        let field = snapshot.field(&self.field);

        match self.op {
            PredicateOp::IsSet => Some(field.is_some_and(|v| !v.is_null())),
            PredicateOp::Equals => field.map(|v| *v == self.value),
            PredicateOp::NotEquals => field.map(|v| *v != self.value),
            PredicateOp::Contains => field.map(|v| match v {
                JsonValue::String(s) => self
                    .value
                    .as_str()
                    .is_some_and(|needle| s.contains(needle)),
                JsonValue::Array(items) => items.contains(&self.value),
                _ => false,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn equals_predicate() {
        let snapshot = ContactSnapshot::new().with_field("dealStage", "CLOSED_WON");
        let predicate = ConditionPredicate::equals("dealStage", "CLOSED_WON");
        assert_eq!(predicate.evaluate(&snapshot), Some(true));

        let predicate = ConditionPredicate::equals("dealStage", "CLOSED_LOST");
        assert_eq!(predicate.evaluate(&snapshot), Some(false));
    }

    #[test]
    fn missing_field_is_indeterminate() {
        let snapshot = ContactSnapshot::new();
        let predicate = ConditionPredicate::equals("dealStage", "CLOSED_WON");
        assert_eq!(predicate.evaluate(&snapshot), None);
    }

    #[test]
    fn is_set_handles_missing_and_null() {
        let predicate = ConditionPredicate {
            field: "phone".to_string(),
            op: PredicateOp::IsSet,
            value: JsonValue::Null,
        };

        assert_eq!(predicate.evaluate(&ContactSnapshot::new()), Some(false));
        assert_eq!(
            predicate.evaluate(&ContactSnapshot::new().with_field("phone", JsonValue::Null)),
            Some(false)
        );
        assert_eq!(
            predicate.evaluate(&ContactSnapshot::new().with_field("phone", "+1555")),
            Some(true)
        );
    }

    #[test]
    fn contains_on_strings_and_arrays() {
        let predicate = ConditionPredicate {
            field: "interests".to_string(),
            op: PredicateOp::Contains,
            value: json!("pricing"),
        };

        let string_snapshot =
            ContactSnapshot::new().with_field("interests", "pricing, onboarding");
        assert_eq!(predicate.evaluate(&string_snapshot), Some(true));

        let array_snapshot =
            ContactSnapshot::new().with_field("interests", json!(["pricing", "docs"]));
        assert_eq!(predicate.evaluate(&array_snapshot), Some(true));

        let number_snapshot = ContactSnapshot::new().with_field("interests", 7);
        assert_eq!(predicate.evaluate(&number_snapshot), Some(false));
    }

    #[test]
    fn action_error_classification() {
        let transient = ActionError::transient("smtp timeout");
        let permanent = ActionError::permanent("unknown template");

        assert!(matches!(transient, ActionError::Transient { .. }));
        assert!(matches!(permanent, ActionError::Permanent { .. }));
        assert_eq!(transient.message(), "smtp timeout");
    }
}
