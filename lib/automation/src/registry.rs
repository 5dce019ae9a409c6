//! Static catalog of node kinds and edit-time config validation.
//!
//! The registry is the single source of truth for what each node kind is
//! allowed to look like: its category, its structural contract (successor vs.
//! branches), and the shape of a valid configuration. The graph editor and
//! graph validation consult it before accepting a node.

use crate::error::GraphError;
use crate::node::{Node, NodeCategory, NodeConfig, NodeKind, PredicateOp};

/// Structural and descriptive metadata for a node kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeKindInfo {
    /// The node kind described.
    pub kind: NodeKind,
    /// The kind's category.
    pub category: NodeCategory,
    /// Human-readable label for editors.
    pub label: &'static str,
    /// Whether nodes of this kind carry a linear successor pointer.
    pub has_successor: bool,
    /// Whether nodes of this kind carry true/false branch pointers.
    pub has_branches: bool,
}

/// The full node kind catalog.
pub const CATALOG: &[NodeKindInfo] = &[
    NodeKindInfo {
        kind: NodeKind::SendEmail,
        category: NodeCategory::Action,
        label: "Send email",
        has_successor: true,
        has_branches: false,
    },
    NodeKindInfo {
        kind: NodeKind::SendSms,
        category: NodeCategory::Action,
        label: "Send SMS",
        has_successor: true,
        has_branches: false,
    },
    NodeKindInfo {
        kind: NodeKind::AddTag,
        category: NodeCategory::Action,
        label: "Add tag",
        has_successor: true,
        has_branches: false,
    },
    NodeKindInfo {
        kind: NodeKind::RemoveTag,
        category: NodeCategory::Action,
        label: "Remove tag",
        has_successor: true,
        has_branches: false,
    },
    NodeKindInfo {
        kind: NodeKind::UpdateField,
        category: NodeCategory::Action,
        label: "Update field",
        has_successor: true,
        has_branches: false,
    },
    NodeKindInfo {
        kind: NodeKind::Wait,
        category: NodeCategory::Action,
        label: "Wait",
        has_successor: true,
        has_branches: false,
    },
    NodeKindInfo {
        kind: NodeKind::NotifyUser,
        category: NodeCategory::Action,
        label: "Notify user",
        has_successor: true,
        has_branches: false,
    },
    NodeKindInfo {
        kind: NodeKind::Handoff,
        category: NodeCategory::Action,
        label: "Hand off to user",
        has_successor: true,
        has_branches: false,
    },
    NodeKindInfo {
        kind: NodeKind::Condition,
        category: NodeCategory::Condition,
        label: "Condition",
        has_successor: false,
        has_branches: true,
    },
    NodeKindInfo {
        kind: NodeKind::End,
        category: NodeCategory::Control,
        label: "End",
        has_successor: false,
        has_branches: false,
    },
];

/// Returns the catalog entry for a node kind.
#[must_use]
pub fn info(kind: NodeKind) -> &'static NodeKindInfo {
    // The catalog covers every kind, so the lookup always succeeds.
    CATALOG
        .iter()
        .find(|i| i.kind == kind)
        .unwrap_or(&CATALOG[0])
}

/// Validates a node's configuration against its kind's schema.
///
/// # Errors
///
/// Returns `GraphError::InvalidConfig` describing the first problem found.
pub fn validate_config(node: &Node) -> Result<(), GraphError> {
    let invalid = |reason: &str| GraphError::InvalidConfig {
        node_id: node.id,
        reason: reason.to_string(),
    };

    match &node.config {
        NodeConfig::SendEmail(config) => {
            if config.template.trim().is_empty() {
                return Err(invalid("email template must not be empty"));
            }
            if config.subject.trim().is_empty() {
                return Err(invalid("email subject must not be empty"));
            }
        }
        NodeConfig::SendSms(config) => {
            if config.message.trim().is_empty() {
                return Err(invalid("sms message must not be empty"));
            }
        }
        NodeConfig::AddTag(config) | NodeConfig::RemoveTag(config) => {
            if config.tag.trim().is_empty() {
                return Err(invalid("tag must not be empty"));
            }
        }
        NodeConfig::UpdateField(config) => {
            if config.field.trim().is_empty() {
                return Err(invalid("field name must not be empty"));
            }
        }
        NodeConfig::Wait(config) => {
            if config.delay.amount == 0 {
                return Err(invalid("wait delay must be at least one unit"));
            }
        }
        NodeConfig::NotifyUser(config) => {
            if config.message.trim().is_empty() {
                return Err(invalid("notification message must not be empty"));
            }
        }
        NodeConfig::Handoff(_) => {}
        NodeConfig::Condition(config) => {
            if config.predicate.field.trim().is_empty() {
                return Err(invalid("condition predicate field must not be empty"));
            }
            if config.predicate.op != PredicateOp::IsSet && config.predicate.value.is_null() {
                return Err(invalid("condition predicate value must not be null"));
            }
        }
        NodeConfig::End => {}
    }

    Ok(())
}
