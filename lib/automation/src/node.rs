//! Workflow node types and configurations.
//!
//! Nodes are the steps of an automation workflow. Each node has:
//! - A unique ID within the workflow
//! - A kind (action, condition, or control)
//! - Configuration specific to its kind
//! - Structural pointers to its successor or branch heads
//!
//! The graph is stored flat: every structural "pointer" is a [`NodeId`]
//! resolved through the owning [`crate::graph::WorkflowGraph`] arena, never a
//! language reference, so the structure survives serialization and can be
//! snapshotted per execution.

use marketloop_core::UserId;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use ulid::Ulid;

/// A unique identifier for a node within a workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(Ulid);

impl NodeId {
    /// Creates a new random node ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Creates a node ID from a ULID.
    #[must_use]
    pub const fn from_ulid(ulid: Ulid) -> Self {
        Self(ulid)
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "node_{}", self.0)
    }
}

/// The category of a workflow node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeCategory {
    /// Performs a side effect against an external collaborator.
    Action,
    /// Splits the flow into a true branch and a false branch.
    Condition,
    /// Graph structure control (end).
    Control,
}

/// The kind of a workflow node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    SendEmail,
    SendSms,
    AddTag,
    RemoveTag,
    UpdateField,
    Wait,
    NotifyUser,
    Handoff,
    Condition,
    End,
}

impl NodeKind {
    /// Returns the category of this node kind.
    #[must_use]
    pub fn category(&self) -> NodeCategory {
        match self {
            Self::SendEmail
            | Self::SendSms
            | Self::AddTag
            | Self::RemoveTag
            | Self::UpdateField
            | Self::Wait
            | Self::NotifyUser
            | Self::Handoff => NodeCategory::Action,
            Self::Condition => NodeCategory::Condition,
            Self::End => NodeCategory::Control,
        }
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::SendEmail => "send_email",
            Self::SendSms => "send_sms",
            Self::AddTag => "add_tag",
            Self::RemoveTag => "remove_tag",
            Self::UpdateField => "update_field",
            Self::Wait => "wait",
            Self::NotifyUser => "notify_user",
            Self::Handoff => "handoff",
            Self::Condition => "condition",
            Self::End => "end",
        };
        write!(f, "{name}")
    }
}

/// One side of a condition node's branch pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BranchSide {
    True,
    False,
}

impl std::fmt::Display for BranchSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::True => write!(f, "true"),
            Self::False => write!(f, "false"),
        }
    }
}

/// Configuration for send_email nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendEmailConfig {
    /// The email template name.
    pub template: String,
    /// Subject line for the email.
    pub subject: String,
}

/// Configuration for send_sms nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendSmsConfig {
    /// The message body.
    pub message: String,
}

/// Configuration for add_tag and remove_tag nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagConfig {
    /// The tag to add or remove.
    pub tag: String,
}

/// Configuration for update_field nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateFieldConfig {
    /// The contact field to update.
    pub field: String,
    /// The value to write.
    pub value: JsonValue,
}

/// Unit for a wait node's delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitUnit {
    Minutes,
    Hours,
    Days,
}

/// How long a wait node suspends an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitDelay {
    /// Number of units to wait.
    pub amount: u32,
    /// The unit of the delay.
    pub unit: WaitUnit,
}

impl WaitDelay {
    /// Creates a new delay.
    #[must_use]
    pub const fn new(amount: u32, unit: WaitUnit) -> Self {
        Self { amount, unit }
    }

    /// Returns the delay as a chrono duration.
    #[must_use]
    pub fn to_duration(&self) -> chrono::Duration {
        let amount = i64::from(self.amount);
        match self.unit {
            WaitUnit::Minutes => chrono::Duration::minutes(amount),
            WaitUnit::Hours => chrono::Duration::hours(amount),
            WaitUnit::Days => chrono::Duration::days(amount),
        }
    }
}

/// Configuration for wait nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitConfig {
    /// How long to suspend before resuming.
    pub delay: WaitDelay,
}

/// Configuration for notify_user nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifyUserConfig {
    /// The CRM user to notify.
    pub user_id: UserId,
    /// The notification message.
    pub message: String,
}

/// Configuration for handoff nodes (assign the contact to a human).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandoffConfig {
    /// The CRM user taking over the contact.
    pub assignee_id: UserId,
    /// Optional note for the assignee.
    pub note: Option<String>,
}

/// Comparison operator for condition predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredicateOp {
    /// Field value equals the configured value.
    #[default]
    Equals,
    /// Field value does not equal the configured value.
    NotEquals,
    /// Field value (string or array) contains the configured value.
    Contains,
    /// Field is present and non-null; the configured value is ignored.
    IsSet,
}

/// A predicate evaluated against a contact snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionPredicate {
    /// The contact field to inspect.
    pub field: String,
    /// The comparison operator.
    #[serde(default)]
    pub op: PredicateOp,
    /// The value to compare against.
    #[serde(default)]
    pub value: JsonValue,
}

impl ConditionPredicate {
    /// Creates an equality predicate.
    #[must_use]
    pub fn equals(field: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        Self {
            field: field.into(),
            op: PredicateOp::Equals,
            value: value.into(),
        }
    }
}

/// Configuration for condition nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionConfig {
    /// The predicate deciding which branch is taken.
    pub predicate: ConditionPredicate,
}

/// Configuration for a node, varying by kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeConfig {
    SendEmail(SendEmailConfig),
    SendSms(SendSmsConfig),
    AddTag(TagConfig),
    RemoveTag(TagConfig),
    UpdateField(UpdateFieldConfig),
    Wait(WaitConfig),
    NotifyUser(NotifyUserConfig),
    Handoff(HandoffConfig),
    Condition(ConditionConfig),
    End,
}

impl NodeConfig {
    /// Returns the kind of this node configuration.
    #[must_use]
    pub fn kind(&self) -> NodeKind {
        match self {
            Self::SendEmail(_) => NodeKind::SendEmail,
            Self::SendSms(_) => NodeKind::SendSms,
            Self::AddTag(_) => NodeKind::AddTag,
            Self::RemoveTag(_) => NodeKind::RemoveTag,
            Self::UpdateField(_) => NodeKind::UpdateField,
            Self::Wait(_) => NodeKind::Wait,
            Self::NotifyUser(_) => NodeKind::NotifyUser,
            Self::Handoff(_) => NodeKind::Handoff,
            Self::Condition(_) => NodeKind::Condition,
            Self::End => NodeKind::End,
        }
    }
}

/// A workflow node.
///
/// Structural invariants (enforced by graph validation):
/// - Condition nodes use `true_branch_id`/`false_branch_id` and never
///   `next_node_id`.
/// - End nodes carry no pointers at all.
/// - Every other node uses at most `next_node_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Unique identifier for this node within the workflow.
    pub id: NodeId,
    /// Human-readable name for this node.
    pub name: String,
    /// Node configuration (determines kind and behavior).
    pub config: NodeConfig,
    /// The linear successor, for non-condition nodes.
    pub next_node_id: Option<NodeId>,
    /// Head of the true branch, for condition nodes.
    pub true_branch_id: Option<NodeId>,
    /// Head of the false branch, for condition nodes.
    pub false_branch_id: Option<NodeId>,
    /// Display tie-break; derived from traversal order, never used for execution.
    pub sort_order: u32,
}

impl Node {
    /// Creates a new node with the given configuration and no pointers.
    #[must_use]
    pub fn new(name: impl Into<String>, config: NodeConfig) -> Self {
        Self {
            id: NodeId::new(),
            name: name.into(),
            config,
            next_node_id: None,
            true_branch_id: None,
            false_branch_id: None,
            sort_order: 0,
        }
    }

    /// Creates a new node with a specific ID.
    #[must_use]
    pub fn with_id(id: NodeId, name: impl Into<String>, config: NodeConfig) -> Self {
        Self {
            id,
            name: name.into(),
            config,
            next_node_id: None,
            true_branch_id: None,
            false_branch_id: None,
            sort_order: 0,
        }
    }

    /// Returns the kind of this node.
    #[must_use]
    pub fn kind(&self) -> NodeKind {
        self.config.kind()
    }

    /// Returns the category of this node.
    #[must_use]
    pub fn category(&self) -> NodeCategory {
        self.kind().category()
    }

    /// Returns true if this is a condition node.
    #[must_use]
    pub fn is_condition(&self) -> bool {
        matches!(self.config, NodeConfig::Condition(_))
    }

    /// Returns true if this is an end node.
    #[must_use]
    pub fn is_end(&self) -> bool {
        matches!(self.config, NodeConfig::End)
    }

    /// Returns the branch head for the given side, for condition nodes.
    #[must_use]
    pub fn branch_head(&self, side: BranchSide) -> Option<NodeId> {
        match side {
            BranchSide::True => self.true_branch_id,
            BranchSide::False => self.false_branch_id,
        }
    }

    /// Returns every node this node points at.
    pub fn references(&self) -> impl Iterator<Item = NodeId> {
        self.next_node_id
            .into_iter()
            .chain(self.true_branch_id)
            .chain(self.false_branch_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_id_display() {
        let id = NodeId::new();
        let display = id.to_string();
        assert!(display.starts_with("node_"));
    }

    #[test]
    fn kind_categories() {
        assert_eq!(NodeKind::SendEmail.category(), NodeCategory::Action);
        assert_eq!(NodeKind::Wait.category(), NodeCategory::Action);
        assert_eq!(NodeKind::Condition.category(), NodeCategory::Condition);
        assert_eq!(NodeKind::End.category(), NodeCategory::Control);
    }

    #[test]
    fn wait_delay_to_duration() {
        assert_eq!(
            WaitDelay::new(90, WaitUnit::Minutes).to_duration(),
            chrono::Duration::minutes(90)
        );
        assert_eq!(
            WaitDelay::new(1, WaitUnit::Days).to_duration(),
            chrono::Duration::days(1)
        );
    }

    #[test]
    fn node_references_lists_pointer_targets() {
        let mut node = Node::new(
            "Closed won?",
            NodeConfig::Condition(ConditionConfig {
                predicate: ConditionPredicate::equals("dealStage", "CLOSED_WON"),
            }),
        );
        let t = NodeId::new();
        let f = NodeId::new();
        node.true_branch_id = Some(t);
        node.false_branch_id = Some(f);

        let refs: Vec<_> = node.references().collect();
        assert_eq!(refs, vec![t, f]);
    }

    #[test]
    fn end_node_has_no_references() {
        let node = Node::new("Done", NodeConfig::End);
        assert!(node.is_end());
        assert_eq!(node.references().count(), 0);
    }

    #[test]
    fn config_kind_mapping() {
        let config = NodeConfig::AddTag(TagConfig {
            tag: "customer".to_string(),
        });
        assert_eq!(config.kind(), NodeKind::AddTag);
    }

    #[test]
    fn node_serde_roundtrip() {
        let node = Node::new(
            "Welcome email",
            NodeConfig::SendEmail(SendEmailConfig {
                template: "welcome".to_string(),
                subject: "Welcome aboard".to_string(),
            }),
        );
        let json = serde_json::to_string(&node).expect("serialize");
        let parsed: Node = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(node, parsed);
    }

    #[test]
    fn config_serde_uses_type_tag() {
        let config = NodeConfig::Wait(WaitConfig {
            delay: WaitDelay::new(1, WaitUnit::Days),
        });
        let json = serde_json::to_value(&config).expect("serialize");
        assert_eq!(json["type"], "wait");
    }
}
