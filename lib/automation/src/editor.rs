//! Structural mutation of workflow graphs.
//!
//! Every editor operation is a pure function over the node arena: it clones
//! the graph, splices pointers, renumbers display order from the traversal,
//! and re-validates before returning. On any failure the input graph is
//! untouched, so a mutation is never partially applied.

use crate::builder;
use crate::error::GraphError;
use crate::graph::{PointerSlot, WorkflowGraph};
use crate::node::{BranchSide, Node, NodeId};
use crate::registry;
use std::collections::HashSet;
use tracing::debug;

/// Inserts a node into the graph.
///
/// - `after` of `None` makes the new node the entry node; the prior entry
///   node (if any) becomes its successor.
/// - `after` of a condition node requires `branch` and splices the new node
///   in as that branch's new head.
/// - Otherwise the new node is spliced into the linear chain immediately
///   after the target.
///
/// A displaced successor always ends up downstream of the new node; when the
/// new node is itself a condition, the displaced successor becomes the head
/// of its true branch so nothing is orphaned.
///
/// Any pointers preset on `node` are overwritten by the splice.
///
/// # Errors
///
/// Fails without side effects on unknown targets, duplicate IDs, invalid
/// configuration, misused branch arguments, insertion after an end node, or
/// any post-splice validation failure.
pub fn insert_node_after(
    graph: &WorkflowGraph,
    node: Node,
    after: Option<NodeId>,
    branch: Option<BranchSide>,
) -> Result<WorkflowGraph, GraphError> {
    if graph.contains(node.id) {
        return Err(GraphError::DuplicateNodeId { node_id: node.id });
    }
    registry::validate_config(&node)?;

    let mut edited = graph.clone();
    let mut node = node;
    node.next_node_id = None;
    node.true_branch_id = None;
    node.false_branch_id = None;

    let displaced = match after {
        None => {
            if branch.is_some() {
                return Err(GraphError::UnexpectedBranch { node_id: node.id });
            }
            if edited.is_empty() {
                None
            } else {
                Some(builder::find_entry_node(&edited)?.id)
            }
        }
        Some(after_id) => {
            let Some(target) = edited.get(after_id) else {
                return Err(GraphError::NodeNotFound { node_id: after_id });
            };
            if target.is_end() {
                return Err(GraphError::InsertAfterEnd { node_id: after_id });
            }

            if target.is_condition() {
                let Some(side) = branch else {
                    return Err(GraphError::BranchRequired { node_id: after_id });
                };
                let displaced = target.branch_head(side);
                let Some(target) = edited.get_mut(after_id) else {
                    return Err(GraphError::NodeNotFound { node_id: after_id });
                };
                match side {
                    BranchSide::True => target.true_branch_id = Some(node.id),
                    BranchSide::False => target.false_branch_id = Some(node.id),
                }
                displaced
            } else {
                if branch.is_some() {
                    return Err(GraphError::UnexpectedBranch { node_id: after_id });
                }
                let displaced = target.next_node_id;
                let Some(target) = edited.get_mut(after_id) else {
                    return Err(GraphError::NodeNotFound { node_id: after_id });
                };
                target.next_node_id = Some(node.id);
                displaced
            }
        }
    };

    if let Some(displaced_id) = displaced {
        if node.is_end() {
            return Err(GraphError::EndHasPointer { node_id: node.id });
        }
        if node.is_condition() {
            node.true_branch_id = Some(displaced_id);
        } else {
            node.next_node_id = Some(displaced_id);
        }
    }

    let node_id = edited.insert(node);
    renumber(&mut edited)?;
    edited.validate()?;

    debug!(%node_id, after = ?after, "node inserted");
    Ok(edited)
}

/// Removes a node from the graph, relinking its predecessor to its successor.
///
/// Removing a condition node discards both of its branch sub-chains: the
/// branches have no linear successor to relink to, so every node left
/// unreachable is deleted transitively.
///
/// Removing a node that does not exist is a no-op returning the unchanged
/// graph.
///
/// # Errors
///
/// Fails without side effects if the result does not validate.
pub fn remove_node(graph: &WorkflowGraph, node_id: NodeId) -> Result<WorkflowGraph, GraphError> {
    let mut edited = graph.clone();

    // The entry node must be resolved before the removal disturbs the
    // incoming-reference counts.
    let entry_id = if edited.is_empty() {
        None
    } else {
        Some(builder::find_entry_node(&edited)?.id)
    };

    let Some(removed) = edited.remove(node_id) else {
        return Ok(edited);
    };
    let successor = removed.next_node_id;

    for (predecessor_id, slot) in graph.predecessors(node_id) {
        if let Some(predecessor) = edited.get_mut(predecessor_id) {
            match slot {
                PointerSlot::Next => predecessor.next_node_id = successor,
                PointerSlot::TrueBranch => predecessor.true_branch_id = successor,
                PointerSlot::FalseBranch => predecessor.false_branch_id = successor,
            }
        }
    }

    if removed.is_condition() {
        let discarded = sweep_orphans(&mut edited, entry_id, node_id, successor);
        if discarded > 0 {
            debug!(%node_id, discarded, "discarded orphaned branch nodes");
        }
    }

    renumber(&mut edited)?;
    edited.validate()?;

    debug!(%node_id, "node removed");
    Ok(edited)
}

/// Rebuilds a graph from a full node list, as used by workflow updates.
///
/// # Errors
///
/// Fails if the node list does not form a valid graph.
pub fn replace_nodes(nodes: Vec<Node>) -> Result<WorkflowGraph, GraphError> {
    let mut graph = WorkflowGraph::from_nodes(nodes)?;
    renumber(&mut graph)?;
    graph.validate()?;
    Ok(graph)
}

/// Deletes every node unreachable from the entry node and returns the count.
fn sweep_orphans(
    graph: &mut WorkflowGraph,
    entry_id: Option<NodeId>,
    removed_id: NodeId,
    successor: Option<NodeId>,
) -> usize {
    // The walk starts at the surviving entry: either the original one or,
    // when the removed node was the entry, its successor.
    let start = match entry_id {
        Some(id) if id == removed_id => successor,
        Some(id) => Some(id),
        None => None,
    };

    let mut reachable: HashSet<NodeId> = HashSet::new();
    let mut stack: Vec<NodeId> = start.into_iter().collect();
    while let Some(current) = stack.pop() {
        if !reachable.insert(current) {
            continue;
        }
        if let Some(node) = graph.get(current) {
            stack.extend(node.references());
        }
    }

    let orphans: Vec<NodeId> = graph
        .node_ids()
        .filter(|id| !reachable.contains(id))
        .collect();
    for orphan in &orphans {
        graph.remove(*orphan);
    }
    orphans.len()
}

/// Reassigns `sort_order` from the flattened traversal order.
fn renumber(graph: &mut WorkflowGraph) -> Result<(), GraphError> {
    let placements = builder::flatten(graph)?;
    for (position, placement) in placements.iter().enumerate() {
        if let Some(node) = graph.get_mut(placement.node_id) {
            node.sort_order = position as u32;
        }
    }
    Ok(())
}
