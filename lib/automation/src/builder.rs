//! Deriving a traversable ordering from the flat graph representation.
//!
//! The builder turns the pointer arena into an ordered placement list:
//! find the unique entry node, then walk the chains with an explicit work
//! stack, tracking depth, branch membership, and the owning condition for
//! every node. The traversal is iterative so stack depth is bounded
//! independent of graph size, and a visited set turns any revisit into a
//! hard error instead of an endless loop.

use crate::error::GraphError;
use crate::graph::WorkflowGraph;
use crate::node::{BranchSide, Node, NodeId};
use std::collections::HashSet;

/// Where a node sits in the derived ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodePlacement {
    /// The node placed.
    pub node_id: NodeId,
    /// Nesting depth; the entry chain is depth 0, each branch adds one.
    pub depth: u32,
    /// The branch side this node's chain hangs off, if any.
    pub branch: Option<BranchSide>,
    /// The condition node owning the branch, if any.
    pub parent_condition_id: Option<NodeId>,
}

/// A pending chain head on the traversal stack.
struct Frame {
    node_id: NodeId,
    /// The node whose pointer led here, for dangling-pointer reporting.
    via: Option<NodeId>,
    depth: u32,
    branch: Option<BranchSide>,
    parent_condition_id: Option<NodeId>,
}

/// Returns the single node never referenced by any other node's pointers.
///
/// # Errors
///
/// Fails when zero nodes qualify (every node is referenced, or the graph is
/// empty) or when more than one does (disconnected graph).
pub fn find_entry_node(graph: &WorkflowGraph) -> Result<&Node, GraphError> {
    let referenced = graph.referenced_ids();
    let mut candidates: Vec<&Node> = graph
        .nodes()
        .filter(|node| !referenced.contains(&node.id))
        .collect();

    match candidates.len() {
        0 => Err(GraphError::MissingEntryNode),
        1 => Ok(candidates.remove(0)),
        _ => {
            let mut node_ids: Vec<NodeId> = candidates.iter().map(|n| n.id).collect();
            node_ids.sort();
            Err(GraphError::MultipleEntryNodes { node_ids })
        }
    }
}

/// Flattens the graph into placement order, starting at the entry node.
///
/// Chains are followed through `next_node_id` at the current depth and
/// branch context. A condition node contributes its true branch chain first,
/// then its false branch chain, each one level deeper. Branch chains are
/// terminal; there is no automatic rejoin.
///
/// Runs in time linear in node count.
///
/// # Errors
///
/// - `CycleDetected` if any node is reached twice (a cycle or a premature
///   branch merge).
/// - `UnreachableNodes` if the traversal cannot reach every node.
/// - Entry node errors from [`find_entry_node`].
pub fn flatten(graph: &WorkflowGraph) -> Result<Vec<NodePlacement>, GraphError> {
    if graph.is_empty() {
        return Ok(Vec::new());
    }

    let entry = find_entry_node(graph)?;

    let mut placements = Vec::with_capacity(graph.node_count());
    let mut visited: HashSet<NodeId> = HashSet::with_capacity(graph.node_count());
    let mut stack = vec![Frame {
        node_id: entry.id,
        via: None,
        depth: 0,
        branch: None,
        parent_condition_id: None,
    }];

    while let Some(frame) = stack.pop() {
        if !visited.insert(frame.node_id) {
            return Err(GraphError::CycleDetected {
                node_id: frame.node_id,
            });
        }

        let Some(node) = graph.get(frame.node_id) else {
            return Err(GraphError::DanglingPointer {
                node_id: frame.via.unwrap_or(frame.node_id),
                target: frame.node_id,
            });
        };

        placements.push(NodePlacement {
            node_id: node.id,
            depth: frame.depth,
            branch: frame.branch,
            parent_condition_id: frame.parent_condition_id,
        });

        if node.is_condition() {
            // Push false first so the true chain is emitted first.
            if let Some(false_head) = node.false_branch_id {
                stack.push(Frame {
                    node_id: false_head,
                    via: Some(node.id),
                    depth: frame.depth + 1,
                    branch: Some(BranchSide::False),
                    parent_condition_id: Some(node.id),
                });
            }
            if let Some(true_head) = node.true_branch_id {
                stack.push(Frame {
                    node_id: true_head,
                    via: Some(node.id),
                    depth: frame.depth + 1,
                    branch: Some(BranchSide::True),
                    parent_condition_id: Some(node.id),
                });
            }
        } else if let Some(next) = node.next_node_id {
            stack.push(Frame {
                node_id: next,
                via: Some(node.id),
                depth: frame.depth,
                branch: frame.branch,
                parent_condition_id: frame.parent_condition_id,
            });
        }
    }

    if placements.len() != graph.node_count() {
        let mut node_ids: Vec<NodeId> = graph
            .node_ids()
            .filter(|id| !visited.contains(id))
            .collect();
        node_ids.sort();
        return Err(GraphError::UnreachableNodes { node_ids });
    }

    Ok(placements)
}
