//! Flat workflow graph storage.
//!
//! A workflow graph is an arena of nodes keyed by [`NodeId`]. Structure is
//! encoded entirely in the nodes' pointer fields (`next_node_id`,
//! `true_branch_id`, `false_branch_id`), so the persisted representation is a
//! plain node collection and a graph snapshot is just a clone of the arena.
//!
//! Validation checks the structural invariants: per-kind pointer rules, no
//! dangling pointers, exactly one entry node, acyclicity, and full
//! reachability from the entry node.

use crate::builder;
use crate::error::GraphError;
use crate::node::{Node, NodeId};
use crate::registry;
use petgraph::algo::toposort;
use petgraph::graph::DiGraph;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Which pointer field of a node references another node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerSlot {
    /// The linear successor pointer.
    Next,
    /// The true branch head pointer.
    TrueBranch,
    /// The false branch head pointer.
    FalseBranch,
}

/// A workflow graph stored as a flat node arena.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(try_from = "GraphRepr", into = "GraphRepr")]
pub struct WorkflowGraph {
    nodes: HashMap<NodeId, Node>,
}

impl WorkflowGraph {
    /// Creates a new empty workflow graph.
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
        }
    }

    /// Builds a graph from a node collection.
    ///
    /// # Errors
    ///
    /// Returns an error if two nodes share an ID.
    pub fn from_nodes(nodes: impl IntoIterator<Item = Node>) -> Result<Self, GraphError> {
        let mut graph = Self::new();
        for node in nodes {
            if graph.nodes.contains_key(&node.id) {
                return Err(GraphError::DuplicateNodeId { node_id: node.id });
            }
            graph.nodes.insert(node.id, node);
        }
        Ok(graph)
    }

    /// Adds a node to the arena, replacing any node with the same ID.
    ///
    /// This is the raw storage operation; structural edits go through
    /// [`crate::editor`], which re-validates the result.
    pub fn insert(&mut self, node: Node) -> NodeId {
        let node_id = node.id;
        self.nodes.insert(node_id, node);
        node_id
    }

    /// Removes a node from the arena without relinking anything.
    pub fn remove(&mut self, node_id: NodeId) -> Option<Node> {
        self.nodes.remove(&node_id)
    }

    /// Returns a reference to a node by its ID.
    #[must_use]
    pub fn get(&self, node_id: NodeId) -> Option<&Node> {
        self.nodes.get(&node_id)
    }

    /// Returns a mutable reference to a node by its ID.
    pub fn get_mut(&mut self, node_id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&node_id)
    }

    /// Returns true if a node with the given ID exists.
    #[must_use]
    pub fn contains(&self, node_id: NodeId) -> bool {
        self.nodes.contains_key(&node_id)
    }

    /// Returns the number of nodes in the graph.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if the graph has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns all nodes in the graph, in arbitrary order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Returns all node IDs in the graph, in arbitrary order.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> {
        self.nodes.keys().copied()
    }

    /// Returns all nodes sorted by display order.
    #[must_use]
    pub fn sorted_nodes(&self) -> Vec<&Node> {
        let mut nodes: Vec<&Node> = self.nodes.values().collect();
        nodes.sort_by_key(|n| (n.sort_order, n.id));
        nodes
    }

    /// Returns the set of node IDs referenced by any pointer field.
    #[must_use]
    pub fn referenced_ids(&self) -> HashSet<NodeId> {
        self.nodes
            .values()
            .flat_map(Node::references)
            .collect()
    }

    /// Returns every (node, pointer slot) pair that references the given node.
    ///
    /// In a well-formed graph at most one predecessor exists.
    #[must_use]
    pub fn predecessors(&self, node_id: NodeId) -> Vec<(NodeId, PointerSlot)> {
        let mut predecessors = Vec::new();
        for node in self.nodes.values() {
            if node.next_node_id == Some(node_id) {
                predecessors.push((node.id, PointerSlot::Next));
            }
            if node.true_branch_id == Some(node_id) {
                predecessors.push((node.id, PointerSlot::TrueBranch));
            }
            if node.false_branch_id == Some(node_id) {
                predecessors.push((node.id, PointerSlot::FalseBranch));
            }
        }
        predecessors
    }

    /// Validates the graph's structural invariants.
    ///
    /// Checks, in order: per-kind pointer rules, node configurations,
    /// dangling pointers, entry node uniqueness, acyclicity, and that a
    /// traversal from the entry node reaches every node exactly once.
    ///
    /// # Errors
    ///
    /// Returns the first violation found. An empty graph is valid.
    pub fn validate(&self) -> Result<(), GraphError> {
        if self.is_empty() {
            return Ok(());
        }

        for node in self.nodes.values() {
            let info = registry::info(node.kind());
            if !info.has_successor && node.next_node_id.is_some() {
                if node.is_condition() {
                    return Err(GraphError::ConditionHasSuccessor { node_id: node.id });
                }
                return Err(GraphError::EndHasPointer { node_id: node.id });
            }
            if !info.has_branches
                && (node.true_branch_id.is_some() || node.false_branch_id.is_some())
            {
                if node.is_end() {
                    return Err(GraphError::EndHasPointer { node_id: node.id });
                }
                return Err(GraphError::StrayBranchPointer { node_id: node.id });
            }

            registry::validate_config(node)?;

            for target in node.references() {
                if !self.nodes.contains_key(&target) {
                    return Err(GraphError::DanglingPointer {
                        node_id: node.id,
                        target,
                    });
                }
            }
        }

        builder::find_entry_node(self)?;
        self.check_acyclic()?;

        // A full traversal also rejects premature branch merges (a node
        // reachable through two pointers is visited twice).
        builder::flatten(self)?;

        Ok(())
    }

    /// Rejects graphs whose pointer structure contains a cycle.
    fn check_acyclic(&self) -> Result<(), GraphError> {
        let mut digraph = DiGraph::<NodeId, ()>::new();
        let mut indices = HashMap::new();

        for node_id in self.nodes.keys() {
            let index = digraph.add_node(*node_id);
            indices.insert(*node_id, index);
        }
        for node in self.nodes.values() {
            for target in node.references() {
                if let (Some(&from), Some(&to)) = (indices.get(&node.id), indices.get(&target)) {
                    digraph.add_edge(from, to, ());
                }
            }
        }

        match toposort(&digraph, None) {
            Ok(_) => Ok(()),
            Err(cycle) => Err(GraphError::CycleDetected {
                node_id: digraph[cycle.node_id()],
            }),
        }
    }
}

/// Serialized form of a workflow graph: a flat node list in display order.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct GraphRepr {
    nodes: Vec<Node>,
}

impl From<WorkflowGraph> for GraphRepr {
    fn from(graph: WorkflowGraph) -> Self {
        let nodes = graph.sorted_nodes().into_iter().cloned().collect();
        Self { nodes }
    }
}

impl TryFrom<GraphRepr> for WorkflowGraph {
    type Error = GraphError;

    fn try_from(repr: GraphRepr) -> Result<Self, Self::Error> {
        Self::from_nodes(repr.nodes)
    }
}
