//! # Dependency Graph
//!
//! The node/edge consumer the traversal emits into, and its in-memory
//! implementation.
//!
//! All data structures use `BTreeMap`/`BTreeSet` for deterministic ordering.
//! Node ids are dense: node `N` lives at index `N` of the node vector.

use crate::primitives::MAX_NODE_COUNT;
use crate::{DepNode, NixDuError, NodeId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// =============================================================================
// GRAPHSINK TRAIT
// =============================================================================

/// Consumer of the nodes and edges produced by a traversal.
///
/// A sink must hand out ids sequentially in call order, starting at 0, and
/// must never reorder or drop a call.
pub trait GraphSink {
    /// Register a node and return its id.
    fn register_node(&mut self, node: DepNode) -> Result<NodeId, NixDuError>;

    /// Register an edge between two previously registered nodes.
    fn register_edge(&mut self, from: NodeId, to: NodeId) -> Result<(), NixDuError>;
}

// =============================================================================
// DEPGRAPH IMPLEMENTATION
// =============================================================================

/// In-memory dependency graph.
///
/// Duplicate edges collapse into one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DepGraph {
    /// Node storage, indexed by `NodeId`.
    nodes: Vec<DepNode>,

    /// Adjacency list: from_node -> {to_node}
    edges: BTreeMap<NodeId, BTreeSet<NodeId>>,

    /// Ids of the root nodes, in registration order.
    roots: Vec<NodeId>,
}

impl DepGraph {
    /// Create a new empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a node by id.
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&DepNode> {
        self.nodes.get(id.index())
    }

    /// All nodes in id order.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &DepNode)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, node)| (NodeId(i as u32), node))
    }

    /// All edges in deterministic `(from, to)` order.
    pub fn edges(&self) -> impl Iterator<Item = (NodeId, NodeId)> + '_ {
        self.edges
            .iter()
            .flat_map(|(from, targets)| targets.iter().map(move |to| (*from, *to)))
    }

    /// Outgoing neighbors of a node, sorted by id.
    pub fn neighbors(&self, id: NodeId) -> Result<Vec<NodeId>, NixDuError> {
        if !self.contains(id) {
            return Err(NixDuError::NodeNotFound(id));
        }
        Ok(self
            .edges
            .get(&id)
            .map(|targets| targets.iter().copied().collect())
            .unwrap_or_default())
    }

    /// Whether `from -> to` is in the graph.
    #[must_use]
    pub fn contains_edge(&self, from: NodeId, to: NodeId) -> bool {
        self.edges.get(&from).is_some_and(|targets| targets.contains(&to))
    }

    /// Ids of the root nodes.
    #[must_use]
    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    /// Number of nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of distinct edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.values().map(BTreeSet::len).sum()
    }

    /// First node whose path is exactly `path`.
    #[must_use]
    pub fn find_by_path(&self, path: &str) -> Option<NodeId> {
        self.nodes
            .iter()
            .position(|node| node.path == path)
            .map(|i| NodeId(i as u32))
    }

    /// Sum of the sizes of all store nodes (roots excluded).
    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.nodes
            .iter()
            .filter(|node| !node.is_root)
            .fold(0u64, |acc, node| acc.saturating_add(node.size))
    }

    /// Every node reachable from some root, roots included.
    #[must_use]
    pub fn reachable_from_roots(&self) -> BTreeSet<NodeId> {
        self.reachable_from(&self.roots)
    }

    /// Every node reachable from `start`, `start` included.
    #[must_use]
    pub fn reachable_from(&self, start: &[NodeId]) -> BTreeSet<NodeId> {
        let mut seen: BTreeSet<NodeId> = start.iter().copied().collect();
        let mut stack: Vec<NodeId> = start.to_vec();
        while let Some(id) = stack.pop() {
            if let Some(targets) = self.edges.get(&id) {
                for &next in targets {
                    if seen.insert(next) {
                        stack.push(next);
                    }
                }
            }
        }
        seen
    }

    /// Sum of the sizes of every node reachable from a root, roots included.
    #[must_use]
    pub fn reachable_size(&self) -> u64 {
        self.reachable_from_roots()
            .into_iter()
            .filter_map(|id| self.node(id))
            .fold(0u64, |acc, node| acc.saturating_add(node.size))
    }

    /// Whether the root list matches the `is_root` flags, and no root has an
    /// incoming edge.
    #[must_use]
    pub fn roots_coherent(&self) -> bool {
        let flagged: BTreeSet<NodeId> = self
            .nodes()
            .filter(|(_, node)| node.is_root)
            .map(|(id, _)| id)
            .collect();
        let listed: BTreeSet<NodeId> = self.roots.iter().copied().collect();
        let has_incoming: BTreeSet<NodeId> = self.edges().map(|(_, to)| to).collect();
        flagged == listed && flagged.is_disjoint(&has_incoming)
    }

    fn contains(&self, id: NodeId) -> bool {
        id.index() < self.nodes.len()
    }
}

impl GraphSink for DepGraph {
    fn register_node(&mut self, node: DepNode) -> Result<NodeId, NixDuError> {
        if self.nodes.len() as u64 >= MAX_NODE_COUNT {
            return Err(NixDuError::CapacityExceeded(MAX_NODE_COUNT));
        }
        let id = NodeId(self.nodes.len() as u32);
        if node.is_root {
            self.roots.push(id);
        }
        self.nodes.push(node);
        Ok(id)
    }

    fn register_edge(&mut self, from: NodeId, to: NodeId) -> Result<(), NixDuError> {
        if !self.contains(from) {
            return Err(NixDuError::NodeNotFound(from));
        }
        if !self.contains(to) {
            return Err(NixDuError::NodeNotFound(to));
        }
        self.edges.entry(from).or_default().insert(to);
        Ok(())
    }
}

// =============================================================================
// SERIALIZATION SUPPORT
// =============================================================================

/// Serializable representation of the graph for persistence and JSON output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializableGraph {
    pub nodes: Vec<DepNode>,
    pub edges: Vec<(NodeId, NodeId)>,
}

impl From<&DepGraph> for SerializableGraph {
    fn from(graph: &DepGraph) -> Self {
        Self {
            nodes: graph.nodes.clone(),
            edges: graph.edges().collect(),
        }
    }
}

impl TryFrom<SerializableGraph> for DepGraph {
    type Error = NixDuError;

    /// Rebuild a graph; fails if an edge names a node that does not exist.
    fn try_from(sg: SerializableGraph) -> Result<Self, Self::Error> {
        let mut graph = DepGraph::new();
        for node in sg.nodes {
            graph.register_node(node)?;
        }
        for (from, to) in sg.edges {
            graph.register_edge(from, to)?;
        }
        Ok(graph)
    }
}

// =============================================================================
// TESTS
// =============================================================================
