//! # Size Statistics
//!
//! Disk-usage summary of a dependency graph: how much the store holds, how
//! much of it the gc-roots keep alive, and what a garbage collection would
//! free. Integer arithmetic only.

use crate::graph::DepGraph;
use crate::NodeId;
use serde::{Deserialize, Serialize};

/// Number of entries `largest_nodes` returns when the caller has no preference.
pub const DEFAULT_TOP_COUNT: usize = 10;

/// Binary unit suffixes used by [`format_size`].
const UNITS: [&str; 7] = ["B", "KiB", "MiB", "GiB", "TiB", "PiB", "EiB"];

// =============================================================================
// GRAPH STATS
// =============================================================================

/// Size summary of a dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStats {
    /// Total number of nodes, roots included.
    pub node_count: usize,
    /// Total number of edges.
    pub edge_count: usize,
    /// Number of gc-root nodes.
    pub root_count: usize,
    /// Roots held by running processes or daemon sessions.
    pub transient_root_count: usize,
    /// Sum of the sizes of all store nodes.
    pub total_size: u64,
    /// Sum of the sizes of store nodes reachable from a root, or from the
    /// closure start for a single-root graph.
    pub alive_size: u64,
    /// `total_size - alive_size`: what a garbage collection would free.
    pub dead_size: u64,
    /// Start artifact when the graph is the closure of a single root.
    pub closure_of: Option<NodeId>,
}

impl GraphStats {
    /// Compute statistics from a graph.
    #[must_use]
    pub fn from_graph(graph: &DepGraph) -> Self {
        let transient_root_count = graph
            .roots()
            .iter()
            .filter_map(|&id| graph.node(id))
            .filter(|node| node.is_transient_root())
            .count();

        let closure_of = closure_root(graph);
        let seeds = match closure_of {
            Some(start) => vec![start],
            None => graph.roots().to_vec(),
        };

        let total_size = graph.total_size();
        let alive_size = graph
            .reachable_from(&seeds)
            .into_iter()
            .filter_map(|id| graph.node(id))
            .filter(|node| !node.is_root)
            .fold(0u64, |acc, node| acc.saturating_add(node.size));

        Self {
            node_count: graph.node_count(),
            edge_count: graph.edge_count(),
            root_count: graph.roots().len(),
            transient_root_count,
            total_size,
            alive_size,
            dead_size: total_size.saturating_sub(alive_size),
            closure_of,
        }
    }

    /// Number of store (non-root) nodes.
    #[must_use]
    pub fn artifact_count(&self) -> usize {
        self.node_count - self.root_count
    }

    /// Share of the store that is alive, in thousandths (0 for an empty store).
    #[must_use]
    pub fn alive_permille(&self) -> u64 {
        if self.total_size == 0 {
            return 0;
        }
        (u128::from(self.alive_size) * 1000 / u128::from(self.total_size)) as u64
    }
}

/// The artifact a root-less graph is the closure of.
///
/// A single-root scan registers its start artifact first, so the graph is a
/// closure when it has no gc-root nodes and node 0 reaches every node.
#[must_use]
pub fn closure_root(graph: &DepGraph) -> Option<NodeId> {
    if !graph.roots().is_empty() || graph.node_count() == 0 {
        return None;
    }
    let start = NodeId(0);
    (graph.reachable_from(&[start]).len() == graph.node_count()).then_some(start)
}

// =============================================================================
// LARGEST NODES
// =============================================================================

/// A store node with its size, as listed by [`largest_nodes`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizedNode {
    /// Node id in the graph.
    pub id: NodeId,
    /// Short name (`hello-2.12`).
    pub name: String,
    /// Full store path.
    pub path: String,
    /// Size in bytes.
    pub size: u64,
}

/// The `n` largest store nodes, biggest first; ties go to the lower id.
#[must_use]
pub fn largest_nodes(graph: &DepGraph, n: usize) -> Vec<SizedNode> {
    let mut nodes: Vec<SizedNode> = graph
        .nodes()
        .filter(|(_, node)| !node.is_root)
        .map(|(id, node)| SizedNode {
            id,
            name: node.name().to_string(),
            path: node.path.clone(),
            size: node.size,
        })
        .collect();
    nodes.sort_by(|a, b| b.size.cmp(&a.size).then(a.id.cmp(&b.id)));
    nodes.truncate(n);
    nodes
}

// =============================================================================
// ROOT USAGE
// =============================================================================

/// A gc-root with what it keeps alive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootUsage {
    /// Node id of the root.
    pub id: NodeId,
    /// The root's link path.
    pub link: String,
    /// Store paths the root points at.
    pub targets: Vec<String>,
    /// Held by a running process rather than a link on disk.
    pub transient: bool,
    /// Size of the store closure of the root.
    pub closure_size: u64,
}

/// Every root of `graph` with the size of its closure, in id order.
///
/// Closures of different roots may overlap, so the sizes need not add up to
/// the alive size.
#[must_use]
pub fn root_usage(graph: &DepGraph) -> Vec<RootUsage> {
    graph
        .roots()
        .iter()
        .filter_map(|&id| graph.node(id).map(|node| (id, node)))
        .map(|(id, node)| {
            let targets = graph
                .neighbors(id)
                .unwrap_or_default()
                .into_iter()
                .filter_map(|target| graph.node(target))
                .map(|target| target.path.clone())
                .collect();
            let closure_size = graph
                .reachable_from(&[id])
                .into_iter()
                .filter_map(|reached| graph.node(reached))
                .filter(|reached| !reached.is_root)
                .fold(0u64, |acc, reached| acc.saturating_add(reached.size));
            RootUsage {
                id,
                link: node.path.clone(),
                targets,
                transient: node.is_transient_root(),
                closure_size,
            }
        })
        .collect()
}

// =============================================================================
// FORMATTING
// =============================================================================

/// Human-readable size with binary units and one decimal: `1.5 KiB`.
#[must_use]
pub fn format_size(bytes: u64) -> String {
    let mut unit = 0;
    let mut scale: u64 = 1;
    while unit + 1 < UNITS.len() && bytes / scale >= 1024 {
        scale *= 1024;
        unit += 1;
    }
    if unit == 0 {
        return format!("{} B", bytes);
    }
    let whole = bytes / scale;
    let tenths = u128::from(bytes % scale) * 10 / u128::from(scale);
    format!("{}.{} {}", whole, tenths, UNITS[unit])
}
