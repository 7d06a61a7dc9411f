//! # Traversal Engine
//!
//! Builds the dependency graph of a store into a [`GraphSink`].
//!
//! Two modes:
//! - **Full store** (`root = None`): every valid artifact becomes a node, then
//!   every gc-root with a valid target becomes a root node with one edge.
//! - **Single root**: only the closure of one artifact, without root nodes.
//!
//! The traversal is a worklist walk. Each artifact is registered when first
//! discovered and expanded at most once. Node ids are handed out in discovery
//! order; their values carry no meaning beyond that.

use crate::graph::GraphSink;
use crate::policy::GcPolicy;
use crate::store::StoreOracle;
use crate::visited::VisitedIndex;
use crate::{DepNode, NixDuError, NodeId, RootSpec, StorePath};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Counts reported by a successful traversal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopulateStats {
    /// Store artifacts registered as nodes.
    pub artifact_nodes: usize,
    /// Gc-roots registered as nodes.
    pub root_nodes: usize,
    /// Edges emitted to the sink (before any deduplication by the sink).
    pub edges: usize,
    /// Gc-roots skipped because their target is not valid.
    pub skipped_roots: usize,
}

/// Build the dependency graph of `oracle` into `sink`.
///
/// With `root = None` the whole store is dumped, followed by its gc-roots.
/// Otherwise only the closure of the given root is dumped.
///
/// # Errors
///
/// - [`NixDuError::InvalidRoot`] if `root` does not resolve to a valid
///   artifact; nothing has been emitted in that case.
/// - Any oracle or sink failure, which aborts the traversal. Nodes and
///   edges already emitted are left in the sink.
pub fn populate_graph<O, S>(
    oracle: &O,
    sink: &mut S,
    root: Option<&RootSpec>,
    policy: GcPolicy,
) -> Result<PopulateStats, NixDuError>
where
    O: StoreOracle + ?Sized,
    S: GraphSink + ?Sized,
{
    let seeds: Vec<StorePath> = match root {
        None => oracle.query_all_valid_paths()?.into_iter().collect(),
        Some(spec) => vec![resolve_root(oracle, spec)?],
    };
    tracing::debug!(
        seeds = seeds.len(),
        full_store = root.is_none(),
        keep_derivations = policy.keep_derivations,
        keep_outputs = policy.keep_outputs,
        "starting traversal"
    );

    let mut walk = Traversal {
        oracle,
        sink,
        policy,
        index: VisitedIndex::new(),
        worklist: seeds,
        expanded: BTreeSet::new(),
        stats: PopulateStats::default(),
    };
    walk.run()?;
    if root.is_none() {
        walk.register_roots()?;
    }

    let mut stats = walk.stats;
    stats.artifact_nodes = walk.index.artifact_count();
    tracing::debug!(
        artifacts = stats.artifact_nodes,
        roots = stats.root_nodes,
        edges = stats.edges,
        skipped_roots = stats.skipped_roots,
        "traversal complete"
    );
    Ok(stats)
}

/// Turn the caller's root argument into a valid artifact.
///
/// Makes no sink call, so a bad root leaves the sink untouched.
fn resolve_root<O>(oracle: &O, spec: &RootSpec) -> Result<StorePath, NixDuError>
where
    O: StoreOracle + ?Sized,
{
    let path = match spec {
        RootSpec::Path(path) => path.clone(),
        RootSpec::Link(link) => match oracle.follow_links_to_store_path(link) {
            Ok(path) => path,
            Err(NixDuError::Resolution(reason)) => {
                return Err(NixDuError::InvalidRoot(format!("{}: {}", link, reason)));
            }
            Err(e) => return Err(e),
        },
    };
    if !oracle.is_valid_path(&path)? {
        return Err(NixDuError::InvalidRoot(format!(
            "{} is not a valid store path",
            spec
        )));
    }
    Ok(path)
}

// =============================================================================
// TRAVERSAL STATE
// =============================================================================

/// State of one invocation; dropped when the traversal returns.
struct Traversal<'a, O: ?Sized, S: ?Sized> {
    oracle: &'a O,
    sink: &'a mut S,
    policy: GcPolicy,
    index: VisitedIndex,
    worklist: Vec<StorePath>,
    expanded: BTreeSet<StorePath>,
    stats: PopulateStats,
}

impl<O, S> Traversal<'_, O, S>
where
    O: StoreOracle + ?Sized,
    S: GraphSink + ?Sized,
{
    fn run(&mut self) -> Result<(), NixDuError> {
        while let Some(path) = self.worklist.pop() {
            if self.expanded.contains(&path) {
                continue;
            }
            self.expand(&path)?;
            self.expanded.insert(path);
        }
        Ok(())
    }

    /// Emit the edges of one artifact and queue what it newly discovered.
    fn expand(&mut self, path: &StorePath) -> Result<(), NixDuError> {
        let visit = self.index.resolve(self.oracle, &mut *self.sink, path)?;
        tracing::trace!(path = %path, id = %visit.id, refs = visit.info.references.len(), "expanding");

        for reference in &visit.info.references {
            let target = self.index.resolve(self.oracle, &mut *self.sink, reference)?;
            self.edge(visit.id, target.id)?;
            if !target.cached {
                self.worklist.push(reference.clone());
            }
        }

        if !self.policy.keeps_deriver_edges() {
            return Ok(());
        }
        let Some(deriver) = visit.info.deriver.as_ref() else {
            return Ok(());
        };
        let deriver_valid =
            self.index.get(deriver).is_some() || self.oracle.is_valid_path(deriver)?;
        if !deriver_valid {
            return Ok(());
        }
        let drv = self.index.resolve(self.oracle, &mut *self.sink, deriver)?;
        if self.policy.keep_derivations {
            self.edge(visit.id, drv.id)?;
        }
        if self.policy.keep_outputs {
            self.edge(drv.id, visit.id)?;
        }
        if !drv.cached {
            self.worklist.push(deriver.clone());
        }
        Ok(())
    }

    /// One root node and one edge per gc-root whose target is valid.
    fn register_roots(&mut self) -> Result<(), NixDuError> {
        for root in self.oracle.find_roots()? {
            if !self.oracle.is_valid_path(&root.target)? {
                tracing::warn!(link = %root.link, target = %root.target, "skipping root to invalid path");
                self.stats.skipped_roots += 1;
                continue;
            }
            let root_id = self.index.emit(&mut *self.sink, DepNode::root(root.link))?;
            let target = self.index.resolve(self.oracle, &mut *self.sink, &root.target)?;
            self.edge(root_id, target.id)?;
            self.stats.root_nodes += 1;
        }
        Ok(())
    }

    fn edge(&mut self, from: NodeId, to: NodeId) -> Result<(), NixDuError> {
        self.sink.register_edge(from, to)?;
        self.stats.edges += 1;
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
