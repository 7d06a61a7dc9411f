//! # Visited Index
//!
//! Per-traversal bookkeeping: which artifacts already have a node, under
//! which id, and with which metadata.
//!
//! The index owns the node-id counter. Every node, artifact or root, goes
//! through [`VisitedIndex::emit`], which checks that the sink assigned the id
//! the traversal expected.

use crate::graph::GraphSink;
use crate::store::StoreOracle;
use crate::{DepNode, NixDuError, NodeId, PathInfo, StorePath};
use std::collections::BTreeMap;
use std::rc::Rc;

/// Outcome of [`VisitedIndex::resolve`].
#[derive(Debug, Clone)]
pub struct Visit {
    /// Whether the artifact already had a node before this call.
    pub cached: bool,
    /// Node id of the artifact.
    pub id: NodeId,
    /// Metadata fetched when the artifact was first seen.
    pub info: Rc<PathInfo>,
}

/// Mapping from artifact identity to its node id and cached metadata.
#[derive(Debug, Default)]
pub struct VisitedIndex {
    entries: BTreeMap<StorePath, (NodeId, Rc<PathInfo>)>,
    next_id: u32,
}

impl VisitedIndex {
    /// Create an empty index; the first node gets id 0.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up `path`, registering it on first sight.
    ///
    /// The first call fetches metadata from `oracle` and emits a node to
    /// `sink`; later calls return the cached entry and touch neither.
    pub fn resolve<O, S>(
        &mut self,
        oracle: &O,
        sink: &mut S,
        path: &StorePath,
    ) -> Result<Visit, NixDuError>
    where
        O: StoreOracle + ?Sized,
        S: GraphSink + ?Sized,
    {
        if let Some((id, info)) = self.entries.get(path) {
            return Ok(Visit {
                cached: true,
                id: *id,
                info: Rc::clone(info),
            });
        }

        let info = Rc::new(oracle.query_path_info(path)?);
        let id = self.emit(sink, DepNode::artifact(info.path.clone(), info.nar_size))?;
        self.entries.insert(path.clone(), (id, Rc::clone(&info)));
        Ok(Visit {
            cached: false,
            id,
            info,
        })
    }

    /// Emit a node at the next sequential id.
    pub fn emit<S>(&mut self, sink: &mut S, node: DepNode) -> Result<NodeId, NixDuError>
    where
        S: GraphSink + ?Sized,
    {
        let expected = NodeId(self.next_id);
        let actual = sink.register_node(node)?;
        if actual != expected {
            return Err(NixDuError::SinkOutOfSync { expected, actual });
        }
        self.next_id = self
            .next_id
            .checked_add(1)
            .ok_or(NixDuError::CapacityExceeded(u64::from(u32::MAX)))?;
        Ok(actual)
    }

    /// Node id of `path`, if it has one.
    #[must_use]
    pub fn get(&self, path: &StorePath) -> Option<NodeId> {
        self.entries.get(path).map(|(id, _)| *id)
    }

    /// Number of artifacts registered.
    #[must_use]
    pub fn artifact_count(&self) -> usize {
        self.entries.len()
    }

    /// Number of nodes emitted, roots included.
    #[must_use]
    pub fn node_count(&self) -> u32 {
        self.next_id
    }
}
