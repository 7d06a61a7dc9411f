//! # redb-backed Graph Storage
//!
//! A disk-backed copy of a [`DepGraph`] using the redb embedded database.
//!
//! A traversal always builds into the in-memory graph first; the result is
//! then written here in one write transaction, so the stored graph is either
//! the previous one or the new one, never a mix.

use crate::graph::{DepGraph, GraphSink};
use crate::{DepNode, NixDuError, NodeId};
use redb::{Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition};
use std::path::Path;

/// Table for nodes: NodeId(u64) -> postcard-encoded DepNode
const NODES: TableDefinition<u64, &[u8]> = TableDefinition::new("nodes");

/// Table for edges: (from_id, to_id) -> ()
const EDGES: TableDefinition<(u64, u64), ()> = TableDefinition::new("edges");

/// Table for metadata: key string -> value u64
const METADATA: TableDefinition<&str, u64> = TableDefinition::new("metadata");

/// Metadata key holding the number of root nodes of the stored graph.
const ROOT_COUNT_KEY: &str = "root_count";

/// A dependency graph persisted with redb.
pub struct RedbGraph {
    /// The redb database handle.
    db: Database,
}

impl std::fmt::Debug for RedbGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbGraph").finish_non_exhaustive()
    }
}

impl RedbGraph {
    /// Open or create a graph database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, NixDuError> {
        let db = Database::create(path.as_ref()).map_err(|e| NixDuError::Io(e.to_string()))?;

        // Initialize tables if they don't exist
        {
            let write_txn = db.begin_write().map_err(|e| NixDuError::Io(e.to_string()))?;
            let _ = write_txn
                .open_table(NODES)
                .map_err(|e| NixDuError::Io(e.to_string()))?;
            let _ = write_txn
                .open_table(EDGES)
                .map_err(|e| NixDuError::Io(e.to_string()))?;
            let _ = write_txn
                .open_table(METADATA)
                .map_err(|e| NixDuError::Io(e.to_string()))?;
            write_txn.commit().map_err(|e| NixDuError::Io(e.to_string()))?;
        }

        Ok(Self { db })
    }

    /// Replace the stored graph with `graph`.
    pub fn write_graph(&mut self, graph: &DepGraph) -> Result<(), NixDuError> {
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| NixDuError::Io(e.to_string()))?;
        write_txn
            .delete_table(NODES)
            .map_err(|e| NixDuError::Io(e.to_string()))?;
        write_txn
            .delete_table(EDGES)
            .map_err(|e| NixDuError::Io(e.to_string()))?;

        {
            let mut nodes_table = write_txn
                .open_table(NODES)
                .map_err(|e| NixDuError::Io(e.to_string()))?;
            for (id, node) in graph.nodes() {
                let bytes = postcard::to_allocvec(node)
                    .map_err(|e| NixDuError::Serialization(e.to_string()))?;
                nodes_table
                    .insert(u64::from(id.0), bytes.as_slice())
                    .map_err(|e| NixDuError::Io(e.to_string()))?;
            }

            let mut edges_table = write_txn
                .open_table(EDGES)
                .map_err(|e| NixDuError::Io(e.to_string()))?;
            for (from, to) in graph.edges() {
                edges_table
                    .insert((u64::from(from.0), u64::from(to.0)), ())
                    .map_err(|e| NixDuError::Io(e.to_string()))?;
            }

            let mut meta_table = write_txn
                .open_table(METADATA)
                .map_err(|e| NixDuError::Io(e.to_string()))?;
            meta_table
                .insert(ROOT_COUNT_KEY, graph.roots().len() as u64)
                .map_err(|e| NixDuError::Io(e.to_string()))?;
        }

        write_txn.commit().map_err(|e| NixDuError::Io(e.to_string()))?;
        tracing::debug!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            "graph written to redb"
        );
        Ok(())
    }

    /// Read the stored graph back into memory.
    pub fn load_graph(&self) -> Result<DepGraph, NixDuError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| NixDuError::Io(e.to_string()))?;
        let mut graph = DepGraph::new();

        let nodes_table = read_txn
            .open_table(NODES)
            .map_err(|e| NixDuError::Io(e.to_string()))?;
        for entry in nodes_table.iter().map_err(|e| NixDuError::Io(e.to_string()))? {
            let (key, value) = entry.map_err(|e| NixDuError::Io(e.to_string()))?;
            let node: DepNode = postcard::from_bytes(value.value())
                .map_err(|e| NixDuError::Deserialization(e.to_string()))?;
            let id = graph.register_node(node)?;
            if u64::from(id.0) != key.value() {
                return Err(NixDuError::Deserialization(format!(
                    "node ids are not dense: expected {}, found {}",
                    id.0,
                    key.value()
                )));
            }
        }

        let edges_table = read_txn
            .open_table(EDGES)
            .map_err(|e| NixDuError::Io(e.to_string()))?;
        for entry in edges_table.iter().map_err(|e| NixDuError::Io(e.to_string()))? {
            let (key, _) = entry.map_err(|e| NixDuError::Io(e.to_string()))?;
            let (from, to) = key.value();
            graph.register_edge(node_id(from)?, node_id(to)?)?;
        }

        Ok(graph)
    }

    /// Number of stored nodes.
    pub fn node_count(&self) -> Result<usize, NixDuError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| NixDuError::Io(e.to_string()))?;
        let nodes_table = read_txn
            .open_table(NODES)
            .map_err(|e| NixDuError::Io(e.to_string()))?;
        let count = nodes_table.len().map_err(|e| NixDuError::Io(e.to_string()))?;
        Ok(count as usize)
    }

    /// Number of stored edges.
    pub fn edge_count(&self) -> Result<usize, NixDuError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| NixDuError::Io(e.to_string()))?;
        let edges_table = read_txn
            .open_table(EDGES)
            .map_err(|e| NixDuError::Io(e.to_string()))?;
        let count = edges_table.len().map_err(|e| NixDuError::Io(e.to_string()))?;
        Ok(count as usize)
    }

    /// Number of root nodes recorded by the last `write_graph`.
    pub fn root_count(&self) -> Result<usize, NixDuError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| NixDuError::Io(e.to_string()))?;
        let meta_table = read_txn
            .open_table(METADATA)
            .map_err(|e| NixDuError::Io(e.to_string()))?;
        let count = meta_table
            .get(ROOT_COUNT_KEY)
            .map_err(|e| NixDuError::Io(e.to_string()))?
            .map(|v| v.value())
            .unwrap_or(0);
        Ok(count as usize)
    }

    /// Compact the database, releasing the pages of replaced graphs.
    pub fn compact(&mut self) -> Result<(), NixDuError> {
        self.db
            .compact()
            .map_err(|e| NixDuError::Io(e.to_string()))?;
        Ok(())
    }
}

fn node_id(raw: u64) -> Result<NodeId, NixDuError> {
    u32::try_from(raw)
        .map(NodeId)
        .map_err(|_| NixDuError::Deserialization(format!("node id {} out of range", raw)))
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample() -> DepGraph {
        let mut graph = DepGraph::new();
        let a = graph
            .register_node(DepNode::artifact("/nix/store/aaa-a", 100))
            .expect("insert node");
        let b = graph
            .register_node(DepNode::artifact("/nix/store/bbb-b", 50))
            .expect("insert node");
        let root = graph
            .register_node(DepNode::root("/run/current-system"))
            .expect("insert node");
        graph.register_edge(a, b).expect("insert edge");
        graph.register_edge(root, a).expect("insert edge");
        graph
    }

    #[test]
    fn write_and_load() {
        let temp = tempdir().expect("temp dir");
        let db_path = temp.path().join("test.redb");
        let mut store = RedbGraph::open(&db_path).expect("open db");
        let graph = sample();

        store.write_graph(&graph).expect("write");

        assert_eq!(store.node_count().expect("count"), 3);
        assert_eq!(store.edge_count().expect("count"), 2);
        assert_eq!(store.root_count().expect("count"), 1);
        assert_eq!(store.load_graph().expect("load"), graph);
    }

    #[test]
    fn persistence() {
        let temp = tempdir().expect("temp dir");
        let db_path = temp.path().join("test.redb");

        {
            let mut store = RedbGraph::open(&db_path).expect("open db");
            store.write_graph(&sample()).expect("write");
        }

        {
            let store = RedbGraph::open(&db_path).expect("open db");
            let loaded = store.load_graph().expect("load");
            assert_eq!(loaded.node_count(), 3);
            assert!(loaded.roots_coherent());
        }
    }

    #[test]
    fn write_replaces_previous_graph() {
        let temp = tempdir().expect("temp dir");
        let db_path = temp.path().join("test.redb");
        let mut store = RedbGraph::open(&db_path).expect("open db");
        store.write_graph(&sample()).expect("write");

        let mut small = DepGraph::new();
        small
            .register_node(DepNode::artifact("/nix/store/ccc-c", 1))
            .expect("insert node");
        store.write_graph(&small).expect("write");

        assert_eq!(store.node_count().expect("count"), 1);
        assert_eq!(store.edge_count().expect("count"), 0);
        assert_eq!(store.root_count().expect("count"), 0);
    }

    #[test]
    fn empty_database_loads_empty_graph() {
        let temp = tempdir().expect("temp dir");
        let store = RedbGraph::open(temp.path().join("empty.redb")).expect("open db");
        let graph = store.load_graph().expect("load");
        assert_eq!(graph.node_count(), 0);
    }

    #[test]
    fn compact_after_replace_keeps_latest_graph() {
        let temp = tempdir().expect("temp dir");
        let db_path = temp.path().join("c.redb");
        let mut store = RedbGraph::open(&db_path).expect("open db");
        store.write_graph(&sample()).expect("write");

        let mut small = DepGraph::new();
        small
            .register_node(DepNode::artifact("/nix/store/ccc-c", 1))
            .expect("insert node");
        store.write_graph(&small).expect("write");
        store.compact().expect("compact");
        drop(store);

        let reopened = RedbGraph::open(&db_path).expect("reopen db");
        assert_eq!(reopened.load_graph().expect("load"), small);
    }
}
