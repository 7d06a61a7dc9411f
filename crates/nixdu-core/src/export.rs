//! # Canonical Export Module
//!
//! redb files are not bit-identical across runs, so graphs are compared and
//! shipped through a canonical `postcard` stream instead: nodes sorted by id,
//! edges sorted by `(from, to)`, behind a small header carrying counts and a
//! checksum.
//!
//! Format:
//! ```text
//! [header_len: u32 LE] [CanonicalHeader (postcard)] [CanonicalGraph (postcard)]
//! ```

use crate::graph::{DepGraph, GraphSink};
use crate::{DepNode, NixDuError, NodeId};
use serde::{Deserialize, Serialize};

// =============================================================================
// CANONICAL FORMAT
// =============================================================================

/// Magic bytes for canonical export format.
pub const CANONICAL_MAGIC: [u8; 4] = *b"NDUX"; // nix-du export

/// Current canonical format version.
pub const CANONICAL_VERSION: u8 = 1;

/// Maximum allowed node count in canonical imports.
///
/// Large NixOS stores hold a few hundred thousand paths.
pub const MAX_IMPORT_NODE_COUNT: u64 = 10_000_000;

/// Maximum allowed edge count in canonical imports.
pub const MAX_IMPORT_EDGE_COUNT: u64 = 100_000_000;

/// Header for canonical export files.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CanonicalHeader {
    /// Magic bytes to identify the format.
    pub magic: [u8; 4],

    /// Format version for compatibility.
    pub version: u8,

    /// Number of nodes in the export.
    pub node_count: u64,

    /// Number of edges in the export.
    pub edge_count: u64,

    /// Checksum of the data section (simple XOR-based for determinism).
    pub checksum: u64,
}

impl CanonicalHeader {
    /// Create a new header with the given counts.
    #[must_use]
    pub fn new(node_count: u64, edge_count: u64, checksum: u64) -> Self {
        Self {
            magic: CANONICAL_MAGIC,
            version: CANONICAL_VERSION,
            node_count,
            edge_count,
            checksum,
        }
    }

    /// Validate magic and version.
    pub fn validate(&self) -> Result<(), NixDuError> {
        if self.magic != CANONICAL_MAGIC {
            return Err(NixDuError::Deserialization(
                "Invalid file format".to_string(),
            ));
        }
        if self.version != CANONICAL_VERSION {
            return Err(NixDuError::Deserialization(
                "Unsupported file version".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// CANONICAL NODE & EDGE (Sorted, Deterministic)
// =============================================================================

/// A node in canonical format.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct CanonicalNode {
    /// The node ID (sort key).
    pub id: u32,
    /// Store path or root link.
    pub path: String,
    /// Size in bytes.
    pub size: u64,
    /// Whether the node is a gc-root.
    pub is_root: bool,
}

/// An edge in canonical format, sorted by `(from, to)`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct CanonicalEdge {
    /// Source node ID.
    pub from: u32,
    /// Target node ID.
    pub to: u32,
}

// =============================================================================
// CANONICAL GRAPH (Sorted, Deterministic)
// =============================================================================

/// A graph in canonical format for bit-exact serialization.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CanonicalGraph {
    /// Nodes sorted by id.
    pub nodes: Vec<CanonicalNode>,

    /// Edges sorted by (from, to).
    pub edges: Vec<CanonicalEdge>,
}

impl CanonicalGraph {
    /// Create a canonical graph from a dependency graph.
    #[must_use]
    pub fn from_graph(graph: &DepGraph) -> Self {
        // DepGraph iterates nodes by id and edges by (from, to) already.
        let nodes = graph
            .nodes()
            .map(|(id, node)| CanonicalNode {
                id: id.0,
                path: node.path.clone(),
                size: node.size,
                is_root: node.is_root,
            })
            .collect();
        let edges = graph
            .edges()
            .map(|(from, to)| CanonicalEdge {
                from: from.0,
                to: to.0,
            })
            .collect();
        Self { nodes, edges }
    }

    /// Rebuild a dependency graph, checking that ids are dense.
    pub fn to_graph(&self) -> Result<DepGraph, NixDuError> {
        let mut graph = DepGraph::new();
        for cn in &self.nodes {
            let node = DepNode {
                path: cn.path.clone(),
                size: cn.size,
                is_root: cn.is_root,
            };
            let id = graph.register_node(node)?;
            if id.0 != cn.id {
                return Err(NixDuError::Deserialization(format!(
                    "Node ids are not dense: expected {}, found {}",
                    id.0, cn.id
                )));
            }
        }
        for ce in &self.edges {
            graph
                .register_edge(NodeId(ce.from), NodeId(ce.to))
                .map_err(|e| NixDuError::Deserialization(e.to_string()))?;
        }
        Ok(graph)
    }

    /// Compute a deterministic checksum of the data.
    ///
    /// XOR-based, no floating point, no randomness. This detects accidental
    /// corruption; it is **NOT** a cryptographic hash. Use
    /// `canonical_crypto_hash` (feature `crypto-hash`) to detect tampering.
    #[must_use]
    pub fn checksum(&self) -> u64 {
        let mut hash: u64 = 0;

        for node in &self.nodes {
            hash ^= u64::from(node.id).rotate_left(13);
            hash ^= node.size.rotate_left(7);
            hash ^= u64::from(node.is_root).rotate_left(3);
            for (i, byte) in node.path.bytes().enumerate() {
                hash ^= (u64::from(byte) ^ u64::from(node.id)).rotate_left((i % 64) as u32);
            }
        }

        for edge in &self.edges {
            hash ^= u64::from(edge.from).rotate_left(17);
            hash ^= u64::from(edge.to).rotate_left(11);
        }

        hash
    }
}

// =============================================================================
// EXPORT FUNCTIONS
// =============================================================================

/// Export a graph to canonical postcard format.
pub fn export_canonical(graph: &DepGraph) -> Result<Vec<u8>, NixDuError> {
    let canonical = CanonicalGraph::from_graph(graph);
    let checksum = canonical.checksum();

    let header = CanonicalHeader::new(
        canonical.nodes.len() as u64,
        canonical.edges.len() as u64,
        checksum,
    );

    let header_bytes = postcard::to_allocvec(&header)
        .map_err(|e| NixDuError::Serialization(format!("Header: {}", e)))?;
    let data_bytes = postcard::to_allocvec(&canonical)
        .map_err(|e| NixDuError::Serialization(format!("Data: {}", e)))?;

    // Combine: [header_len: u32] [header] [data]
    let mut result = Vec::with_capacity(4 + header_bytes.len() + data_bytes.len());
    result.extend_from_slice(&(header_bytes.len() as u32).to_le_bytes());
    result.extend_from_slice(&header_bytes);
    result.extend_from_slice(&data_bytes);

    Ok(result)
}

/// Import a graph from canonical postcard format.
///
/// Error messages are generic; they name the failing check, not the bytes.
pub fn import_canonical(data: &[u8]) -> Result<DepGraph, NixDuError> {
    let Some((len_bytes, rest)) = data.split_first_chunk::<4>() else {
        return Err(NixDuError::Deserialization("Data too short".to_string()));
    };
    let header_len = u32::from_le_bytes(*len_bytes) as usize;
    if rest.len() < header_len {
        return Err(NixDuError::Deserialization(
            "Data too short for header".to_string(),
        ));
    }
    let (header_bytes, payload) = rest.split_at(header_len);

    let header: CanonicalHeader = postcard::from_bytes(header_bytes)
        .map_err(|e| NixDuError::Deserialization(format!("Header: {}", e)))?;
    header.validate()?;

    // Validate size limits BEFORE decoding the payload
    if header.node_count > MAX_IMPORT_NODE_COUNT {
        return Err(NixDuError::Deserialization(format!(
            "Node count {} exceeds maximum allowed {}",
            header.node_count, MAX_IMPORT_NODE_COUNT
        )));
    }
    if header.edge_count > MAX_IMPORT_EDGE_COUNT {
        return Err(NixDuError::Deserialization(format!(
            "Edge count {} exceeds maximum allowed {}",
            header.edge_count, MAX_IMPORT_EDGE_COUNT
        )));
    }

    let canonical: CanonicalGraph = postcard::from_bytes(payload)
        .map_err(|e| NixDuError::Deserialization(format!("Data: {}", e)))?;

    let computed = canonical.checksum();
    if computed != header.checksum {
        return Err(NixDuError::Deserialization(format!(
            "Checksum mismatch: expected {}, got {}",
            header.checksum, computed
        )));
    }
    if canonical.nodes.len() as u64 != header.node_count {
        return Err(NixDuError::Deserialization(
            "Node count mismatch".to_string(),
        ));
    }
    if canonical.edges.len() as u64 != header.edge_count {
        return Err(NixDuError::Deserialization(
            "Edge count mismatch".to_string(),
        ));
    }

    canonical.to_graph()
}

/// Compute the canonical checksum of a graph.
#[must_use]
pub fn canonical_checksum(graph: &DepGraph) -> u64 {
    CanonicalGraph::from_graph(graph).checksum()
}

// =============================================================================
// CRYPTOGRAPHIC HASH SUPPORT
// =============================================================================

/// BLAKE3 hash of the canonical export, as 64 hex characters.
#[cfg(feature = "crypto-hash")]
pub fn canonical_crypto_hash(graph: &DepGraph) -> Result<String, NixDuError> {
    let data = export_canonical(graph)?;
    Ok(compute_blake3_hash(&data))
}

/// BLAKE3 hash of raw bytes, as 64 hex characters.
#[cfg(feature = "crypto-hash")]
#[must_use]
pub fn compute_blake3_hash(data: &[u8]) -> String {
    blake3::hash(data).to_hex().to_string()
}

// =============================================================================
// TESTS
// =============================================================================
