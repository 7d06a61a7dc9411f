//! # nixdu-core
//!
//! The dependency graph engine for nix-du.
//!
//! This crate walks the metadata of a content-addressed package store (the
//! Nix store), discovers every artifact, its run-time references and its
//! deriver, and emits a deduplicated node/edge stream to a graph sink. Gc-roots
//! become first-class nodes so that disk usage can be attributed to them.
//!
//! ## Layout
//!
//! - `types`: identities, metadata, nodes and the error enum
//! - `policy`: the store's GC settings (`keep-derivations`, `keep-outputs`)
//! - `store`: the read-only store oracle and its implementations
//! - `visited` + `depgraph`: the traversal engine
//! - `graph` + `storage`: in-memory and redb-backed graphs
//! - `export`: canonical postcard export
//! - `system`: size statistics
//!
//! ## Architectural Constraints
//!
//! - Single-threaded and synchronous; no async, no network
//! - Read-only with respect to the store
//! - Deterministic containers (`BTreeMap`/`BTreeSet`), integer arithmetic only

// =============================================================================
// MODULES
// =============================================================================

pub mod depgraph;
pub mod export;
pub mod graph;
pub mod policy;
pub mod primitives;
pub mod storage;
pub mod store;
pub mod system;
pub mod types;
pub mod visited;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{DepNode, GcRoot, NixDuError, NodeId, PathInfo, RootSpec, StorePath};

// =============================================================================
// RE-EXPORTS: Graph Engine
// =============================================================================

pub use depgraph::{PopulateStats, populate_graph};
pub use export::{
    CanonicalGraph, CanonicalHeader, canonical_checksum, export_canonical, import_canonical,
};
#[cfg(feature = "crypto-hash")]
pub use export::{canonical_crypto_hash, compute_blake3_hash};
pub use graph::{DepGraph, GraphSink, SerializableGraph};
pub use policy::GcPolicy;
pub use storage::RedbGraph;
pub use store::{MemoryStore, StoreOracle};
#[cfg(feature = "nix-db")]
pub use store::NixDbStore;
pub use visited::{Visit, VisitedIndex};

// =============================================================================
// RE-EXPORTS: System (from system module)
// =============================================================================

pub use system::{
    DEFAULT_TOP_COUNT, GraphStats, RootUsage, SizedNode, closure_root, format_size, largest_nodes,
    root_usage,
};
