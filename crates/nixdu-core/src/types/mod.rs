//! # Core Type Definitions
//!
//! This module contains all core types for the store dependency graph:
//! - Artifact identity and metadata (`StorePath`, `PathInfo`)
//! - Graph identifiers and node records (`NodeId`, `DepNode`)
//! - External keep-alive entries (`GcRoot`) and traversal seeds (`RootSpec`)
//! - Error types (`NixDuError`)
//!
//! ## Determinism Guarantees
//!
//! All identity types implement `Ord` so they can live in `BTreeMap`/`BTreeSet`,
//! and sizes are plain integers (no floating-point).

use crate::primitives::TRANSIENT_ROOT_PREFIXES;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;

// =============================================================================
// ARTIFACT IDENTITY
// =============================================================================

/// Identity of a store artifact: the store-relative base name `<hash>-<name>`.
///
/// Equality, ordering and hashing are defined on this name alone; the store
/// directory is a property of the oracle, not of the identity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StorePath(String);

impl StorePath {
    /// Create a store path from its base name.
    ///
    /// The name must have a non-empty hash part, a `-`, a non-empty name part,
    /// and no `/`.
    pub fn new(base: impl Into<String>) -> Result<Self, NixDuError> {
        let base = base.into();
        let valid = !base.contains('/')
            && base
                .split_once('-')
                .is_some_and(|(hash, name)| !hash.is_empty() && !name.is_empty());
        if valid {
            Ok(Self(base))
        } else {
            Err(NixDuError::Resolution(format!(
                "'{}' is not a valid store path name",
                base
            )))
        }
    }

    /// Parse an absolute path below `store_dir` into the artifact it belongs to.
    ///
    /// Anything after the first component is dropped, so
    /// `/nix/store/<hash>-foo/bin/foo` resolves to `<hash>-foo`.
    pub fn parse(store_dir: &str, path: &str) -> Result<Self, NixDuError> {
        let store_dir = store_dir.trim_end_matches('/');
        let rest = path
            .strip_prefix(store_dir)
            .and_then(|rest| rest.strip_prefix('/'))
            .ok_or_else(|| {
                NixDuError::Resolution(format!("path '{}' is not in the store", path))
            })?;
        let base = rest.split('/').next().unwrap_or_default();
        Self::new(base)
    }

    /// The base name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Absolute path of this artifact inside `store_dir`.
    #[must_use]
    pub fn to_absolute(&self, store_dir: &str) -> String {
        format!("{}/{}", store_dir.trim_end_matches('/'), self.0)
    }
}

impl fmt::Display for StorePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for StorePath {
    type Error = NixDuError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<StorePath> for String {
    fn from(path: StorePath) -> Self {
        path.0
    }
}

// =============================================================================
// ARTIFACT METADATA
// =============================================================================

/// Metadata of a valid store artifact, fetched at most once per traversal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathInfo {
    /// Absolute store path, used as the node's display path.
    pub path: String,
    /// On-disk size of the artifact in bytes.
    pub nar_size: u64,
    /// Artifacts this one references at run time.
    #[serde(default)]
    pub references: BTreeSet<StorePath>,
    /// The derivation that built this artifact, if recorded.
    #[serde(default)]
    pub deriver: Option<StorePath>,
}

impl PathInfo {
    /// Metadata with no references and no deriver.
    #[must_use]
    pub fn new(path: impl Into<String>, nar_size: u64) -> Self {
        Self {
            path: path.into(),
            nar_size,
            references: BTreeSet::new(),
            deriver: None,
        }
    }
}

// =============================================================================
// GRAPH NODES
// =============================================================================

/// Dense node identifier, assigned in discovery order starting at 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl NodeId {
    /// The id as a vector index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "N{}", self.0)
    }
}

/// A node of the dependency graph: either a store artifact or a gc-root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepNode {
    /// Absolute store path, or the link path for a root.
    pub path: String,
    /// Size in bytes. For roots, the byte length of the link path.
    pub size: u64,
    /// Whether this node is an external keep-alive entry.
    pub is_root: bool,
}

impl DepNode {
    /// Node for a store artifact.
    #[must_use]
    pub fn artifact(path: impl Into<String>, size: u64) -> Self {
        Self {
            path: path.into(),
            size,
            is_root: false,
        }
    }

    /// Node for a gc-root; its size is the length of the link path.
    #[must_use]
    pub fn root(link: impl Into<String>) -> Self {
        let path = link.into();
        Self {
            size: path.len() as u64,
            path,
            is_root: true,
        }
    }

    /// Return `blah` when the path is `/nix/store/<hash>-blah`.
    ///
    /// Roots keep their whole link path. Malformed store paths may
    /// return a bigger slice of the path.
    #[must_use]
    pub fn name(&self) -> &str {
        if self.is_root {
            return &self.path;
        }
        let last = match self.path.rfind('/') {
            Some(i) => &self.path[i + 1..],
            None => &self.path,
        };
        match last.find('-') {
            Some(i) => &last[i + 1..],
            None => last,
        }
    }

    /// Roots held by a running process or a temporary gc-root of the daemon.
    #[must_use]
    pub fn is_transient_root(&self) -> bool {
        TRANSIENT_ROOT_PREFIXES
            .iter()
            .any(|prefix| self.path.starts_with(prefix))
    }
}

// =============================================================================
// ROOTS
// =============================================================================

/// An external keep-alive entry: a link outside the store protecting an artifact.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GcRoot {
    /// Path of the link (or pseudo-path such as `{memory:12}`).
    pub link: String,
    /// The artifact kept alive by the link.
    pub target: StorePath,
}

impl GcRoot {
    /// Create a new root.
    #[must_use]
    pub fn new(link: impl Into<String>, target: StorePath) -> Self {
        Self {
            link: link.into(),
            target,
        }
    }
}

/// Seed of a single-root traversal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RootSpec {
    /// A bare artifact identity.
    Path(StorePath),
    /// A filesystem path (possibly a chain of links) to resolve to an artifact.
    Link(String),
}

impl fmt::Display for RootSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => write!(f, "{}", path),
            Self::Link(link) => f.write_str(link),
        }
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur while reading a store or building its graph.
///
/// Every failure aborts the traversal; nothing is retried.
#[derive(Debug, Error)]
pub enum NixDuError {
    /// The requested root does not resolve to a valid store artifact.
    #[error("Invalid root: {0}")]
    InvalidRoot(String),

    /// The store has no metadata for an artifact it reported as valid.
    #[error("Store inconsistency: no metadata for {0}")]
    PathNotFound(StorePath),

    /// A path could not be resolved to a store artifact.
    #[error("Resolution error: {0}")]
    Resolution(String),

    /// The sink assigned a node id different from the next sequential one.
    #[error("Graph sink out of sync: expected node {expected}, got {actual}")]
    SinkOutOfSync {
        /// Id the traversal assigned.
        expected: NodeId,
        /// Id the sink returned.
        actual: NodeId,
    },

    /// The graph cannot hold any more nodes.
    #[error("Graph capacity exceeded: at most {0} nodes")]
    CapacityExceeded(u64),

    /// The requested node was not found in the graph.
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    /// A serialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A deserialization error occurred.
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(String),

    /// The store backend failed (database error, unreadable metadata).
    #[error("Store error: {0}")]
    Store(String),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_path_absolute_form() {
        let path = StorePath::new("0c7c1l3r1y6lmc2cvg2j6vd1r1ch9c4c-hello-2.12").expect("valid");
        assert_eq!(path.as_str(), "0c7c1l3r1y6lmc2cvg2j6vd1r1ch9c4c-hello-2.12");
        assert_eq!(
            path.to_absolute("/nix/store/"),
            "/nix/store/0c7c1l3r1y6lmc2cvg2j6vd1r1ch9c4c-hello-2.12"
        );
    }

    #[test]
    fn store_path_rejects_malformed_names() {
        assert!(StorePath::new("nohyphen").is_err());
        assert!(StorePath::new("-noname").is_err());
        assert!(StorePath::new("hash-").is_err());
        assert!(StorePath::new("a/b-c").is_err());
    }

    #[test]
    fn parse_drops_subpaths() {
        let path = StorePath::parse("/nix/store", "/nix/store/abc-foo/bin/foo").expect("parse");
        assert_eq!(path.as_str(), "abc-foo");
    }

    #[test]
    fn parse_rejects_outside_store() {
        assert!(StorePath::parse("/nix/store", "/etc/abc-foo").is_err());
        assert!(StorePath::parse("/nix/store", "/nix/storefoo/abc-foo").is_err());
        assert!(StorePath::parse("/nix/store", "/nix/store").is_err());
    }

    #[test]
    fn store_path_serde_validates() {
        let ok: StorePath = serde_json::from_str("\"abc-foo\"").expect("deserialize");
        assert_eq!(ok.as_str(), "abc-foo");
        assert!(serde_json::from_str::<StorePath>("\"garbage\"").is_err());
    }

    #[test]
    fn node_name_strips_store_prefix() {
        let node = DepNode::artifact("/nix/store/abc-blah-1.0", 10);
        assert_eq!(node.name(), "blah-1.0");

        let root = DepNode::root("/home/user/result");
        assert_eq!(root.name(), "/home/user/result");
    }

    #[test]
    fn node_name_on_malformed_path() {
        assert_eq!(DepNode::artifact("/nix/store/nohyphen", 1).name(), "nohyphen");
        assert_eq!(DepNode::artifact("bare-name", 1).name(), "name");
    }

    #[test]
    fn root_size_is_link_length() {
        let root = DepNode::root("/run/current-system");
        assert_eq!(root.size, 19);
        assert!(root.is_root);
    }

    #[test]
    fn transient_roots_detected() {
        assert!(DepNode::root("{memory:3}").is_transient_root());
        assert!(DepNode::root("{temp:42}").is_transient_root());
        assert!(!DepNode::root("/proc/12/maps").is_transient_root());
    }
}
