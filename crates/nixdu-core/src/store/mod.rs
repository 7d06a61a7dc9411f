//! # Store Oracle
//!
//! The read-only view of the package store the traversal consults: path
//! validity, per-path metadata, the full set of valid paths, link resolution
//! and gc-root enumeration.
//!
//! Two implementations are provided:
//! - [`MemoryStore`]: an in-memory store, also loadable from a JSON snapshot.
//! - [`NixDbStore`]: the local Nix store, read straight from its SQLite
//!   database (feature `nix-db`).

mod memory;
#[cfg(feature = "nix-db")]
mod nixdb;

pub use memory::MemoryStore;
#[cfg(feature = "nix-db")]
pub use nixdb::NixDbStore;

use crate::types::{GcRoot, NixDuError, PathInfo, StorePath};
use std::collections::BTreeSet;

/// Synchronous, read-only access to a store.
///
/// Implementations represent a point-in-time consistent snapshot: a path
/// reported valid must have metadata, and nothing here mutates the store.
pub trait StoreOracle {
    /// Directory holding the artifacts (e.g. `/nix/store`).
    fn store_dir(&self) -> &str;

    /// Whether `path` is currently a valid artifact.
    fn is_valid_path(&self, path: &StorePath) -> Result<bool, NixDuError>;

    /// Metadata for a valid artifact.
    ///
    /// Fails with [`NixDuError::PathNotFound`] when the store has none.
    fn query_path_info(&self, path: &StorePath) -> Result<PathInfo, NixDuError>;

    /// Every valid artifact of the store.
    fn query_all_valid_paths(&self) -> Result<BTreeSet<StorePath>, NixDuError>;

    /// Follow a chain of links starting at `path` until it lands in the store.
    fn follow_links_to_store_path(&self, path: &str) -> Result<StorePath, NixDuError>;

    /// Current gc-roots. Targets may be invalid; callers decide what to do.
    fn find_roots(&self) -> Result<Vec<GcRoot>, NixDuError>;
}
