//! In-memory store oracle.
//!
//! Used for tests and benchmarks, and for offline analysis of a store
//! snapshot saved as JSON.

use super::StoreOracle;
use crate::primitives::{DEFAULT_STORE_DIR, MAX_LINK_HOPS};
use crate::types::{GcRoot, NixDuError, PathInfo, StorePath};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// A store held entirely in memory.
///
/// Paths are added with metadata; `invalidate` marks a path as no longer
/// valid (a collected derivation, for instance) while keeping its record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryStore {
    store_dir: String,
    paths: BTreeMap<StorePath, PathInfo>,
    invalid: BTreeSet<StorePath>,
    roots: Vec<GcRoot>,
    links: BTreeMap<String, String>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create an empty store rooted at the default store directory.
    #[must_use]
    pub fn new() -> Self {
        Self::with_store_dir(DEFAULT_STORE_DIR)
    }

    /// Create an empty store rooted at `store_dir`.
    #[must_use]
    pub fn with_store_dir(store_dir: impl Into<String>) -> Self {
        Self {
            store_dir: store_dir.into(),
            paths: BTreeMap::new(),
            invalid: BTreeSet::new(),
            roots: Vec::new(),
            links: BTreeMap::new(),
        }
    }

    // =========================================================================
    // BUILDER
    // =========================================================================

    /// Register a valid artifact with no references and no deriver.
    ///
    /// Re-adding a path resets its metadata and makes it valid again.
    pub fn add_path(&mut self, path: &StorePath, nar_size: u64) -> &mut Self {
        let info = PathInfo::new(path.to_absolute(&self.store_dir), nar_size);
        self.paths.insert(path.clone(), info);
        self.invalid.remove(path);
        self
    }

    /// Record that `from` references `to`.
    ///
    /// `to` need not exist; a dangling reference models a corrupt store.
    pub fn add_reference(&mut self, from: &StorePath, to: &StorePath) -> Result<(), NixDuError> {
        let info = self
            .paths
            .get_mut(from)
            .ok_or_else(|| NixDuError::PathNotFound(from.clone()))?;
        info.references.insert(to.clone());
        Ok(())
    }

    /// Record the derivation that built `path`.
    pub fn set_deriver(&mut self, path: &StorePath, deriver: &StorePath) -> Result<(), NixDuError> {
        let info = self
            .paths
            .get_mut(path)
            .ok_or_else(|| NixDuError::PathNotFound(path.clone()))?;
        info.deriver = Some(deriver.clone());
        Ok(())
    }

    /// Register a gc-root.
    pub fn add_root(&mut self, link: impl Into<String>, target: &StorePath) -> &mut Self {
        self.roots.push(GcRoot::new(link, target.clone()));
        self
    }

    /// Register a symbolic link from `link` to `target`.
    pub fn add_link(&mut self, link: impl Into<String>, target: impl Into<String>) -> &mut Self {
        self.links.insert(link.into(), target.into());
        self
    }

    /// Mark `path` as invalid.
    pub fn invalidate(&mut self, path: &StorePath) -> &mut Self {
        self.invalid.insert(path.clone());
        self
    }

    // =========================================================================
    // SNAPSHOTS
    // =========================================================================

    /// Parse a store snapshot from JSON.
    pub fn from_json(json: &str) -> Result<Self, NixDuError> {
        serde_json::from_str(json).map_err(|e| NixDuError::Deserialization(e.to_string()))
    }

    /// Serialize the store as a JSON snapshot.
    pub fn to_json(&self) -> Result<String, NixDuError> {
        serde_json::to_string_pretty(self).map_err(|e| NixDuError::Serialization(e.to_string()))
    }

    /// Load a snapshot file.
    pub fn load(path: &Path) -> Result<Self, NixDuError> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| NixDuError::Io(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&json)
    }

    /// Write a snapshot file.
    pub fn save(&self, path: &Path) -> Result<(), NixDuError> {
        let json = self.to_json()?;
        std::fs::write(path, json).map_err(|e| NixDuError::Io(format!("{}: {}", path.display(), e)))
    }

    fn is_valid(&self, path: &StorePath) -> bool {
        self.paths.contains_key(path) && !self.invalid.contains(path)
    }
}

impl StoreOracle for MemoryStore {
    fn store_dir(&self) -> &str {
        &self.store_dir
    }

    fn is_valid_path(&self, path: &StorePath) -> Result<bool, NixDuError> {
        Ok(self.is_valid(path))
    }

    fn query_path_info(&self, path: &StorePath) -> Result<PathInfo, NixDuError> {
        if !self.is_valid(path) {
            return Err(NixDuError::PathNotFound(path.clone()));
        }
        self.paths
            .get(path)
            .cloned()
            .ok_or_else(|| NixDuError::PathNotFound(path.clone()))
    }

    fn query_all_valid_paths(&self) -> Result<BTreeSet<StorePath>, NixDuError> {
        Ok(self
            .paths
            .keys()
            .filter(|p| !self.invalid.contains(*p))
            .cloned()
            .collect())
    }

    fn follow_links_to_store_path(&self, path: &str) -> Result<StorePath, NixDuError> {
        let mut current = path;
        let mut hops = 0;
        while let Some(target) = self.links.get(current) {
            hops += 1;
            if hops > MAX_LINK_HOPS {
                return Err(NixDuError::Resolution(format!(
                    "too many levels of symbolic links resolving '{}'",
                    path
                )));
            }
            current = target.as_str();
        }
        StorePath::parse(&self.store_dir, current)
    }

    fn find_roots(&self) -> Result<Vec<GcRoot>, NixDuError> {
        Ok(self.roots.clone())
    }
}
