//! # Configuration
//!
//! Optional TOML configuration file. Every setting has a default, so an empty
//! file (or no file at all) is a valid configuration. Command-line flags are
//! applied on top by the CLI.
//!
//! ```toml
//! [store]
//! backend = "nix-db"          # or "snapshot"
//! snapshot = "store.json"     # required when backend = "snapshot"
//! state_dir = "/nix/var/nix"
//! store_dir = "/nix/store"
//! nix_conf = "/etc/nix/nix.conf"
//! proc_dir = "/proc"          # where runtime roots are looked for
//!
//! [policy]
//! keep_derivations = true
//! keep_outputs = false
//!
//! [output]
//! database = "nix-du.redb"
//! backend = "redb"            # or "file"
//! ```

use nixdu_core::GcPolicy;
use nixdu_core::NixDuError;
use nixdu_core::primitives::{
    DEFAULT_NIX_CONF, DEFAULT_PROC_DIR, DEFAULT_STATE_DIR, DEFAULT_STORE_DIR,
};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "NIX_DU_CONFIG";

/// Environment variable naming the directory holding `nix.conf`.
pub const NIX_CONF_DIR_ENV: &str = "NIX_CONF_DIR";

/// Default graph database file.
pub const DEFAULT_DATABASE: &str = "nix-du.redb";

// =============================================================================
// CONFIG
// =============================================================================

/// Full application configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub store: StoreConfig,
    pub policy: PolicyConfig,
    pub output: OutputConfig,
}

/// Where store metadata comes from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StoreBackend {
    /// The local Nix database.
    #[default]
    NixDb,
    /// A JSON store snapshot.
    Snapshot,
}

/// `[store]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub snapshot: Option<PathBuf>,
    pub state_dir: PathBuf,
    pub store_dir: String,
    pub nix_conf: Option<PathBuf>,
    pub proc_dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            snapshot: None,
            state_dir: PathBuf::from(DEFAULT_STATE_DIR),
            store_dir: DEFAULT_STORE_DIR.to_string(),
            nix_conf: None,
            proc_dir: PathBuf::from(DEFAULT_PROC_DIR),
        }
    }
}

/// `[policy]` section. Unset values come from `nix.conf`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PolicyConfig {
    pub keep_derivations: Option<bool>,
    pub keep_outputs: Option<bool>,
}

/// How the graph database is stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputBackend {
    /// redb ACID database.
    #[default]
    Redb,
    /// Single canonical export file.
    File,
}

impl FromStr for OutputBackend {
    type Err = NixDuError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "redb" => Ok(Self::Redb),
            "file" => Ok(Self::File),
            other => Err(NixDuError::Config(format!(
                "unknown backend '{}'. Use: redb, file",
                other
            ))),
        }
    }
}

impl std::fmt::Display for OutputBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Redb => write!(f, "redb"),
            Self::File => write!(f, "file"),
        }
    }
}

/// `[output]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    pub database: PathBuf,
    pub backend: OutputBackend,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from(DEFAULT_DATABASE),
            backend: OutputBackend::default(),
        }
    }
}

// =============================================================================
// LOADING
// =============================================================================

impl Config {
    /// Parse a configuration from TOML text.
    pub fn from_toml(text: &str) -> Result<Self, NixDuError> {
        toml::from_str(text).map_err(|e| NixDuError::Config(e.to_string()))
    }

    /// Read a configuration file.
    pub fn from_file(path: &Path) -> Result<Self, NixDuError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| NixDuError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml(&text).map_err(|e| match e {
            NixDuError::Config(msg) => NixDuError::Config(format!("{}: {}", path.display(), msg)),
            other => other,
        })
    }

    /// Load the configuration named by `--config`, else by `NIX_DU_CONFIG`,
    /// else the defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self, NixDuError> {
        match locate(explicit, std::env::var_os(CONFIG_ENV)) {
            Some(path) => {
                tracing::debug!(path = %path.display(), "loading configuration");
                Self::from_file(&path)
            }
            None => Ok(Self::default()),
        }
    }

    /// Location of `nix.conf`: the configured one, else `$NIX_CONF_DIR/nix.conf`,
    /// else the system default.
    pub fn nix_conf_path(&self, nix_conf_dir: Option<OsString>) -> PathBuf {
        if let Some(path) = &self.store.nix_conf {
            return path.clone();
        }
        match nix_conf_dir {
            Some(dir) if !dir.is_empty() => PathBuf::from(dir).join("nix.conf"),
            _ => PathBuf::from(DEFAULT_NIX_CONF),
        }
    }

    /// Effective GC policy.
    ///
    /// Overrides win over the `[policy]` section, which wins over `nix.conf`.
    /// `nix.conf` is only read when some flag is still undecided.
    pub fn resolve_policy(
        &self,
        keep_derivations: Option<bool>,
        keep_outputs: Option<bool>,
    ) -> Result<GcPolicy, NixDuError> {
        let keep_derivations = keep_derivations.or(self.policy.keep_derivations);
        let keep_outputs = keep_outputs.or(self.policy.keep_outputs);
        if let (Some(kd), Some(ko)) = (keep_derivations, keep_outputs) {
            return Ok(GcPolicy::new(kd, ko));
        }

        let nix_conf = self.nix_conf_path(std::env::var_os(NIX_CONF_DIR_ENV));
        let base = GcPolicy::from_nix_conf_file(&nix_conf)?;
        Ok(GcPolicy::new(
            keep_derivations.unwrap_or(base.keep_derivations),
            keep_outputs.unwrap_or(base.keep_outputs),
        ))
    }
}

/// Pick the configuration file: an explicit path beats the environment.
pub fn locate(explicit: Option<&Path>, env: Option<OsString>) -> Option<PathBuf> {
    explicit
        .map(Path::to_path_buf)
        .or_else(|| env.filter(|v| !v.is_empty()).map(PathBuf::from))
}
