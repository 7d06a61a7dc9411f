//! # Garbage-Collection Policy
//!
//! The two store-wide settings that decide whether derivations take part in
//! reachability, and in which direction. The traversal receives them as an
//! explicit value; reading them from `nix.conf` is a separate, optional step.

use crate::types::NixDuError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Store GC settings consulted when emitting deriver edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GcPolicy {
    /// Keep the derivation of every live output (edge output -> deriver).
    pub keep_derivations: bool,
    /// Keep the outputs of every live derivation (edge deriver -> output).
    pub keep_outputs: bool,
}

impl Default for GcPolicy {
    fn default() -> Self {
        Self {
            keep_derivations: true,
            keep_outputs: false,
        }
    }
}

impl GcPolicy {
    /// Create a policy from both flags.
    #[must_use]
    pub const fn new(keep_derivations: bool, keep_outputs: bool) -> Self {
        Self {
            keep_derivations,
            keep_outputs,
        }
    }

    /// Whether derivers take part in the graph at all.
    #[must_use]
    pub const fn keeps_deriver_edges(&self) -> bool {
        self.keep_derivations || self.keep_outputs
    }

    /// Read the policy from the text of a `nix.conf` file.
    ///
    /// Unknown settings and `include` directives are ignored; settings not
    /// present keep their store defaults. A later line overrides an earlier one.
    /// The legacy `gc-keep-derivations` / `gc-keep-outputs` spellings are
    /// accepted as aliases.
    pub fn from_nix_conf(text: &str) -> Result<Self, NixDuError> {
        let mut policy = Self::default();
        for (lineno, raw) in text.lines().enumerate() {
            let line = match raw.find('#') {
                Some(i) => &raw[..i],
                None => raw,
            }
            .trim();
            if line.is_empty() || line.starts_with("include ") || line.starts_with("!include ") {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                return Err(NixDuError::Config(format!(
                    "nix.conf line {}: expected 'name = value'",
                    lineno + 1
                )));
            };
            let key = key.trim();
            let slot = match key {
                "keep-derivations" | "gc-keep-derivations" => &mut policy.keep_derivations,
                "keep-outputs" | "gc-keep-outputs" => &mut policy.keep_outputs,
                _ => continue,
            };
            *slot = parse_bool(value.trim()).ok_or_else(|| {
                NixDuError::Config(format!(
                    "nix.conf line {}: '{}' is not a boolean for '{}'",
                    lineno + 1,
                    value.trim(),
                    key
                ))
            })?;
        }
        Ok(policy)
    }

    /// Read the policy from a `nix.conf` file; a missing file yields the defaults.
    pub fn from_nix_conf_file(path: &Path) -> Result<Self, NixDuError> {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::from_nix_conf(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "nix.conf not found, using store defaults");
                Ok(Self::default())
            }
            Err(e) => Err(NixDuError::Io(format!("{}: {}", path.display(), e))),
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_store() {
        let policy = GcPolicy::default();
        assert!(policy.keep_derivations);
        assert!(!policy.keep_outputs);
    }

    #[test]
    fn deriver_edges_need_one_flag() {
        assert!(GcPolicy::new(true, false).keeps_deriver_edges());
        assert!(GcPolicy::new(false, true).keeps_deriver_edges());
        assert!(!GcPolicy::new(false, false).keeps_deriver_edges());
    }

    #[test]
    fn parses_both_keys() {
        let text = "\
# gc settings
keep-derivations = false
keep-outputs = true   # for direnv
substituters = https://cache.nixos.org
";
        let policy = GcPolicy::from_nix_conf(text).expect("parse");
        assert_eq!(policy, GcPolicy::new(false, true));
    }

    #[test]
    fn accepts_legacy_gc_spellings() {
        let text = "gc-keep-derivations = false\ngc-keep-outputs = true\n";
        let policy = GcPolicy::from_nix_conf(text).expect("parse");
        assert_eq!(policy, GcPolicy::new(false, true));

        // both spellings name one setting: the later line wins
        let text = "gc-keep-outputs = true\nkeep-outputs = false\n";
        let policy = GcPolicy::from_nix_conf(text).expect("parse");
        assert!(!policy.keep_outputs);

        let err = GcPolicy::from_nix_conf("gc-keep-derivations = yes\n");
        assert!(matches!(err, Err(NixDuError::Config(_))));
    }

    #[test]
    fn ignores_includes_and_blank_lines() {
        let text = "\n!include /etc/nix/extra.conf\ninclude local.conf\n\nkeep-outputs = true\n";
        let policy = GcPolicy::from_nix_conf(text).expect("parse");
        assert_eq!(policy, GcPolicy::new(true, true));
    }

    #[test]
    fn later_lines_win() {
        let text = "keep-outputs = true\nkeep-outputs = false\n";
        let policy = GcPolicy::from_nix_conf(text).expect("parse");
        assert!(!policy.keep_outputs);
    }

    #[test]
    fn rejects_non_boolean() {
        let err = GcPolicy::from_nix_conf("keep-outputs = maybe\n");
        assert!(matches!(err, Err(NixDuError::Config(_))));
    }

    #[test]
    fn rejects_line_without_equals() {
        let err = GcPolicy::from_nix_conf("keep-outputs\n");
        assert!(matches!(err, Err(NixDuError::Config(_))));
    }

    #[test]
    fn missing_file_is_default() {
        let dir = tempfile::tempdir().expect("tempdir");
        let policy = GcPolicy::from_nix_conf_file(&dir.path().join("nix.conf")).expect("read");
        assert_eq!(policy, GcPolicy::default());
    }

    #[test]
    fn reads_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nix.conf");
        std::fs::write(&path, "keep-derivations = false\n").expect("write");
        let policy = GcPolicy::from_nix_conf_file(&path).expect("read");
        assert_eq!(policy, GcPolicy::new(false, false));
    }
}
