//! Tests for configuration loading and GC policy resolution.

use nix_du::config::{
    Config, OutputBackend, PolicyConfig, StoreBackend, StoreConfig, locate,
};
use nixdu_core::{GcPolicy, NixDuError};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

// =============================================================================
// PARSING
// =============================================================================

#[test]
fn full_file_parses() {
    let text = r#"
[store]
backend = "snapshot"
snapshot = "/tmp/store.json"
state_dir = "/opt/nix/var/nix"
store_dir = "/opt/nix/store"
nix_conf = "/opt/nix/etc/nix.conf"
proc_dir = "/host/proc"

[policy]
keep_derivations = false
keep_outputs = true

[output]
database = "/var/cache/nix-du.bin"
backend = "file"
"#;
    let config = Config::from_toml(text).expect("parse");

    assert_eq!(
        config.store,
        StoreConfig {
            backend: StoreBackend::Snapshot,
            snapshot: Some(PathBuf::from("/tmp/store.json")),
            state_dir: PathBuf::from("/opt/nix/var/nix"),
            store_dir: "/opt/nix/store".to_string(),
            nix_conf: Some(PathBuf::from("/opt/nix/etc/nix.conf")),
            proc_dir: PathBuf::from("/host/proc"),
        }
    );
    assert_eq!(
        config.policy,
        PolicyConfig {
            keep_derivations: Some(false),
            keep_outputs: Some(true),
        }
    );
    assert_eq!(config.output.database, PathBuf::from("/var/cache/nix-du.bin"));
    assert_eq!(config.output.backend, OutputBackend::File);
}

#[test]
fn partial_file_keeps_defaults() {
    let config = Config::from_toml("[output]\nbackend = \"file\"\n").expect("parse");

    assert_eq!(config.store, StoreConfig::default());
    assert_eq!(config.store.store_dir, "/nix/store");
    assert_eq!(config.store.state_dir, PathBuf::from("/nix/var/nix"));
    assert_eq!(config.store.proc_dir, PathBuf::from("/proc"));
    assert_eq!(config.output.database, PathBuf::from("nix-du.redb"));
}

#[test]
fn unknown_keys_rejected() {
    let result = Config::from_toml("[store]\nstate-dir = \"/x\"\n");
    assert!(matches!(result, Err(NixDuError::Config(_))));

    let result = Config::from_toml("[cache]\nsize = 3\n");
    assert!(matches!(result, Err(NixDuError::Config(_))));
}

#[test]
fn from_file_reports_path() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("broken.toml");
    std::fs::write(&path, "[policy]\nkeep_outputs = \"yes\"\n").expect("write");

    let err = Config::from_file(&path).expect_err("bad value");
    assert!(err.to_string().contains("broken.toml"));

    let missing = Config::from_file(&dir.path().join("missing.toml"));
    assert!(matches!(missing, Err(NixDuError::Config(_))));
}

#[test]
fn load_with_explicit_path() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("nix-du.toml");
    std::fs::write(&path, "[output]\ndatabase = \"x.redb\"\n").expect("write");

    let config = Config::load(Some(&path)).expect("load");
    assert_eq!(config.output.database, PathBuf::from("x.redb"));
}

#[test]
fn locate_prefers_explicit() {
    let env = Some(std::ffi::OsString::from("/etc/nix-du.toml"));
    assert_eq!(
        locate(Some(Path::new("./mine.toml")), env.clone()),
        Some(PathBuf::from("./mine.toml"))
    );
    assert_eq!(locate(None, env), Some(PathBuf::from("/etc/nix-du.toml")));
}

// =============================================================================
// POLICY RESOLUTION
// =============================================================================

fn config_with_nix_conf(dir: &TempDir, contents: Option<&str>) -> Config {
    let path = dir.path().join("nix.conf");
    if let Some(text) = contents {
        std::fs::write(&path, text).expect("write nix.conf");
    }
    let mut config = Config::default();
    config.store.nix_conf = Some(path);
    config
}

#[test]
fn policy_from_nix_conf() {
    let dir = TempDir::new().expect("tempdir");
    let config = config_with_nix_conf(&dir, Some("keep-outputs = true\nkeep-derivations = false\n"));

    let policy = config.resolve_policy(None, None).expect("resolve");
    assert_eq!(policy, GcPolicy::new(false, true));
}

#[test]
fn missing_nix_conf_gives_store_defaults() {
    let dir = TempDir::new().expect("tempdir");
    let config = config_with_nix_conf(&dir, None);

    let policy = config.resolve_policy(None, None).expect("resolve");
    assert_eq!(policy, GcPolicy::default());
}

#[test]
fn config_section_beats_nix_conf() {
    let dir = TempDir::new().expect("tempdir");
    let mut config = config_with_nix_conf(&dir, Some("keep-outputs = true\n"));
    config.policy.keep_outputs = Some(false);

    let policy = config.resolve_policy(None, None).expect("resolve");
    assert_eq!(policy, GcPolicy::new(true, false));
}

#[test]
fn flags_beat_config_section() {
    let dir = TempDir::new().expect("tempdir");
    let mut config = config_with_nix_conf(&dir, None);
    config.policy.keep_derivations = Some(true);

    let policy = config.resolve_policy(Some(false), None).expect("resolve");
    assert_eq!(policy, GcPolicy::new(false, false));
}

#[test]
fn nix_conf_not_read_when_fully_overridden() {
    let dir = TempDir::new().expect("tempdir");
    let config = config_with_nix_conf(&dir, Some("this line is not valid\n"));

    let policy = config.resolve_policy(Some(true), Some(true)).expect("resolve");
    assert_eq!(policy, GcPolicy::new(true, true));

    let err = config.resolve_policy(None, Some(true));
    assert!(matches!(err, Err(NixDuError::Config(_))));
}
