//! # Store Primitives
//!
//! Fixed constants describing the Nix store layout and the limits the
//! engine enforces. These are compiled into the binary; anything a user may
//! change lives in the application's configuration instead.

// =============================================================================
// STORE LAYOUT
// =============================================================================

/// Default location of the store.
pub const DEFAULT_STORE_DIR: &str = "/nix/store";

/// Default Nix state directory (holds `db/`, `gcroots/`, `profiles/` and `temproots/`).
pub const DEFAULT_STATE_DIR: &str = "/nix/var/nix";

/// Default Nix configuration file.
pub const DEFAULT_NIX_CONF: &str = "/etc/nix/nix.conf";

/// Path of the store database relative to the state directory.
pub const DB_RELATIVE_PATH: &str = "db/db.sqlite";

/// Directory of temporary roots, relative to the state directory.
pub const TEMPROOTS_DIR: &str = "temproots";

/// Where live processes are listed.
pub const DEFAULT_PROC_DIR: &str = "/proc";

/// Prefixes of roots that only live as long as a process or a daemon session.
pub const TRANSIENT_ROOT_PREFIXES: [&str; 2] = ["{memory:", "{temp:"];

// =============================================================================
// LIMITS
// =============================================================================

/// Maximum number of symbolic links followed when resolving a root.
///
/// Matches the kernel's `MAXSYMLINKS`; a longer chain is treated as a loop.
pub const MAX_LINK_HOPS: usize = 40;

/// Maximum number of nodes a graph may hold.
///
/// Node ids are `u32`, so one id is kept free for the counter.
pub const MAX_NODE_COUNT: u64 = u32::MAX as u64;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_defaults_are_absolute() {
        assert!(DEFAULT_STORE_DIR.starts_with('/'));
        assert!(DEFAULT_STATE_DIR.starts_with('/'));
        assert!(DEFAULT_NIX_CONF.starts_with('/'));
        assert!(!DB_RELATIVE_PATH.starts_with('/'));
    }

    #[test]
    fn transient_prefixes_are_braced() {
        for prefix in TRANSIENT_ROOT_PREFIXES {
            assert!(prefix.starts_with('{'));
            assert!(prefix.ends_with(':'));
        }
    }
}
