//! Oracle over a local Nix store.
//!
//! Metadata comes from the store database (`<state_dir>/db/db.sqlite`), opened
//! read-only. Roots are found the same way the garbage collector does:
//! - links under `<state_dir>/gcroots` and `<state_dir>/profiles`
//! - temporary roots registered in `<state_dir>/temproots/<pid>` (`{temp:<pid>}`)
//! - runtime roots held by live processes under `/proc` (`{memory:<n>}`)

use super::StoreOracle;
use crate::primitives::{DB_RELATIVE_PATH, DEFAULT_PROC_DIR, MAX_LINK_HOPS, TEMPROOTS_DIR};
use crate::types::{GcRoot, NixDuError, PathInfo, StorePath};
use rusqlite::{Connection, OpenFlags, OptionalExtension, params};
use std::collections::BTreeSet;
use std::ffi::{OsStr, OsString};
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

/// Read-only access to a local Nix store.
pub struct NixDbStore {
    conn: Connection,
    store_dir: String,
    state_dir: PathBuf,
    proc_dir: PathBuf,
}

impl std::fmt::Debug for NixDbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NixDbStore")
            .field("store_dir", &self.store_dir)
            .field("state_dir", &self.state_dir)
            .field("proc_dir", &self.proc_dir)
            .finish()
    }
}

impl NixDbStore {
    /// Open the store whose state lives in `state_dir`.
    pub fn open(state_dir: impl Into<PathBuf>, store_dir: impl Into<String>) -> Result<Self, NixDuError> {
        let state_dir = state_dir.into();
        let db_path = state_dir.join(DB_RELATIVE_PATH);
        Self::open_with_database(&db_path, state_dir, store_dir)
    }

    /// Open a store with an explicit database location.
    pub fn open_with_database(
        db_path: &Path,
        state_dir: impl Into<PathBuf>,
        store_dir: impl Into<String>,
    ) -> Result<Self, NixDuError> {
        let conn = Connection::open_with_flags(
            db_path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| NixDuError::Store(format!("open {}: {}", db_path.display(), e)))?;

        let store_dir = store_dir.into().trim_end_matches('/').to_string();
        tracing::debug!(db = %db_path.display(), store_dir = %store_dir, "opened store database");

        Ok(Self {
            conn,
            store_dir,
            state_dir: state_dir.into(),
            proc_dir: PathBuf::from(DEFAULT_PROC_DIR),
        })
    }

    /// Look for runtime roots in `proc_dir` instead of `/proc`.
    #[must_use]
    pub fn with_proc_dir(mut self, proc_dir: impl Into<PathBuf>) -> Self {
        self.proc_dir = proc_dir.into();
        self
    }

    fn parse_db_path(&self, path: &str) -> Result<StorePath, NixDuError> {
        StorePath::parse(&self.store_dir, path)
            .map_err(|e| NixDuError::Store(format!("bad path in database: {}", e)))
    }

    // =========================================================================
    // ROOT DISCOVERY
    // =========================================================================

    /// Walk one root directory, collecting roots into `roots`.
    fn scan_roots(&self, path: &Path, roots: &mut Vec<GcRoot>) -> Result<(), NixDuError> {
        let meta = match fs::symlink_metadata(path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
                tracing::warn!(path = %path.display(), "cannot read root, skipping");
                return Ok(());
            }
            Err(e) => return Err(NixDuError::Io(format!("{}: {}", path.display(), e))),
        };
        let file_type = meta.file_type();

        if file_type.is_symlink() {
            let target = read_link_absolute(path)?;
            if let Ok(store_path) = self.parse_in_store(&target) {
                roots.push(GcRoot::new(display(path), store_path));
                return Ok(());
            }
            // Indirect root: a link to a link that points into the store.
            let target_is_link = fs::symlink_metadata(&target).is_ok_and(|m| m.file_type().is_symlink());
            if target_is_link {
                let second = read_link_absolute(&target)?;
                if let Ok(store_path) = self.parse_in_store(&second) {
                    roots.push(GcRoot::new(display(&target), store_path));
                }
            }
        } else if file_type.is_dir() {
            let children = sorted_entries(path)
                .map_err(|e| NixDuError::Io(format!("{}: {}", path.display(), e)))?;
            for child in children {
                self.scan_roots(&child, roots)?;
            }
        } else if file_type.is_file() {
            let by_name = path
                .file_name()
                .and_then(|name| name.to_str())
                .and_then(|name| StorePath::new(name).ok());
            if let Some(store_path) = by_name {
                if self.is_valid_path(&store_path)? {
                    roots.push(GcRoot::new(display(path), store_path));
                }
            }
        }
        Ok(())
    }

    /// Collect the roots registered by running builds and `nix-shell`s.
    ///
    /// Each file is named after the owning pid and lists store paths, each
    /// terminated by a NUL byte (older Nix versions used newlines).
    fn scan_temp_roots(&self, roots: &mut Vec<GcRoot>) -> Result<(), NixDuError> {
        let dir = self.state_dir.join(TEMPROOTS_DIR);
        let files = match sorted_entries(&dir) {
            Ok(files) => files,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(NixDuError::Io(format!("{}: {}", dir.display(), e))),
        };

        for file in files {
            let Some(pid) = pid_of(&file) else {
                continue;
            };
            let bytes = match fs::read(&file) {
                Ok(bytes) => bytes,
                Err(e) if matches!(e.kind(), io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied) => {
                    continue;
                }
                Err(e) => return Err(NixDuError::Io(format!("{}: {}", file.display(), e))),
            };
            for entry in bytes.split(|b| *b == 0 || *b == b'\n') {
                if entry.is_empty() {
                    continue;
                }
                let Ok(store_path) = StorePath::parse(&self.store_dir, &String::from_utf8_lossy(entry)) else {
                    continue;
                };
                if self.is_valid_path(&store_path)? {
                    roots.push(GcRoot::new(format!("{{temp:{}}}", pid), store_path));
                }
            }
        }
        Ok(())
    }

    /// Collect the store paths live processes hold: their executable, working
    /// directory, open files, mapped libraries and environment.
    ///
    /// Processes come and go during the scan, so anything unreadable is
    /// skipped.
    fn scan_runtime_roots(&self, roots: &mut Vec<GcRoot>) -> Result<(), NixDuError> {
        let processes = match sorted_entries(&self.proc_dir) {
            Ok(processes) => processes,
            Err(e) if matches!(e.kind(), io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied) => {
                return Ok(());
            }
            Err(e) => return Err(NixDuError::Io(format!("{}: {}", self.proc_dir.display(), e))),
        };

        let mut held = BTreeSet::new();
        for process in processes {
            if pid_of(&process).is_none() {
                continue;
            }
            let mut links = vec![process.join("exe"), process.join("cwd")];
            links.extend(sorted_entries(&process.join("fd")).unwrap_or_default());
            for link in links {
                if let Ok(target) = fs::read_link(&link) {
                    held.extend(store_paths_in(&self.store_dir, &display(&target)));
                }
            }
            for file in ["maps", "environ"] {
                if let Ok(bytes) = fs::read(process.join(file)) {
                    held.extend(store_paths_in(&self.store_dir, &String::from_utf8_lossy(&bytes)));
                }
            }
        }

        let mut index = 0;
        for store_path in held {
            if self.is_valid_path(&store_path)? {
                roots.push(GcRoot::new(format!("{{memory:{}}}", index), store_path));
                index += 1;
            }
        }
        Ok(())
    }

    fn parse_in_store(&self, path: &Path) -> Result<StorePath, NixDuError> {
        StorePath::parse(&self.store_dir, &display(path))
    }
}

impl StoreOracle for NixDbStore {
    fn store_dir(&self) -> &str {
        &self.store_dir
    }

    fn is_valid_path(&self, path: &StorePath) -> Result<bool, NixDuError> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM ValidPaths WHERE path = ?1 LIMIT 1",
                params![path.to_absolute(&self.store_dir)],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| NixDuError::Store(e.to_string()))?;
        Ok(found.is_some())
    }

    fn query_path_info(&self, path: &StorePath) -> Result<PathInfo, NixDuError> {
        let absolute = path.to_absolute(&self.store_dir);
        let row: Option<(i64, Option<i64>, Option<String>)> = self
            .conn
            .query_row(
                "SELECT id, narSize, deriver FROM ValidPaths WHERE path = ?1",
                params![absolute],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()
            .map_err(|e| NixDuError::Store(e.to_string()))?;
        let Some((id, nar_size, deriver)) = row else {
            return Err(NixDuError::PathNotFound(path.clone()));
        };

        let mut stmt = self
            .conn
            .prepare(
                "SELECT v.path FROM Refs r JOIN ValidPaths v ON r.reference = v.id \
                 WHERE r.referrer = ?1",
            )
            .map_err(|e| NixDuError::Store(e.to_string()))?;
        let rows = stmt
            .query_map(params![id], |row| row.get::<_, String>(0))
            .map_err(|e| NixDuError::Store(e.to_string()))?;
        let mut references = BTreeSet::new();
        for row in rows {
            let reference = row.map_err(|e| NixDuError::Store(e.to_string()))?;
            references.insert(self.parse_db_path(&reference)?);
        }

        let deriver = match deriver.as_deref() {
            None | Some("") => None,
            Some(drv) => Some(self.parse_db_path(drv)?),
        };

        Ok(PathInfo {
            path: absolute,
            nar_size: nar_size.unwrap_or(0).max(0) as u64,
            references,
            deriver,
        })
    }

    fn query_all_valid_paths(&self) -> Result<BTreeSet<StorePath>, NixDuError> {
        let mut stmt = self
            .conn
            .prepare("SELECT path FROM ValidPaths")
            .map_err(|e| NixDuError::Store(e.to_string()))?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(|e| NixDuError::Store(e.to_string()))?;
        let mut paths = BTreeSet::new();
        for row in rows {
            let path = row.map_err(|e| NixDuError::Store(e.to_string()))?;
            paths.insert(self.parse_db_path(&path)?);
        }
        Ok(paths)
    }

    fn follow_links_to_store_path(&self, path: &str) -> Result<StorePath, NixDuError> {
        let start = std::path::absolute(path)
            .map_err(|e| NixDuError::Resolution(format!("{}: {}", path, e)))?;
        let mut resolved = PathBuf::from("/");
        let mut pending = Vec::new();
        queue_components(&start, &mut pending);
        let mut hops = 0;

        // Resolve one component at a time. Below the store directory the
        // path is taken literally: a store entry is its own artifact even
        // when it is a symlink.
        let store_dir = Path::new(&self.store_dir);
        while let Some(name) = pending.pop() {
            if name.as_os_str() == OsStr::new("..") {
                resolved.pop();
                continue;
            }
            let next = resolved.join(&name);
            if resolved.starts_with(store_dir) {
                resolved = next;
                continue;
            }
            let is_link = fs::symlink_metadata(&next)
                .map_err(|e| NixDuError::Resolution(format!("{}: {}", next.display(), e)))?
                .file_type()
                .is_symlink();
            if !is_link {
                resolved = next;
                continue;
            }
            hops += 1;
            if hops > MAX_LINK_HOPS {
                return Err(NixDuError::Resolution(format!(
                    "too many levels of symbolic links resolving '{}'",
                    path
                )));
            }
            let target = fs::read_link(&next)
                .map_err(|e| NixDuError::Resolution(format!("{}: {}", next.display(), e)))?;
            if target.is_absolute() {
                resolved = PathBuf::from("/");
            }
            queue_components(&target, &mut pending);
        }
        StorePath::parse(&self.store_dir, &display(&resolved))
    }

    fn find_roots(&self) -> Result<Vec<GcRoot>, NixDuError> {
        let mut roots = Vec::new();
        for dir in ["gcroots", "profiles"] {
            self.scan_roots(&self.state_dir.join(dir), &mut roots)?;
        }
        self.scan_temp_roots(&mut roots)?;
        self.scan_runtime_roots(&mut roots)?;
        roots.sort();
        roots.dedup();
        tracing::debug!(count = roots.len(), "found gc roots");
        Ok(roots)
    }
}

/// Read a symlink, resolving a relative target against the link's directory.
fn read_link_absolute(link: &Path) -> Result<PathBuf, NixDuError> {
    let target = fs::read_link(link).map_err(|e| NixDuError::Io(format!("{}: {}", link.display(), e)))?;
    if target.is_absolute() {
        return Ok(target);
    }
    Ok(link.parent().map_or_else(|| target.clone(), |dir| dir.join(&target)))
}

/// Entries of a directory, sorted.
fn sorted_entries(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut entries = fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<io::Result<Vec<_>>>()?;
    entries.sort();
    Ok(entries)
}

/// Push the components of `path` onto `pending` so the first one pops next.
/// `..` is kept as a literal name; `.` and the root are dropped.
fn queue_components(path: &Path, pending: &mut Vec<OsString>) {
    let names: Vec<OsString> = path
        .components()
        .filter_map(|component| match component {
            Component::Normal(name) => Some(name.to_os_string()),
            Component::ParentDir => Some(OsString::from("..")),
            Component::RootDir | Component::CurDir | Component::Prefix(_) => None,
        })
        .collect();
    pending.extend(names.into_iter().rev());
}

/// The pid a `/proc` entry or temproots file is named after.
fn pid_of(path: &Path) -> Option<&str> {
    path.file_name()
        .and_then(|name| name.to_str())
        .filter(|name| !name.is_empty() && name.bytes().all(|b| b.is_ascii_digit()))
}

/// Every store path mentioned in `text`, e.g. in `/proc/<pid>/maps`.
fn store_paths_in(store_dir: &str, text: &str) -> Vec<StorePath> {
    let prefix = format!("{}/", store_dir);
    let mut found = Vec::new();
    let mut rest = text;
    while let Some(at) = rest.find(&prefix) {
        let tail = &rest[at + prefix.len()..];
        let end = tail
            .find(|c: char| !(c.is_ascii_alphanumeric() || "+-._?=".contains(c)))
            .unwrap_or(tail.len());
        if let Ok(store_path) = StorePath::new(&tail[..end]) {
            found.push(store_path);
        }
        rest = &tail[end..];
    }
    found
}

fn display(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::symlink;

    const SCHEMA: &str = "
        CREATE TABLE ValidPaths (
            id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
            path TEXT UNIQUE NOT NULL,
            hash TEXT NOT NULL DEFAULT '',
            registrationTime INTEGER NOT NULL DEFAULT 0,
            deriver TEXT,
            narSize INTEGER
        );
        CREATE TABLE Refs (
            referrer INTEGER NOT NULL,
            reference INTEGER NOT NULL,
            PRIMARY KEY (referrer, reference)
        );
    ";

    struct Fixture {
        dir: tempfile::TempDir,
        store_dir: String,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().expect("tempdir");
            let store_dir = dir.path().join("store");
            fs::create_dir_all(&store_dir).expect("store dir");
            fs::create_dir_all(dir.path().join("state/db")).expect("db dir");
            let conn = Connection::open(dir.path().join("state/db/db.sqlite")).expect("create db");
            conn.execute_batch(SCHEMA).expect("schema");
            Self {
                store_dir: display(&store_dir),
                dir,
            }
        }

        fn state_dir(&self) -> PathBuf {
            self.dir.path().join("state")
        }

        fn abs(&self, name: &str) -> String {
            format!("{}/{}", self.store_dir, name)
        }

        fn insert(&self, name: &str, size: i64, deriver: Option<&str>) {
            let conn = Connection::open(self.state_dir().join(DB_RELATIVE_PATH)).expect("open db");
            conn.execute(
                "INSERT INTO ValidPaths (path, deriver, narSize) VALUES (?1, ?2, ?3)",
                params![self.abs(name), deriver.map(|d| self.abs(d)), size],
            )
            .expect("insert path");
        }

        fn reference(&self, from: &str, to: &str) {
            let conn = Connection::open(self.state_dir().join(DB_RELATIVE_PATH)).expect("open db");
            conn.execute(
                "INSERT INTO Refs (referrer, reference) \
                 SELECT a.id, b.id FROM ValidPaths a, ValidPaths b WHERE a.path = ?1 AND b.path = ?2",
                params![self.abs(from), self.abs(to)],
            )
            .expect("insert ref");
        }

        fn open(&self) -> NixDbStore {
            NixDbStore::open(self.state_dir(), self.store_dir.clone())
                .expect("open store")
                .with_proc_dir(self.dir.path().join("proc"))
        }
    }

    fn sp(name: &str) -> StorePath {
        StorePath::new(name).expect("valid store path")
    }

    #[test]
    fn reads_metadata_and_references() {
        let fx = Fixture::new();
        fx.insert("aaa-a", 100, Some("ddd-a.drv"));
        fx.insert("bbb-b", 50, None);
        fx.reference("aaa-a", "bbb-b");
        let store = fx.open();

        assert!(store.is_valid_path(&sp("aaa-a")).expect("valid"));
        assert!(!store.is_valid_path(&sp("zzz-z")).expect("valid"));

        let info = store.query_path_info(&sp("aaa-a")).expect("info");
        assert_eq!(info.nar_size, 100);
        assert_eq!(info.path, fx.abs("aaa-a"));
        assert_eq!(info.references.into_iter().collect::<Vec<_>>(), vec![sp("bbb-b")]);
        assert_eq!(info.deriver, Some(sp("ddd-a.drv")));

        let b = store.query_path_info(&sp("bbb-b")).expect("info");
        assert!(b.references.is_empty());
        assert_eq!(b.deriver, None);
    }

    #[test]
    fn missing_metadata_is_path_not_found() {
        let fx = Fixture::new();
        let store = fx.open();
        assert!(matches!(
            store.query_path_info(&sp("aaa-a")),
            Err(NixDuError::PathNotFound(_))
        ));
    }

    #[test]
    fn lists_all_valid_paths() {
        let fx = Fixture::new();
        fx.insert("aaa-a", 1, None);
        fx.insert("bbb-b", 2, None);
        let store = fx.open();
        let all = store.query_all_valid_paths().expect("all");
        assert_eq!(all.len(), 2);
        assert!(all.contains(&sp("bbb-b")));
    }

    #[test]
    fn missing_database_is_store_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let result = NixDbStore::open(dir.path(), "/nix/store");
        assert!(matches!(result, Err(NixDuError::Store(_))));
    }

    #[test]
    fn follows_link_chains_into_store() {
        let fx = Fixture::new();
        fx.insert("aaa-a", 1, None);
        fs::create_dir_all(fx.abs("aaa-a")).expect("artifact dir");
        let first = fx.dir.path().join("result");
        let second = fx.dir.path().join("profile-1-link");
        symlink(fx.abs("aaa-a"), &second).expect("link");
        symlink("profile-1-link", &first).expect("relative link");

        let store = fx.open();
        let resolved = store
            .follow_links_to_store_path(&display(&first))
            .expect("resolve");
        assert_eq!(resolved, sp("aaa-a"));
    }

    #[test]
    fn follows_links_in_parent_directories() {
        let fx = Fixture::new();
        fx.insert("aaa-prof", 1, None);
        fs::create_dir_all(format!("{}/bin", fx.abs("aaa-prof"))).expect("artifact bin");
        let profile = fx.dir.path().join("profile");
        symlink(fx.abs("aaa-prof"), &profile).expect("profile link");
        let home = fx.dir.path().join("home");
        fs::create_dir_all(&home).expect("home");
        symlink("../profile", home.join(".nix-profile")).expect("relative link");

        let store = fx.open();
        for path in [
            profile.join("bin"),
            home.join(".nix-profile/bin"),
            home.join(".nix-profile/bin/../bin"),
        ] {
            assert_eq!(
                store.follow_links_to_store_path(&display(&path)).expect("resolve"),
                sp("aaa-prof"),
                "{}",
                path.display()
            );
        }
    }

    #[test]
    fn stops_at_the_store_entry() {
        let fx = Fixture::new();
        fx.insert("aaa-a", 1, None);
        fx.insert("bbb-b", 1, None);
        fs::create_dir_all(fx.abs("bbb-b")).expect("artifact dir");
        // a store artifact that is itself a symlink is still that artifact
        symlink(fx.abs("bbb-b"), fx.abs("aaa-a")).expect("store symlink");
        let link = fx.dir.path().join("result");
        symlink(fx.abs("aaa-a"), &link).expect("link");

        let store = fx.open();
        assert_eq!(
            store.follow_links_to_store_path(&display(&link)).expect("resolve"),
            sp("aaa-a")
        );
        let sibling = format!("{}/../bbb-b/bin", fx.abs("aaa-a"));
        assert_eq!(
            store.follow_links_to_store_path(&sibling).expect("resolve"),
            sp("bbb-b")
        );
    }

    #[test]
    fn link_loops_are_resolution_errors() {
        let fx = Fixture::new();
        let a = fx.dir.path().join("a");
        let b = fx.dir.path().join("b");
        symlink(&b, &a).expect("a -> b");
        symlink(&a, &b).expect("b -> a");
        let store = fx.open();

        assert!(matches!(
            store.follow_links_to_store_path(&display(&a.join("bin"))),
            Err(NixDuError::Resolution(_))
        ));
        assert!(matches!(
            store.follow_links_to_store_path(&display(&fx.dir.path().join("missing/bin"))),
            Err(NixDuError::Resolution(_))
        ));
    }

    #[test]
    fn non_link_outside_store_fails() {
        let fx = Fixture::new();
        let file = fx.dir.path().join("plain");
        fs::write(&file, "x").expect("write");
        let store = fx.open();
        assert!(store.follow_links_to_store_path(&display(&file)).is_err());
    }

    #[test]
    fn finds_direct_indirect_and_named_roots() {
        let fx = Fixture::new();
        fx.insert("aaa-a", 1, None);
        fx.insert("bbb-b", 1, None);
        fx.insert("ccc-c", 1, None);

        let gcroots = fx.state_dir().join("gcroots");
        let auto = gcroots.join("auto");
        fs::create_dir_all(&auto).expect("gcroots");
        // direct
        symlink(fx.abs("aaa-a"), gcroots.join("booted-system")).expect("direct");
        // indirect: gcroots/auto/x -> <tmp>/result -> store
        let result = fx.dir.path().join("result");
        symlink(fx.abs("bbb-b"), &result).expect("result");
        symlink(&result, auto.join("x")).expect("auto");
        // by name
        fs::write(gcroots.join("ccc-c"), "").expect("named root");
        // dangling links are skipped
        symlink(fx.dir.path().join("gone"), gcroots.join("dangling")).expect("dangling");

        let store = fx.open();
        let roots = store.find_roots().expect("roots");
        let pairs: BTreeSet<(String, String)> = roots
            .iter()
            .map(|r| (r.link.clone(), r.target.to_string()))
            .collect();

        assert!(pairs.contains(&(display(&gcroots.join("booted-system")), "aaa-a".to_string())));
        assert!(pairs.contains(&(display(&result), "bbb-b".to_string())));
        assert!(pairs.contains(&(display(&gcroots.join("ccc-c")), "ccc-c".to_string())));
        assert_eq!(roots.len(), 3);
    }

    #[test]
    fn profile_links_are_roots() {
        let fx = Fixture::new();
        fx.insert("aaa-a", 1, None);
        let profiles = fx.state_dir().join("profiles");
        fs::create_dir_all(&profiles).expect("profiles");
        symlink(fx.abs("aaa-a"), profiles.join("system-1-link")).expect("generation");
        symlink("system-1-link", profiles.join("system")).expect("profile");

        let store = fx.open();
        let roots = store.find_roots().expect("roots");
        // `system` is an indirect root through `system-1-link`, which is
        // also a direct root: both collapse into one entry.
        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].link, display(&profiles.join("system-1-link")));
        assert_eq!(roots[0].target, sp("aaa-a"));
    }

    #[test]
    fn temp_roots_are_transient() {
        let fx = Fixture::new();
        fx.insert("aaa-a", 1, None);
        fx.insert("bbb-b", 1, None);
        let temproots = fx.state_dir().join("temproots");
        fs::create_dir_all(&temproots).expect("temproots");
        fs::write(
            temproots.join("4242"),
            format!("{}\0{}\0{}\0", fx.abs("aaa-a"), fx.abs("zzz-gone"), fx.abs("bbb-b")),
        )
        .expect("temproots file");
        fs::write(temproots.join("4243"), format!("{}\n", fx.abs("aaa-a"))).expect("old format");
        fs::write(temproots.join("not-a-pid"), fx.abs("bbb-b")).expect("stray file");

        let store = fx.open();
        let roots = store.find_roots().expect("roots");
        let pairs: Vec<(String, String)> = roots
            .iter()
            .map(|r| (r.link.clone(), r.target.to_string()))
            .collect();

        assert_eq!(
            pairs,
            vec![
                ("{temp:4242}".to_string(), "aaa-a".to_string()),
                ("{temp:4242}".to_string(), "bbb-b".to_string()),
                ("{temp:4243}".to_string(), "aaa-a".to_string()),
            ]
        );
    }

    #[test]
    fn live_processes_hold_runtime_roots() {
        let fx = Fixture::new();
        fx.insert("aaa-a", 1, None);
        fx.insert("bbb-b", 1, None);
        fx.insert("ccc-c", 1, None);
        let process = fx.dir.path().join("proc/123");
        fs::create_dir_all(process.join("fd")).expect("proc entry");
        fs::create_dir_all(fx.dir.path().join("proc/self")).expect("self entry");
        symlink(format!("{}/bin/a", fx.abs("aaa-a")), process.join("exe")).expect("exe");
        symlink("/tmp", process.join("cwd")).expect("cwd");
        symlink(format!("{}/share/data", fx.abs("ccc-c")), process.join("fd/3")).expect("fd");
        fs::write(
            process.join("maps"),
            format!("7f00-7f01 r-xp 00000000 00:1f 42 {}/lib/libb.so\n", fx.abs("bbb-b")),
        )
        .expect("maps");
        fs::write(
            process.join("environ"),
            format!("PATH={}/bin:{}/bin\0", fx.abs("aaa-a"), fx.abs("zzz-gone")),
        )
        .expect("environ");
        // entries that are not processes are ignored
        symlink(fx.abs("zzz-other"), fx.dir.path().join("proc/self/exe")).expect("self exe");

        let store = fx.open();
        let roots = store.find_roots().expect("roots");
        let pairs: Vec<(String, String)> = roots
            .iter()
            .map(|r| (r.link.clone(), r.target.to_string()))
            .collect();

        assert_eq!(
            pairs,
            vec![
                ("{memory:0}".to_string(), "aaa-a".to_string()),
                ("{memory:1}".to_string(), "bbb-b".to_string()),
                ("{memory:2}".to_string(), "ccc-c".to_string()),
            ]
        );
    }

    #[test]
    fn store_paths_found_in_text() {
        let found = store_paths_in(
            "/nix/store",
            "LD=/nix/store/aaa-glibc-2.39/lib:/nix/store/.links/x /nix/store/bbb-b",
        );
        assert_eq!(found, vec![sp("aaa-glibc-2.39"), sp("bbb-b")]);
    }
}
