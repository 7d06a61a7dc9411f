//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.

use crate::config::{Config, OutputBackend, StoreBackend};
use nixdu_core::{
    DepGraph, GraphStats, MemoryStore, NixDbStore, NixDuError, RedbGraph, RootSpec,
    SerializableGraph, StoreOracle, StorePath, canonical_checksum, canonical_crypto_hash,
    export_canonical, format_size, import_canonical, largest_nodes, populate_graph, root_usage,
};
use serde::Serialize;
use std::path::{Path, PathBuf};

// =============================================================================
// FILE SIZE LIMITS
// =============================================================================

/// Maximum size of a store snapshot (500 MB).
const MAX_SNAPSHOT_FILE_SIZE: u64 = 500 * 1024 * 1024;

/// Maximum size of a file-backend graph database (500 MB).
const MAX_GRAPH_FILE_SIZE: u64 = 500 * 1024 * 1024;

/// Validate file size before reading.
fn validate_file_size(path: &Path, max_size: u64) -> Result<(), NixDuError> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| NixDuError::Io(format!("Cannot read file metadata: {}", e)))?;

    if metadata.len() > max_size {
        return Err(NixDuError::Io(format!(
            "File size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            max_size
        )));
    }
    Ok(())
}

/// Validate output path: the parent directory must exist.
fn validate_output_path(path: &Path) -> Result<PathBuf, NixDuError> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let canonical_parent = parent.canonicalize().map_err(|e| {
        NixDuError::Io(format!(
            "Invalid output directory '{}': {}",
            parent.display(),
            e
        ))
    })?;

    if !canonical_parent.is_dir() {
        return Err(NixDuError::Io(format!(
            "Output directory '{}' is not a valid directory",
            parent.display()
        )));
    }

    let filename = path
        .file_name()
        .ok_or_else(|| NixDuError::Io("Output path has no filename".to_string()))?;

    Ok(canonical_parent.join(filename))
}

/// Print a value as pretty JSON on stdout.
fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), NixDuError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| NixDuError::Serialization(e.to_string()))?;
    println!("{}", text);
    Ok(())
}

// =============================================================================
// GRAPH TARGET
// =============================================================================

/// Where the graph database lives and in which format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphTarget {
    pub database: PathBuf,
    pub backend: OutputBackend,
}

/// Load the saved graph.
pub fn load_graph(target: &GraphTarget) -> Result<DepGraph, NixDuError> {
    if !target.database.exists() {
        return Err(NixDuError::Io(format!(
            "no graph at {}; run `nix-du scan` first",
            target.database.display()
        )));
    }

    match target.backend {
        OutputBackend::Redb => RedbGraph::open(&target.database)?.load_graph(),
        OutputBackend::File => {
            validate_file_size(&target.database, MAX_GRAPH_FILE_SIZE)?;
            let data = std::fs::read(&target.database)
                .map_err(|e| NixDuError::Io(format!("Read db: {}", e)))?;

            // Try canonical format first
            if let Ok(graph) = import_canonical(&data) {
                return Ok(graph);
            }

            // Try JSON format
            if let Ok(serializable) = serde_json::from_slice::<SerializableGraph>(&data) {
                return DepGraph::try_from(serializable);
            }

            Err(NixDuError::Deserialization(
                "Could not parse database file".to_string(),
            ))
        }
    }
}

/// Save a graph, replacing whatever was saved before.
pub fn save_graph(graph: &DepGraph, target: &GraphTarget) -> Result<(), NixDuError> {
    match target.backend {
        OutputBackend::Redb => {
            let mut db = RedbGraph::open(&target.database)?;
            db.write_graph(graph)?;
            db.compact()
        }
        OutputBackend::File => {
            let data = export_canonical(graph)?;
            std::fs::write(&target.database, &data)
                .map_err(|e| NixDuError::Io(format!("Write db: {}", e)))
        }
    }
}

// =============================================================================
// SCAN COMMAND
// =============================================================================

/// Turn the `--root` argument into a root spec.
///
/// A path that exists on the filesystem (`./result`, `~/.nix-profile`) or
/// contains a `/` is a link, made absolute against the working directory.
/// Anything else must be a bare store path name.
pub fn parse_root(arg: &str) -> Result<RootSpec, NixDuError> {
    let path = Path::new(arg);
    if arg.contains('/') || std::fs::symlink_metadata(path).is_ok() {
        let absolute = std::path::absolute(path)
            .map_err(|e| NixDuError::InvalidRoot(format!("{}: {}", arg, e)))?;
        return Ok(RootSpec::Link(absolute.to_string_lossy().into_owned()));
    }
    StorePath::new(arg)
        .map(RootSpec::Path)
        .map_err(|e| NixDuError::InvalidRoot(e.to_string()))
}

/// Open the store oracle named by the configuration or `--snapshot`.
pub fn open_oracle(
    config: &Config,
    snapshot: Option<&Path>,
) -> Result<Box<dyn StoreOracle>, NixDuError> {
    let snapshot = match (snapshot, config.store.backend) {
        (Some(path), _) => Some(path.to_path_buf()),
        (None, StoreBackend::Snapshot) => Some(config.store.snapshot.clone().ok_or_else(|| {
            NixDuError::Config("store.backend = \"snapshot\" needs store.snapshot".to_string())
        })?),
        (None, StoreBackend::NixDb) => None,
    };

    match snapshot {
        Some(path) => {
            validate_file_size(&path, MAX_SNAPSHOT_FILE_SIZE)?;
            tracing::info!("Reading store snapshot {:?}", path);
            Ok(Box::new(MemoryStore::load(&path)?))
        }
        None => {
            tracing::info!(
                "Reading Nix store {} (state in {:?})",
                config.store.store_dir,
                config.store.state_dir
            );
            let store = NixDbStore::open(
                config.store.state_dir.clone(),
                config.store.store_dir.clone(),
            )?
            .with_proc_dir(config.store.proc_dir.clone());
            Ok(Box::new(store))
        }
    }
}

/// Build the dependency graph and save it.
pub fn cmd_scan(
    config: &Config,
    target: &GraphTarget,
    json_mode: bool,
    root: Option<&str>,
    snapshot: Option<&Path>,
    keep_derivations: Option<bool>,
    keep_outputs: Option<bool>,
) -> Result<(), NixDuError> {
    let policy = config.resolve_policy(keep_derivations, keep_outputs)?;
    let root = root.map(parse_root).transpose()?;
    let oracle = open_oracle(config, snapshot)?;

    let mut graph = DepGraph::new();
    let stats = populate_graph(&*oracle, &mut graph, root.as_ref(), policy)?;
    save_graph(&graph, target)?;
    tracing::info!(
        "Saved graph to {:?} ({} backend)",
        target.database,
        target.backend
    );

    if json_mode {
        let output = serde_json::json!({
            "database": target.database.to_string_lossy(),
            "backend": target.backend.to_string(),
            "keep_derivations": policy.keep_derivations,
            "keep_outputs": policy.keep_outputs,
            "artifact_nodes": stats.artifact_nodes,
            "root_nodes": stats.root_nodes,
            "edges": graph.edge_count(),
            "skipped_roots": stats.skipped_roots
        });
        return print_json(&output);
    }

    println!(
        "Scanned {} store paths, {} gc-roots, {} edges",
        stats.artifact_nodes,
        stats.root_nodes,
        graph.edge_count()
    );
    if stats.skipped_roots > 0 {
        println!("Skipped {} roots to invalid paths", stats.skipped_roots);
    }
    println!("Saved to {:?}", target.database);

    Ok(())
}

// =============================================================================
// STATUS COMMAND
// =============================================================================

/// Show size statistics.
///
/// A graph from `scan --root` has no gc-roots: its whole closure is reported
/// as alive.
pub fn cmd_status(target: &GraphTarget, json_mode: bool) -> Result<(), NixDuError> {
    let graph = load_graph(target)?;
    let stats = GraphStats::from_graph(&graph);
    let closure_of = stats
        .closure_of
        .and_then(|id| graph.node(id))
        .map(|node| node.path.clone());

    if json_mode {
        let output = serde_json::json!({
            "database": target.database.to_string_lossy(),
            "backend": target.backend.to_string(),
            "closure_of": closure_of,
            "node_count": stats.node_count,
            "edge_count": stats.edge_count,
            "root_count": stats.root_count,
            "transient_root_count": stats.transient_root_count,
            "total_size": stats.total_size,
            "alive_size": stats.alive_size,
            "dead_size": stats.dead_size,
            "alive_permille": stats.alive_permille()
        });
        return print_json(&output);
    }

    println!("nix-du Graph Status");
    println!("===================");
    println!("Database: {:?}", target.database);
    println!("Backend:  {}", target.backend);
    println!();

    if let Some(path) = closure_of {
        println!("Size statistics for the closure of {}", path);
        println!();
        println!("Store paths: {}", stats.artifact_count());
        println!("Edges:       {}", stats.edge_count);
        println!("Total size:  {}", format_size(stats.total_size));
        return Ok(());
    }

    println!("Store paths: {}", stats.artifact_count());
    println!(
        "Gc-roots:    {} ({} transient)",
        stats.root_count, stats.transient_root_count
    );
    println!("Edges:       {}", stats.edge_count);
    println!();
    println!("Total size:  {}", format_size(stats.total_size));
    println!(
        "Alive:       {} ({} per thousand)",
        format_size(stats.alive_size),
        stats.alive_permille()
    );
    println!("Collectable: {}", format_size(stats.dead_size));

    Ok(())
}

// =============================================================================
// ROOTS COMMAND
// =============================================================================

/// List gc-roots with the size of what they keep alive.
pub fn cmd_roots(target: &GraphTarget, json_mode: bool) -> Result<(), NixDuError> {
    let graph = load_graph(target)?;
    let usage = root_usage(&graph);

    if json_mode {
        return print_json(&usage);
    }

    if usage.is_empty() {
        println!("No gc-roots in graph");
        return Ok(());
    }

    for root in &usage {
        let marker = if root.transient { " (transient)" } else { "" };
        println!(
            "{:>10}  {}{} -> {}",
            format_size(root.closure_size),
            root.link,
            marker,
            root.targets.join(", ")
        );
    }

    Ok(())
}

// =============================================================================
// TOP COMMAND
// =============================================================================

/// List the largest store paths.
pub fn cmd_top(target: &GraphTarget, json_mode: bool, count: usize) -> Result<(), NixDuError> {
    let graph = load_graph(target)?;
    let top = largest_nodes(&graph, count);

    if json_mode {
        return print_json(&top);
    }

    for node in &top {
        println!("{:>10}  {}", format_size(node.size), node.path);
    }

    Ok(())
}

// =============================================================================
// EXPORT COMMAND
// =============================================================================

/// Export the saved graph.
pub fn cmd_export(target: &GraphTarget, output: &Path, format: &str) -> Result<(), NixDuError> {
    let validated_output = validate_output_path(output)?;
    let graph = load_graph(target)?;

    let data = match format {
        "canonical" => {
            let data = export_canonical(&graph)?;
            let checksum = canonical_checksum(&graph);
            println!("Checksum: {}", checksum);
            data
        }
        "json" => {
            let serializable = SerializableGraph::from(&graph);
            serde_json::to_vec_pretty(&serializable)
                .map_err(|e| NixDuError::Serialization(e.to_string()))?
        }
        _ => {
            return Err(NixDuError::Serialization(format!(
                "Unknown format: {}. Use: canonical, json",
                format
            )));
        }
    };

    std::fs::write(&validated_output, &data)
        .map_err(|e| NixDuError::Io(format!("Write file: {}", e)))?;

    println!("Exported {} bytes to {:?}", data.len(), validated_output);

    Ok(())
}

// =============================================================================
// HASH COMMAND
// =============================================================================

/// Print the BLAKE3 hash of the canonical export.
pub fn cmd_hash(target: &GraphTarget, json_mode: bool) -> Result<(), NixDuError> {
    let graph = load_graph(target)?;
    let hash = canonical_crypto_hash(&graph)?;
    let checksum = canonical_checksum(&graph);

    if json_mode {
        let output = serde_json::json!({
            "blake3": hash,
            "checksum": checksum,
            "node_count": graph.node_count(),
            "edge_count": graph.edge_count()
        });
        return print_json(&output);
    }

    println!("BLAKE3:   {}", hash);
    println!("Checksum: {}", checksum);

    Ok(())
}
