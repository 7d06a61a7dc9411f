//! # nix-du CLI Module
//!
//! This module implements the CLI interface for nix-du.
//!
//! ## Available Commands
//!
//! - `scan` - Build the dependency graph of the store and save it
//! - `status` - Show size statistics of the saved graph
//! - `roots` - List the gc-roots of the saved graph
//! - `top` - List the largest store paths
//! - `export` - Export the saved graph to a file
//! - `hash` - Compute BLAKE3 cryptographic hash of the graph

mod commands;

use crate::config::{Config, OutputBackend};
use clap::{Parser, Subcommand};
use nixdu_core::{DEFAULT_TOP_COUNT, NixDuError};
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// nix-du - where does the disk space of a Nix store go?
///
/// Builds the dependency graph of the store, with gc-roots as nodes,
/// and reports how much of the store each root keeps alive.
#[derive(Parser, Debug)]
#[command(name = "nix-du")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Configuration file (default: $NIX_DU_CONFIG)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to the graph database
    #[arg(short = 'D', long, global = true)]
    pub database: Option<PathBuf>,

    /// Storage backend: "redb" (ACID database) or "file" (canonical file)
    #[arg(short = 'B', long, global = true)]
    pub backend: Option<String>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build the dependency graph and save it to the database
    Scan {
        /// Only the closure of this store path or link (no gc-roots)
        #[arg(short, long)]
        root: Option<String>,

        /// Read the store from a JSON snapshot instead of the Nix database
        #[arg(short, long)]
        snapshot: Option<PathBuf>,

        /// Override keep-derivations (true, false)
        #[arg(long, value_name = "BOOL")]
        keep_derivations: Option<bool>,

        /// Override keep-outputs (true, false)
        #[arg(long, value_name = "BOOL")]
        keep_outputs: Option<bool>,
    },

    /// Show size statistics of the saved graph
    Status,

    /// List gc-roots and what they point to
    Roots,

    /// List the largest store paths
    Top {
        /// Number of entries
        #[arg(short = 'n', long, default_value_t = DEFAULT_TOP_COUNT)]
        count: usize,
    },

    /// Export graph in canonical format
    Export {
        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        /// Export format (canonical, json)
        #[arg(short = 't', long, default_value = "canonical")]
        format: String,
    },

    /// Compute BLAKE3 cryptographic hash of graph
    Hash,
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub fn execute(cli: Cli) -> Result<(), NixDuError> {
    let config = Config::load(cli.config.as_deref())?;
    let target = GraphTarget {
        database: cli
            .database
            .clone()
            .unwrap_or_else(|| config.output.database.clone()),
        backend: match cli.backend.as_deref() {
            Some(name) => name.parse::<OutputBackend>()?,
            None => config.output.backend,
        },
    };
    let json_mode = cli.json;

    match cli.command {
        Some(Commands::Scan {
            root,
            snapshot,
            keep_derivations,
            keep_outputs,
        }) => cmd_scan(
            &config,
            &target,
            json_mode,
            root.as_deref(),
            snapshot.as_deref(),
            keep_derivations,
            keep_outputs,
        ),
        Some(Commands::Status) => cmd_status(&target, json_mode),
        Some(Commands::Roots) => cmd_roots(&target, json_mode),
        Some(Commands::Top { count }) => cmd_top(&target, json_mode, count),
        Some(Commands::Export { output, format }) => cmd_export(&target, &output, &format),
        Some(Commands::Hash) => cmd_hash(&target, json_mode),
        None => {
            // No subcommand - show status by default
            cmd_status(&target, json_mode)
        }
    }
}
