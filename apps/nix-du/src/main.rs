//! # nix-du
//!
//! Where does the disk space of a Nix store go?
//!
//! This application provides:
//! - A scan of the store into a dependency graph (gc-roots included)
//! - Size reports over the saved graph
//! - Canonical export and hashing of the graph
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                  apps/nix-du (THE BINARY)                 │
//! │                                                           │
//! │   ┌─────────────┐    ┌──────────────┐    ┌────────────┐   │
//! │   │    CLI      │    │    Config    │    │  Logging   │   │
//! │   │   (clap)    │    │ (toml+serde) │    │ (tracing)  │   │
//! │   └──────┬──────┘    └──────┬───────┘    └────────────┘   │
//! │          └─────────┬────────┘                             │
//! │                    ▼                                      │
//! │            ┌───────────────┐      ┌──────────────────┐    │
//! │            │  nixdu-core   │ ───▶ │ redb / canonical │    │
//! │            │  (THE ENGINE) │      │   graph file     │    │
//! │            └───────────────┘      └──────────────────┘    │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! # Scan the local store, then report
//! nix-du scan
//! nix-du status
//! nix-du roots
//! nix-du top -n 20
//!
//! # Closure of a single profile
//! nix-du -D system.redb scan --root /run/current-system
//! ```

use clap::Parser;
use nix_du::cli;
use std::io::IsTerminal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Environment variable selecting the log format (`json` or text).
const LOG_FORMAT_ENV: &str = "NIX_DU_LOG_FORMAT";

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

fn main() {
    // Parse CLI arguments first: --verbose/--quiet pick the default filter
    let cli = cli::Cli::parse();

    init_tracing(cli.verbose, cli.quiet);

    // Execute command
    if let Err(e) = cli::execute(cli) {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Install the tracing subscriber. Logs go to stderr; `RUST_LOG` overrides
/// the level picked from the flags, NIX_DU_LOG_FORMAT=json switches to JSON.
fn init_tracing(verbose: bool, quiet: bool) {
    let log_format = std::env::var(LOG_FORMAT_ENV).unwrap_or_else(|_| "text".to_string());

    let default_filter = if verbose {
        "nix_du=debug,nixdu_core=debug"
    } else if quiet {
        "nix_du=warn,nixdu_core=warn"
    } else {
        "nix_du=info,nixdu_core=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(std::io::stderr),
                )
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(std::io::stderr().is_terminal())
                        .with_writer(std::io::stderr),
                )
                .init();
        }
    }
}
