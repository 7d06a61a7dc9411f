//! # System Module
//!
//! Disk-usage statistics computed over a finished dependency graph.

mod stats;

pub use stats::*;
