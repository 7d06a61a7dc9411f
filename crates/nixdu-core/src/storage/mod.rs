//! # Storage Module
//!
//! Persistent graph storage backed by redb.

mod redb_graph;

pub use redb_graph::RedbGraph;
