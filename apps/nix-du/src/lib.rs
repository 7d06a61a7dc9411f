//! # nix-du
//!
//! Library half of the `nix-du` binary: configuration and command
//! implementations, exposed for integration tests.

pub mod cli;
pub mod config;
