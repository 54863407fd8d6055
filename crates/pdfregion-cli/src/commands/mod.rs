//! Subcommand implementations.

pub mod batch;
pub mod config;
pub mod extract;
pub mod region;
