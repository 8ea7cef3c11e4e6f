//! Command-line interface for slide-bench.
//!
//! Provides the `run`, `evaluate` and `gather` commands.

mod commands;

pub use commands::{gather_run, parse_cli, run, run_with_cli, Cli, Commands};
