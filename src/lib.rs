//! slide-bench: Benchmark harness for slide generation pipelines.
//!
//! This library discovers benchmark tasks, runs the external generation
//! pipeline for each under a time ceiling, re-scores every generated round
//! with external scorers, and aggregates each item's best round into
//! benchmark scores.

// Core modules
pub mod cli;
pub mod dataset;
pub mod error;
pub mod evaluation;
pub mod pipeline;
pub mod report;
pub mod runner;
pub mod scheduler;

// Re-export commonly used error types
pub use error::{DatasetError, ReportError, ReporterError};
