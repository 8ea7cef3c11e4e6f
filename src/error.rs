//! Error types for slide-bench operations.
//!
//! Defines error types for the subsystems that can fail:
//! - Dataset discovery
//! - Round report parsing
//! - Run artifact persistence

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while discovering benchmark tasks.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("Dataset root does not exist: {0}")]
    RootNotFound(PathBuf),

    #[error("Item '{item}' not found at {path}")]
    ItemNotFound { item: String, path: PathBuf },

    #[error("An item id requires a specific category, got 'all'")]
    ItemWithoutCategory,

    #[error("Directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),
}

/// Errors that can occur while reading a round's score reports.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Report file missing: {0}")]
    Missing(PathBuf),

    #[error("Invalid value for '{label}' in {path}: {value:?}")]
    InvalidValue {
        path: PathBuf,
        label: String,
        value: String,
    },

    #[error("Score for '{label}' in {path} is outside [0, {max}]: {value}")]
    OutOfRange {
        path: PathBuf,
        label: String,
        value: f64,
        max: f64,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ReportError {
    /// Whether this error means the round was never fully written.
    pub fn is_missing(&self) -> bool {
        matches!(self, ReportError::Missing(_))
    }
}

/// Errors that can occur while persisting run artifacts.
#[derive(Debug, Error)]
pub enum ReporterError {
    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
