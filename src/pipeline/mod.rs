//! Generation pipeline wiring.
//!
//! The slide generation pipeline is an external program. For each task it
//! is launched once with the task's inputs and the run-level settings, and
//! writes numbered round directories into the task's output directory:
//!
//! ```text
//! <output_root>/<run_id>/<category>/slide_<n>/<round>/refine.pptx
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use slide_bench::pipeline::{build_pipeline_command, PipelineConfig};
//!
//! let config = PipelineConfig::from_env()?.with_max_rounds(5);
//! let spec = build_pipeline_command(&config, &task, &config.task_output_dir(&task));
//! println!("{}", spec.display());
//! ```

pub mod command;
pub mod config;

pub use command::{build_pipeline_command, PIPELINE_LOG};
pub use config::{
    default_max_workers, default_run_id, ConfigError, PipelineConfig, DEFAULT_MAX_ROUNDS,
    DEFAULT_TASK_TIMEOUT_SECS,
};
