//! Configuration for re-scoring and gathering a finished run.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::aggregator::TieBreak;
use crate::dataset::{Category, CategoryFilter};
use crate::pipeline::config::{parse_env_value, validate_run_id};
use crate::pipeline::{default_max_workers, ConfigError, DEFAULT_MAX_ROUNDS};
use crate::scheduler::WorkerPoolConfig;

/// Default time ceiling for one scorer process.
pub const DEFAULT_SCORER_TIMEOUT_SECS: u64 = 600;

/// Configuration for the `evaluate` and `gather` phases of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationConfig {
    /// Dataset root holding the ground-truth decks.
    pub dataset_path: PathBuf,
    /// Root under which runs are stored.
    pub output_root: PathBuf,
    /// Run to evaluate.
    pub run_id: String,
    /// Categories to evaluate.
    pub task: CategoryFilter,

    /// Interpreter used to launch the scorers.
    pub python: String,
    /// Reference-based scorer script.
    pub ref_based_script: PathBuf,
    /// Reference-free scorer script.
    pub ref_free_script: PathBuf,
    /// Time ceiling per scorer process, in seconds.
    pub scorer_timeout_secs: u64,

    /// Number of items processed at once.
    pub max_workers: usize,
    /// Highest round number scanned when gathering.
    pub max_rounds: u32,
    /// Which round wins when composites tie.
    pub tie_break: TieBreak,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            dataset_path: PathBuf::from("data/autopresent/examples"),
            output_root: PathBuf::from("output/autopresent"),
            run_id: String::new(),
            task: CategoryFilter::All,

            python: "python".to_string(),
            ref_based_script: PathBuf::from("evaluators/autopresent/page_eval.py"),
            ref_free_script: PathBuf::from("evaluators/autopresent/reference_free_eval.py"),
            scorer_timeout_secs: DEFAULT_SCORER_TIMEOUT_SECS,

            max_workers: default_max_workers(),
            max_rounds: DEFAULT_MAX_ROUNDS,
            tie_break: TieBreak::default(),
        }
    }
}

impl EvaluationConfig {
    /// Creates a configuration for the given run with default values.
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            ..Self::default()
        }
    }

    /// Creates configuration for the given run from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `SLIDE_BENCH_DATASET_PATH`: Dataset root
    /// - `SLIDE_BENCH_OUTPUT_ROOT`: Output root
    /// - `SLIDE_BENCH_PYTHON`: Interpreter
    /// - `SLIDE_BENCH_MAX_WORKERS`: Worker count
    /// - `SLIDE_BENCH_MAX_ROUNDS`: Scan window (default: 10)
    /// - `SLIDE_BENCH_SCORER_TIMEOUT_SECS`: Ceiling per scorer (default: 600)
    /// - `SLIDE_BENCH_REF_BASED_SCRIPT`: Reference-based scorer script
    /// - `SLIDE_BENCH_REF_FREE_SCRIPT`: Reference-free scorer script
    pub fn from_env(run_id: impl Into<String>) -> Result<Self, ConfigError> {
        let mut config = Self::new(run_id);

        if let Ok(val) = std::env::var("SLIDE_BENCH_DATASET_PATH") {
            config.dataset_path = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("SLIDE_BENCH_OUTPUT_ROOT") {
            config.output_root = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("SLIDE_BENCH_PYTHON") {
            config.python = val;
        }
        if let Ok(val) = std::env::var("SLIDE_BENCH_MAX_WORKERS") {
            config.max_workers = parse_env_value(&val, "SLIDE_BENCH_MAX_WORKERS")?;
        }
        if let Ok(val) = std::env::var("SLIDE_BENCH_MAX_ROUNDS") {
            config.max_rounds = parse_env_value(&val, "SLIDE_BENCH_MAX_ROUNDS")?;
        }
        if let Ok(val) = std::env::var("SLIDE_BENCH_SCORER_TIMEOUT_SECS") {
            config.scorer_timeout_secs = parse_env_value(&val, "SLIDE_BENCH_SCORER_TIMEOUT_SECS")?;
        }
        if let Ok(val) = std::env::var("SLIDE_BENCH_REF_BASED_SCRIPT") {
            config.ref_based_script = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("SLIDE_BENCH_REF_FREE_SCRIPT") {
            config.ref_free_script = PathBuf::from(val);
        }

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_run_id(&self.run_id)?;

        if self.max_workers == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_workers must be greater than 0".to_string(),
            ));
        }
        if self.max_rounds == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_rounds must be greater than 0".to_string(),
            ));
        }
        if self.scorer_timeout_secs == 0 {
            return Err(ConfigError::ValidationFailed(
                "scorer_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.python.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "python cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Directory of the run being evaluated.
    pub fn run_dir(&self) -> PathBuf {
        self.output_root.join(&self.run_id)
    }

    /// Directory holding one category's items within the run.
    pub fn category_dir(&self, category: Category) -> PathBuf {
        self.run_dir().join(category.dir_name())
    }

    /// Time ceiling per scorer process.
    pub fn scorer_timeout(&self) -> Duration {
        Duration::from_secs(self.scorer_timeout_secs)
    }

    /// Worker pool settings for per-item parallelism.
    pub fn pool_config(&self) -> WorkerPoolConfig {
        WorkerPoolConfig::new(self.max_workers)
    }

    /// Sets the dataset root.
    pub fn with_dataset_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.dataset_path = path.into();
        self
    }

    /// Sets the output root.
    pub fn with_output_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_root = path.into();
        self
    }

    /// Sets the category filter.
    pub fn with_task(mut self, task: CategoryFilter) -> Self {
        self.task = task;
        self
    }

    /// Sets the interpreter.
    pub fn with_python(mut self, python: impl Into<String>) -> Self {
        self.python = python.into();
        self
    }

    /// Sets both scorer scripts.
    pub fn with_scorers(
        self,
        ref_based: impl Into<PathBuf>,
        ref_free: impl Into<PathBuf>,
    ) -> Self {
        self.with_ref_based_script(ref_based)
            .with_ref_free_script(ref_free)
    }

    /// Sets the reference-based scorer script.
    pub fn with_ref_based_script(mut self, path: impl Into<PathBuf>) -> Self {
        self.ref_based_script = path.into();
        self
    }

    /// Sets the reference-free scorer script.
    pub fn with_ref_free_script(mut self, path: impl Into<PathBuf>) -> Self {
        self.ref_free_script = path.into();
        self
    }

    /// Sets the scorer ceiling.
    pub fn with_scorer_timeout(mut self, timeout: Duration) -> Self {
        self.scorer_timeout_secs = timeout.as_secs();
        self
    }

    /// Sets the worker count.
    pub fn with_max_workers(mut self, workers: usize) -> Self {
        self.max_workers = workers;
        self
    }

    /// Sets the round scan window.
    pub fn with_max_rounds(mut self, rounds: u32) -> Self {
        self.max_rounds = rounds;
        self
    }

    /// Sets the tie-break rule.
    pub fn with_tie_break(mut self, tie_break: TieBreak) -> Self {
        self.tie_break = tie_break;
        self
    }
}
