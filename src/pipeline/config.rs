//! Configuration for generation runs.
//!
//! A run dispatches one generation pipeline process per task. This module
//! holds everything that process needs from the run level (model, round
//! budget, collaborator script paths) together with the scheduling knobs
//! (worker count, time ceiling, execution mode).

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dataset::{CategoryFilter, TaskUnit};

/// Default time ceiling for one generation process.
pub const DEFAULT_TASK_TIMEOUT_SECS: u64 = 3600;

/// Default number of generation rounds per item.
pub const DEFAULT_MAX_ROUNDS: u32 = 10;

/// Upper bound for the default worker count.
const MAX_DEFAULT_WORKERS: usize = 8;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Default worker count: `min(8, available parallelism)`.
pub fn default_max_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
        .min(MAX_DEFAULT_WORKERS)
}

/// Default run identifier: the local start time, `%Y%m%d_%H%M%S`.
pub fn default_run_id() -> String {
    chrono::Local::now().format("%Y%m%d_%H%M%S").to_string()
}

/// Configuration for a generation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    // Dataset selection
    /// Dataset root containing one directory per category.
    pub dataset_path: PathBuf,
    /// Category selection.
    pub task: CategoryFilter,
    /// Single item to run (the `<n>` of `slide_<n>`).
    pub task_id: Option<String>,

    // Output
    /// Root under which each run gets its own directory.
    pub output_root: PathBuf,
    /// Identifier of this run; names the run directory.
    pub run_id: String,

    // Generation pipeline
    /// Interpreter used to launch the pipeline.
    pub python: String,
    /// Pipeline entry script.
    pub pipeline_entry: PathBuf,
    /// Pipeline mode flag.
    pub mode: String,
    /// Vision model identifier passed through to the pipeline.
    pub vision_model: String,
    /// Model API key. Never written to run artifacts.
    #[serde(skip)]
    pub api_key: Option<String>,
    /// Round budget per item.
    pub max_rounds: u32,
    /// Generator agent script.
    pub generator_script: PathBuf,
    /// Verifier agent script.
    pub verifier_script: PathBuf,
    /// Slides execution server script (generator side).
    pub slides_server_path: PathBuf,
    /// Image processing server script (verifier side).
    pub image_server_path: PathBuf,

    // Scheduling
    /// Number of pipeline processes allowed to run at once.
    pub max_workers: usize,
    /// Run tasks one after another instead of on the worker pool.
    pub sequential: bool,
    /// Time ceiling per pipeline process, in seconds.
    pub task_timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            dataset_path: PathBuf::from("data/autopresent/examples"),
            task: CategoryFilter::All,
            task_id: None,

            output_root: PathBuf::from("output/autopresent"),
            run_id: default_run_id(),

            python: "python".to_string(),
            pipeline_entry: PathBuf::from("main.py"),
            mode: "autopresent".to_string(),
            vision_model: "gpt-4o".to_string(),
            api_key: None,
            max_rounds: DEFAULT_MAX_ROUNDS,
            generator_script: PathBuf::from("agents/generator_mcp.py"),
            verifier_script: PathBuf::from("agents/verifier_mcp.py"),
            slides_server_path: PathBuf::from("servers/generator/slides.py"),
            image_server_path: PathBuf::from("servers/verifier/image.py"),

            max_workers: default_max_workers(),
            sequential: false,
            task_timeout_secs: DEFAULT_TASK_TIMEOUT_SECS,
        }
    }
}

impl PipelineConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `SLIDE_BENCH_DATASET_PATH`: Dataset root (default: data/autopresent/examples)
    /// - `SLIDE_BENCH_OUTPUT_ROOT`: Output root (default: output/autopresent)
    /// - `SLIDE_BENCH_PYTHON`: Interpreter (default: python)
    /// - `SLIDE_BENCH_VISION_MODEL`: Vision model (default: gpt-4o)
    /// - `SLIDE_BENCH_MAX_ROUNDS`: Round budget (default: 10)
    /// - `SLIDE_BENCH_MAX_WORKERS`: Worker count (default: min(8, cpus))
    /// - `SLIDE_BENCH_TASK_TIMEOUT_SECS`: Ceiling per task (default: 3600)
    /// - `SLIDE_BENCH_PIPELINE_ENTRY`: Pipeline entry script (default: main.py)
    /// - `SLIDE_BENCH_GENERATOR_SCRIPT`: Generator agent script
    /// - `SLIDE_BENCH_VERIFIER_SCRIPT`: Verifier agent script
    /// - `SLIDE_BENCH_SLIDES_SERVER_PATH`: Slides execution server script
    /// - `SLIDE_BENCH_IMAGE_SERVER_PATH`: Image processing server script
    /// - `OPENAI_API_KEY`: Model API key
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable has an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("SLIDE_BENCH_DATASET_PATH") {
            config.dataset_path = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("SLIDE_BENCH_OUTPUT_ROOT") {
            config.output_root = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("SLIDE_BENCH_PYTHON") {
            config.python = val;
        }

        if let Ok(val) = std::env::var("SLIDE_BENCH_VISION_MODEL") {
            config.vision_model = val;
        }

        if let Ok(val) = std::env::var("SLIDE_BENCH_MAX_ROUNDS") {
            config.max_rounds = parse_env_value(&val, "SLIDE_BENCH_MAX_ROUNDS")?;
        }

        if let Ok(val) = std::env::var("SLIDE_BENCH_MAX_WORKERS") {
            config.max_workers = parse_env_value(&val, "SLIDE_BENCH_MAX_WORKERS")?;
        }

        if let Ok(val) = std::env::var("SLIDE_BENCH_TASK_TIMEOUT_SECS") {
            config.task_timeout_secs = parse_env_value(&val, "SLIDE_BENCH_TASK_TIMEOUT_SECS")?;
        }

        if let Ok(val) = std::env::var("SLIDE_BENCH_PIPELINE_ENTRY") {
            config.pipeline_entry = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("SLIDE_BENCH_GENERATOR_SCRIPT") {
            config.generator_script = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("SLIDE_BENCH_VERIFIER_SCRIPT") {
            config.verifier_script = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("SLIDE_BENCH_SLIDES_SERVER_PATH") {
            config.slides_server_path = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("SLIDE_BENCH_IMAGE_SERVER_PATH") {
            config.image_server_path = PathBuf::from(val);
        }

        config.api_key = std::env::var("OPENAI_API_KEY").ok();

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if any values are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
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

        if self.task_timeout_secs == 0 {
            return Err(ConfigError::ValidationFailed(
                "task_timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.python.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "python cannot be empty".to_string(),
            ));
        }

        if self.vision_model.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "vision_model cannot be empty".to_string(),
            ));
        }

        validate_run_id(&self.run_id)?;

        if self.task_id.is_some() && self.task == CategoryFilter::All {
            return Err(ConfigError::ValidationFailed(
                "task_id requires a specific category".to_string(),
            ));
        }

        Ok(())
    }

    /// Time ceiling per pipeline process.
    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.task_timeout_secs)
    }

    /// Directory holding everything this run writes.
    pub fn run_dir(&self) -> PathBuf {
        self.output_root.join(&self.run_id)
    }

    /// Output directory owned by one task: `<run_dir>/<category>/<item>`.
    pub fn task_output_dir(&self, task: &TaskUnit) -> PathBuf {
        self.run_dir()
            .join(task.category.dir_name())
            .join(&task.item)
    }

    /// Human-readable execution mode, as recorded in the run summary.
    pub fn execution_mode(&self) -> String {
        if self.sequential {
            "sequential".to_string()
        } else {
            format!("parallel_{}_workers", self.max_workers)
        }
    }

    /// Sets the dataset root.
    pub fn with_dataset_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.dataset_path = path.into();
        self
    }

    /// Sets the category filter and optional single item.
    pub fn with_selection(mut self, task: CategoryFilter, task_id: Option<String>) -> Self {
        self.task = task;
        self.task_id = task_id;
        self
    }

    /// Sets the output root.
    pub fn with_output_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_root = path.into();
        self
    }

    /// Sets the run identifier.
    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = run_id.into();
        self
    }

    /// Sets the interpreter.
    pub fn with_python(mut self, python: impl Into<String>) -> Self {
        self.python = python.into();
        self
    }

    /// Sets the vision model.
    pub fn with_vision_model(mut self, model: impl Into<String>) -> Self {
        self.vision_model = model.into();
        self
    }

    /// Sets the API key.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the round budget.
    pub fn with_max_rounds(mut self, rounds: u32) -> Self {
        self.max_rounds = rounds;
        self
    }

    /// Sets the worker count.
    pub fn with_max_workers(mut self, workers: usize) -> Self {
        self.max_workers = workers;
        self
    }

    /// Enables or disables sequential execution.
    pub fn with_sequential(mut self, sequential: bool) -> Self {
        self.sequential = sequential;
        self
    }

    /// Sets the per-task time ceiling.
    pub fn with_task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout_secs = timeout.as_secs();
        self
    }

    /// Sets the pipeline entry script.
    pub fn with_pipeline_entry(mut self, path: impl Into<PathBuf>) -> Self {
        self.pipeline_entry = path.into();
        self
    }

    /// Sets the generator agent script.
    pub fn with_generator_script(mut self, path: impl Into<PathBuf>) -> Self {
        self.generator_script = path.into();
        self
    }

    /// Sets the verifier agent script.
    pub fn with_verifier_script(mut self, path: impl Into<PathBuf>) -> Self {
        self.verifier_script = path.into();
        self
    }

    /// Sets the slides execution server script.
    pub fn with_slides_server_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.slides_server_path = path.into();
        self
    }

    /// Sets the image processing server script.
    pub fn with_image_server_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.image_server_path = path.into();
        self
    }
}

/// Rejects run ids that would escape the output root.
pub(crate) fn validate_run_id(run_id: &str) -> Result<(), ConfigError> {
    if run_id.is_empty() {
        return Err(ConfigError::ValidationFailed(
            "run_id cannot be empty".to_string(),
        ));
    }
    if run_id.contains('/') || run_id.contains('\\') || run_id == "." || run_id == ".." {
        return Err(ConfigError::ValidationFailed(format!(
            "run_id must be a single path component, got '{}'",
            run_id
        )));
    }
    Ok(())
}

/// Parse an environment variable value into a type.
pub(crate) fn parse_env_value<T: std::str::FromStr>(
    value: &str,
    key: &str,
) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("could not parse '{}'", value),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Category;

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.max_rounds, 10);
        assert_eq!(config.task_timeout(), Duration::from_secs(3600));
        assert_eq!(config.vision_model, "gpt-4o");
        assert!(config.max_workers >= 1 && config.max_workers <= 8);
        assert!(!config.sequential);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = PipelineConfig::new()
            .with_dataset_path("/data")
            .with_output_root("/out")
            .with_run_id("20250815_150016")
            .with_selection(CategoryFilter::One(Category::Food), Some("3".to_string()))
            .with_max_workers(2)
            .with_max_rounds(5)
            .with_task_timeout(Duration::from_secs(60))
            .with_api_key("sk-test");

        assert_eq!(config.run_dir(), PathBuf::from("/out/20250815_150016"));
        assert_eq!(config.max_workers, 2);
        assert_eq!(config.max_rounds, 5);
        assert_eq!(config.task_timeout_secs, 60);
        assert_eq!(config.execution_mode(), "parallel_2_workers");
        assert_eq!(config.with_sequential(true).execution_mode(), "sequential");
    }

    #[test]
    fn test_validation_rejects_zero_workers() {
        let config = PipelineConfig::new().with_max_workers(0);
        assert!(matches!(config.validate(), Err(ConfigError::ValidationFailed(_))));
    }

    #[test]
    fn test_validation_rejects_item_without_category() {
        let config = PipelineConfig::new().with_selection(CategoryFilter::All, Some("1".into()));
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("task_id"));
    }

    #[test]
    fn test_validation_rejects_nested_run_id() {
        assert!(PipelineConfig::new().with_run_id("../escape").validate().is_err());
        assert!(PipelineConfig::new().with_run_id("").validate().is_err());
    }

    #[test]
    fn test_api_key_is_not_serialized() {
        let config = PipelineConfig::new().with_api_key("sk-very-secret");
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("sk-very-secret"));
        assert!(!json.contains("api_key"));
    }

    #[test]
    fn test_parse_env_value() {
        assert_eq!(parse_env_value::<u32>(" 12 ", "K").unwrap(), 12);
        let err = parse_env_value::<u32>("many", "SLIDE_BENCH_MAX_ROUNDS").unwrap_err();
        assert!(err.to_string().contains("SLIDE_BENCH_MAX_ROUNDS"));
    }
}
