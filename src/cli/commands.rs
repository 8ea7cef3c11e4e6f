//! CLI command definitions for slide-bench.
//!
//! Three phases, each its own subcommand:
//!
//! - `run`: discover tasks and launch the generation pipeline for each
//! - `evaluate`: re-score every generated round with the external scorers
//! - `gather`: pick each item's best round and compute the benchmark scores

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use crate::dataset::{list_item_dirs, CategoryFilter, ItemDir, TaskLoader};
use crate::evaluation::{
    BenchmarkSummary, EvaluationConfig, EvaluationDispatcher, RoundAggregator, TieBreak,
};
use crate::pipeline::PipelineConfig;
use crate::report::{render_benchmark_summary, render_execution_summary, ResultReporter};
use crate::runner::TokioProcessRunner;
use crate::scheduler::{TaskScheduler, WorkerPool};

/// Slide generation benchmark runner.
#[derive(Parser)]
#[command(name = "slide-bench")]
#[command(about = "Run, score and aggregate the slide generation benchmark")]
#[command(version)]
#[command(
    long_about = "slide-bench dispatches the slide generation pipeline over a dataset of target slides, re-scores every generated round and aggregates each item's best round into benchmark scores.\n\nExample usage:\n  slide-bench run --task food --max-workers 4\n  slide-bench evaluate 20250815_150016\n  slide-bench gather 20250815_150016"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Run the generation pipeline over the selected tasks.
    #[command(alias = "generate")]
    Run(RunArgs),

    /// Re-score every generated round of a run.
    ///
    /// Existing reports are replaced, so running this twice recomputes
    /// every score.
    #[command(alias = "eval")]
    Evaluate(EvaluateArgs),

    /// Aggregate the best round of every item into benchmark scores.
    Gather(GatherArgs),
}

/// Arguments for `slide-bench run`.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Category to run, or `all`.
    #[arg(short = 't', long, default_value = "all")]
    pub task: CategoryFilter,

    /// Run a single item (the `<n>` of `slide_<n>`). Requires a category.
    #[arg(long)]
    pub task_id: Option<String>,

    /// Dataset root.
    #[arg(long)]
    pub dataset_path: Option<PathBuf>,

    /// Output root; the run writes into `<output_root>/<run_id>`.
    #[arg(short = 'o', long)]
    pub output_root: Option<PathBuf>,

    /// Run identifier (default: current time, `%Y%m%d_%H%M%S`).
    #[arg(long)]
    pub run_id: Option<String>,

    /// Vision model passed to the pipeline.
    #[arg(short = 'm', long)]
    pub vision_model: Option<String>,

    /// Model API key.
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Generation rounds per item.
    #[arg(long)]
    pub max_rounds: Option<u32>,

    /// Pipeline processes allowed to run at once.
    #[arg(short = 'w', long)]
    pub max_workers: Option<usize>,

    /// Run tasks one after another.
    #[arg(long)]
    pub sequential: bool,

    /// Ceiling per pipeline process, in seconds.
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Interpreter used to launch the pipeline.
    #[arg(long)]
    pub python: Option<String>,

    /// Pipeline entry script.
    #[arg(long)]
    pub pipeline_entry: Option<PathBuf>,

    /// Generator agent script.
    #[arg(long)]
    pub generator_script: Option<PathBuf>,

    /// Verifier agent script.
    #[arg(long)]
    pub verifier_script: Option<PathBuf>,

    /// Slides execution server script.
    #[arg(long)]
    pub slides_server_path: Option<PathBuf>,

    /// Image processing server script.
    #[arg(long)]
    pub image_server_path: Option<PathBuf>,

    /// Print the execution summary as JSON.
    #[arg(short = 'j', long)]
    pub json: bool,
}

impl RunArgs {
    /// Layers these arguments over `base`.
    pub fn apply(&self, base: PipelineConfig) -> PipelineConfig {
        let mut config = base.with_selection(self.task, self.task_id.clone());
        if let Some(ref path) = self.dataset_path {
            config = config.with_dataset_path(path);
        }
        if let Some(ref path) = self.output_root {
            config = config.with_output_root(path);
        }
        if let Some(ref run_id) = self.run_id {
            config = config.with_run_id(run_id);
        }
        if let Some(ref model) = self.vision_model {
            config = config.with_vision_model(model);
        }
        if let Some(ref key) = self.api_key {
            config = config.with_api_key(key);
        }
        if let Some(rounds) = self.max_rounds {
            config = config.with_max_rounds(rounds);
        }
        if let Some(workers) = self.max_workers {
            config = config.with_max_workers(workers);
        }
        if let Some(secs) = self.timeout {
            config = config.with_task_timeout(Duration::from_secs(secs));
        }
        if let Some(ref python) = self.python {
            config = config.with_python(python);
        }
        if let Some(ref path) = self.pipeline_entry {
            config = config.with_pipeline_entry(path);
        }
        if let Some(ref path) = self.generator_script {
            config = config.with_generator_script(path);
        }
        if let Some(ref path) = self.verifier_script {
            config = config.with_verifier_script(path);
        }
        if let Some(ref path) = self.slides_server_path {
            config = config.with_slides_server_path(path);
        }
        if let Some(ref path) = self.image_server_path {
            config = config.with_image_server_path(path);
        }
        if self.sequential {
            config = config.with_sequential(true);
        }
        config
    }
}

/// Run selection shared by `evaluate` and `gather`.
#[derive(clap::Args, Debug)]
pub struct RunTargetArgs {
    /// Run identifier (e.g. 20250815_150016).
    pub run_id: String,

    /// Category to process, or `all`.
    #[arg(short = 't', long, default_value = "all")]
    pub task: CategoryFilter,

    /// Dataset root holding the ground-truth decks.
    #[arg(long)]
    pub dataset_path: Option<PathBuf>,

    /// Output root holding the run directory.
    #[arg(short = 'o', long)]
    pub output_root: Option<PathBuf>,

    /// Items processed at once.
    #[arg(short = 'w', long)]
    pub max_workers: Option<usize>,

    /// Print the summary as JSON.
    #[arg(short = 'j', long)]
    pub json: bool,
}

impl RunTargetArgs {
    fn apply(&self, base: EvaluationConfig) -> EvaluationConfig {
        let mut config = base.with_task(self.task);
        if let Some(ref path) = self.dataset_path {
            config = config.with_dataset_path(path);
        }
        if let Some(ref path) = self.output_root {
            config = config.with_output_root(path);
        }
        if let Some(workers) = self.max_workers {
            config = config.with_max_workers(workers);
        }
        config
    }
}

/// Arguments for `slide-bench evaluate`.
#[derive(Parser, Debug)]
pub struct EvaluateArgs {
    #[command(flatten)]
    pub target: RunTargetArgs,

    /// Interpreter used to launch the scorers.
    #[arg(long)]
    pub python: Option<String>,

    /// Ceiling per scorer process, in seconds.
    #[arg(long)]
    pub scorer_timeout: Option<u64>,

    /// Reference-based scorer script.
    #[arg(long)]
    pub ref_based_script: Option<PathBuf>,

    /// Reference-free scorer script.
    #[arg(long)]
    pub ref_free_script: Option<PathBuf>,
}

impl EvaluateArgs {
    /// Layers these arguments over `base`.
    pub fn apply(&self, base: EvaluationConfig) -> EvaluationConfig {
        let mut config = self.target.apply(base);
        if let Some(ref python) = self.python {
            config = config.with_python(python);
        }
        if let Some(secs) = self.scorer_timeout {
            config = config.with_scorer_timeout(Duration::from_secs(secs));
        }
        if let Some(ref path) = self.ref_based_script {
            config = config.with_ref_based_script(path);
        }
        if let Some(ref path) = self.ref_free_script {
            config = config.with_ref_free_script(path);
        }
        config
    }
}

/// Arguments for `slide-bench gather`.
#[derive(Parser, Debug)]
pub struct GatherArgs {
    #[command(flatten)]
    pub target: RunTargetArgs,

    /// Highest round number considered.
    #[arg(long)]
    pub max_rounds: Option<u32>,

    /// Winner among equal scores: `earliest` or `latest`.
    #[arg(long, default_value = "earliest")]
    pub tie_break: TieBreak,

    /// Take the item list from the run directory instead of the dataset.
    ///
    /// Useful for runs limited to a single item; by default every dataset
    /// item counts, and items the run never produced count as failures.
    #[arg(long)]
    pub from_output: bool,
}

impl GatherArgs {
    /// Layers these arguments over `base`.
    pub fn apply(&self, base: EvaluationConfig) -> EvaluationConfig {
        let mut config = self.target.apply(base).with_tie_break(self.tie_break);
        if let Some(rounds) = self.max_rounds {
            config = config.with_max_rounds(rounds);
        }
        config
    }
}

/// Parse CLI arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
///
/// For more control over logging initialization, use `parse_cli()` and
/// `run_with_cli()`.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Run(args) => run_run_command(args).await,
        Commands::Evaluate(args) => run_evaluate_command(args).await,
        Commands::Gather(args) => run_gather_command(args).await,
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

async fn run_run_command(args: RunArgs) -> anyhow::Result<()> {
    let config = args.apply(PipelineConfig::from_env()?);
    config.validate()?;

    let loader = TaskLoader::new(&config.dataset_path);
    let tasks = loader
        .load(config.task, config.task_id.as_deref())
        .context("Task discovery failed")?;
    if tasks.is_empty() {
        anyhow::bail!(
            "No tasks found under {} for '{}'",
            config.dataset_path.display(),
            config.task
        );
    }
    info!(tasks = tasks.len(), run_id = %config.run_id, "Discovered tasks");

    let reporter = ResultReporter::new(config.run_dir());
    reporter.write_config(&config).await?;
    reporter.write_tasks(&tasks).await?;

    let scheduler = TaskScheduler::new(config, Arc::new(TokioProcessRunner::new()));
    let summary = scheduler.run(tasks).await;
    reporter.write_execution_summary(&summary).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print!("{}", render_execution_summary(&summary));
        println!("Results saved to: {}", reporter.run_dir().display());
    }

    Ok(())
}

async fn run_evaluate_command(args: EvaluateArgs) -> anyhow::Result<()> {
    let config = args.apply(EvaluationConfig::from_env(&args.target.run_id)?);
    config.validate()?;

    let dispatcher = EvaluationDispatcher::new(config, Arc::new(TokioProcessRunner::new()));
    let summary = dispatcher.evaluate().await.context("Evaluation failed")?;

    if args.target.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("\n=== Evaluation Summary ===");
        println!("Items:            {}", summary.items);
        println!("Rounds scored:    {}", summary.rounds_scored);
        println!("Scorer failures:  {}", summary.scorer_failures);
    }

    Ok(())
}

async fn run_gather_command(args: GatherArgs) -> anyhow::Result<()> {
    let config = args.apply(EvaluationConfig::from_env(&args.target.run_id)?);
    config.validate()?;

    let summary = gather_run(&config, args.from_output).await?;
    let reporter = ResultReporter::new(config.run_dir());
    reporter.write_scores(&summary).await?;

    if args.target.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print!("{}", render_benchmark_summary(&config.run_id, &summary));
    }

    Ok(())
}

/// Aggregates a run's best rounds into benchmark scores.
pub async fn gather_run(
    config: &EvaluationConfig,
    from_output: bool,
) -> anyhow::Result<BenchmarkSummary> {
    let run_dir = config.run_dir();
    if !run_dir.is_dir() {
        anyhow::bail!("Run directory does not exist: {}", run_dir.display());
    }

    let items = item_universe(config, from_output)?;
    if items.is_empty() {
        warn!(run_id = %config.run_id, "No items to gather");
    }

    let aggregator = RoundAggregator::new(config.max_rounds, config.tie_break);
    let pool = WorkerPool::new(config.pool_config());
    let result = aggregator.gather(items, &pool).await;
    Ok(result.finalize())
}

/// Items counted by `gather`, with paths pointing into the run directory.
fn item_universe(config: &EvaluationConfig, from_output: bool) -> anyhow::Result<Vec<ItemDir>> {
    let mut items = Vec::new();

    if from_output {
        for category in config.task.categories() {
            items.extend(list_item_dirs(&config.category_dir(category), category)?);
        }
        return Ok(items);
    }

    let loader = TaskLoader::new(&config.dataset_path);
    if !loader.root().is_dir() {
        anyhow::bail!(
            "Dataset root does not exist: {}",
            loader.root().display()
        );
    }
    for category in config.task.categories() {
        for item in loader.discover_items(category)? {
            let path = config.category_dir(category).join(&item.name);
            items.push(ItemDir { path, ..item });
        }
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Category;
    use clap::CommandFactory;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_cli_parses() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_command_defaults() {
        let cli = Cli::try_parse_from(["slide-bench", "run"]).expect("should parse");
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.task, CategoryFilter::All);
                assert!(args.task_id.is_none());
                assert!(!args.sequential);
                assert!(!args.json);
                assert_eq!(cli.log_level, "info");
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_run_command_with_options() {
        let cli = Cli::try_parse_from([
            "slide-bench",
            "generate",
            "--task",
            "social_media",
            "--task-id",
            "3",
            "-w",
            "2",
            "--max-rounds",
            "4",
            "--timeout",
            "90",
            "--sequential",
            "--run-id",
            "r1",
            "--pipeline-entry",
            "/srv/agent/main.py",
            "--generator-script",
            "/srv/agent/gen.py",
            "--verifier-script",
            "/srv/agent/ver.py",
            "--slides-server-path",
            "/srv/agent/slides.py",
            "--image-server-path",
            "/srv/agent/image.py",
        ])
        .expect("should parse");

        let Commands::Run(args) = cli.command else {
            panic!("Expected Run command");
        };
        let config = args.apply(PipelineConfig::new());
        assert_eq!(config.task, CategoryFilter::One(Category::SocialMedia));
        assert_eq!(config.task_id.as_deref(), Some("3"));
        assert_eq!(config.max_workers, 2);
        assert_eq!(config.max_rounds, 4);
        assert_eq!(config.task_timeout_secs, 90);
        assert_eq!(config.run_id, "r1");
        assert_eq!(config.execution_mode(), "sequential");
        assert_eq!(config.pipeline_entry, PathBuf::from("/srv/agent/main.py"));
        assert_eq!(config.generator_script, PathBuf::from("/srv/agent/gen.py"));
        assert_eq!(config.verifier_script, PathBuf::from("/srv/agent/ver.py"));
        assert_eq!(config.slides_server_path, PathBuf::from("/srv/agent/slides.py"));
        assert_eq!(config.image_server_path, PathBuf::from("/srv/agent/image.py"));
    }

    #[test]
    fn test_unknown_category_is_rejected() {
        assert!(Cli::try_parse_from(["slide-bench", "run", "--task", "sports"]).is_err());
    }

    #[test]
    fn test_gather_command() {
        let cli = Cli::try_parse_from([
            "slide-bench",
            "gather",
            "20250815_150016",
            "--task",
            "food",
            "--tie-break",
            "latest",
            "--max-rounds",
            "5",
        ])
        .expect("should parse");

        let Commands::Gather(args) = cli.command else {
            panic!("Expected Gather command");
        };
        let config = args.apply(EvaluationConfig::new(&args.target.run_id));
        assert_eq!(config.run_id, "20250815_150016");
        assert_eq!(config.task, CategoryFilter::One(Category::Food));
        assert_eq!(config.tie_break, TieBreak::LatestRound);
        assert_eq!(config.max_rounds, 5);
    }

    #[test]
    fn test_evaluate_command() {
        let cli = Cli::try_parse_from([
            "slide-bench",
            "eval",
            "r2",
            "--scorer-timeout",
            "30",
            "-w",
            "3",
            "--ref-based-script",
            "/opt/eval/page_eval.py",
            "--ref-free-script",
            "/opt/eval/free.py",
        ])
        .expect("should parse");

        let Commands::Evaluate(args) = cli.command else {
            panic!("Expected Evaluate command");
        };
        let config = args.apply(EvaluationConfig::new(&args.target.run_id));
        assert_eq!(config.scorer_timeout_secs, 30);
        assert_eq!(config.ref_based_script, PathBuf::from("/opt/eval/page_eval.py"));
        assert_eq!(config.ref_free_script, PathBuf::from("/opt/eval/free.py"));
        assert_eq!(config.max_workers, 3);
        assert_eq!(config.task, CategoryFilter::All);
    }

    #[tokio::test]
    async fn test_run_without_tasks_fails_before_dispatch() {
        let dir = TempDir::new().unwrap();
        let dataset = dir.path().join("data");
        fs::create_dir_all(dataset.join("food")).unwrap();
        let output = dir.path().join("out");

        let args: Vec<std::ffi::OsString> = vec![
            "slide-bench".into(),
            "run".into(),
            "--dataset-path".into(),
            dataset.into_os_string(),
            "--output-root".into(),
            output.clone().into_os_string(),
            "--run-id".into(),
            "empty".into(),
        ];
        let cli = Cli::try_parse_from(args).expect("should parse");

        let err = run_with_cli(cli).await.unwrap_err();
        assert!(err.to_string().contains("No tasks found"));
        assert!(!output.join("empty").exists());
    }

    #[tokio::test]
    async fn test_gather_uses_dataset_items() {
        let dir = TempDir::new().unwrap();
        let dataset = dir.path().join("data");
        for i in 1..=2 {
            fs::create_dir_all(dataset.join("food").join(format!("slide_{}", i))).unwrap();
        }
        let config = EvaluationConfig::new("r")
            .with_dataset_path(&dataset)
            .with_output_root(dir.path().join("out"))
            .with_task(CategoryFilter::One(Category::Food));
        fs::create_dir_all(config.category_dir(Category::Food).join("slide_1")).unwrap();

        let summary = gather_run(&config, false).await.unwrap();
        assert_eq!(summary.total_items, 2);
        assert_eq!(summary.failed_items, 2);

        let summary = gather_run(&config, true).await.unwrap();
        assert_eq!(summary.total_items, 1);
    }
}
