//! Persistence and printing of run artifacts.
//!
//! Every document is pretty-printed JSON inside the run directory:
//!
//! | File                      | Content                         |
//! |---------------------------|---------------------------------|
//! | `args.json`               | Run configuration (no secrets)  |
//! | `tasks.json`              | Discovered task units           |
//! | `execution_results.json`  | Dispatch summary                |
//! | `scores.json`             | Benchmark summary from `gather` |

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::info;

use crate::dataset::TaskUnit;
use crate::error::ReporterError;
use crate::evaluation::BenchmarkSummary;
use crate::scheduler::ExecutionSummary;

pub const CONFIG_FILE: &str = "args.json";
pub const TASKS_FILE: &str = "tasks.json";
pub const EXECUTION_FILE: &str = "execution_results.json";
pub const SCORES_FILE: &str = "scores.json";

/// Writes run artifacts into one run directory.
#[derive(Debug, Clone)]
pub struct ResultReporter {
    run_dir: PathBuf,
}

impl ResultReporter {
    /// Creates a reporter for the given run directory.
    pub fn new(run_dir: impl Into<PathBuf>) -> Self {
        Self {
            run_dir: run_dir.into(),
        }
    }

    /// Returns the run directory.
    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    /// Writes the run configuration.
    ///
    /// Configuration types keep secrets out of their serialized form.
    pub async fn write_config<C: Serialize>(&self, config: &C) -> Result<PathBuf, ReporterError> {
        self.write_json(CONFIG_FILE, config).await
    }

    /// Writes the discovered task list.
    pub async fn write_tasks(&self, tasks: &[TaskUnit]) -> Result<PathBuf, ReporterError> {
        self.write_json(TASKS_FILE, &tasks).await
    }

    /// Writes the dispatch summary.
    pub async fn write_execution_summary(
        &self,
        summary: &ExecutionSummary,
    ) -> Result<PathBuf, ReporterError> {
        self.write_json(EXECUTION_FILE, summary).await
    }

    /// Writes the benchmark summary.
    pub async fn write_scores(&self, summary: &BenchmarkSummary) -> Result<PathBuf, ReporterError> {
        self.write_json(SCORES_FILE, summary).await
    }

    async fn write_json<T: Serialize + ?Sized>(
        &self,
        name: &str,
        value: &T,
    ) -> Result<PathBuf, ReporterError> {
        let path = self.run_dir.join(name);
        let json = serde_json::to_string_pretty(value)?;

        let write_err = |source| ReporterError::Write {
            path: path.clone(),
            source,
        };
        fs::create_dir_all(&self.run_dir).await.map_err(write_err)?;
        let mut file = fs::File::create(&path).await.map_err(write_err)?;
        file.write_all(json.as_bytes()).await.map_err(write_err)?;
        file.sync_all().await.map_err(write_err)?;

        info!(path = %path.display(), "Wrote {}", name);
        Ok(path)
    }
}

/// Human-readable dispatch summary, including every failed task.
pub fn render_execution_summary(summary: &ExecutionSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "\n=== Execution Summary ===");
    let _ = writeln!(out, "Mode:           {}", summary.execution_mode);
    let _ = writeln!(out, "Total tasks:    {}", summary.total_tasks);
    let _ = writeln!(out, "Successful:     {}", summary.successful_tasks);
    let _ = writeln!(out, "Failed:         {}", summary.failed_tasks);
    let _ = writeln!(out, "Success rate:   {:.1}%", summary.success_rate() * 100.0);
    let _ = writeln!(out, "Elapsed:        {:.1}s", summary.execution_time_seconds);

    if !summary.failed_task_details.is_empty() {
        let _ = writeln!(out, "\nFailed tasks:");
        for failed in &summary.failed_task_details {
            let _ = writeln!(out, "  {} [{}]", failed.task_name, failed.status);
            if !failed.error.is_empty() {
                let _ = writeln!(out, "    error: {}", failed.error);
            }
        }
    }
    out
}

/// Human-readable benchmark summary.
pub fn render_benchmark_summary(run_id: &str, summary: &BenchmarkSummary) -> String {
    let rb = &summary.ref_based;
    let rf = &summary.ref_free;

    let mut out = String::new();
    let _ = writeln!(out, "\n=== Benchmark Results ===");
    let _ = writeln!(out, "Run ID:         {}", run_id);
    let _ = writeln!(out, "Success rate:   {:.4}", summary.success_rate);
    let _ = writeln!(out, "Total items:    {}", summary.total_items);
    let _ = writeln!(out, "Failed items:   {}", summary.failed_items);
    let _ = writeln!(
        out,
        "Ref-based:      match={:.4} text={:.4} color={:.4} position={:.4}",
        rb.match_score, rb.text, rb.color, rb.position
    );
    let _ = writeln!(
        out,
        "Ref-free:       text={:.4} image={:.4} layout={:.4} color={:.4}",
        rf.text, rf.image, rf.layout, rf.color
    );
    let _ = writeln!(out, "Overall score:  {:.4}", summary.overall_score);

    let failed: Vec<&str> = summary
        .items
        .iter()
        .filter(|i| i.best_round.is_none())
        .map(|i| i.task_id.as_str())
        .collect();
    if !failed.is_empty() {
        let _ = writeln!(out, "\nItems without a complete round:");
        for id in failed {
            let _ = writeln!(out, "  {}", id);
        }
    }
    out
}
