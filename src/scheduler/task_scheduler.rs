//! Dispatches generation tasks to the pipeline and collects their outcomes.

use std::sync::Arc;
use std::time::Instant;

use tracing::{error, info, warn};

use crate::dataset::TaskUnit;
use crate::pipeline::{build_pipeline_command, PipelineConfig};
use crate::runner::{Deadline, ProcessRunner};

use super::job::{ExecutionSummary, TaskOutcome, TaskStatus};
use super::worker_pool::{WorkerPool, WorkerPoolConfig};

/// Runs the generation pipeline once per task.
///
/// Every task gets its own output directory and its own process. The
/// scheduler never stops early: each task ends in exactly one
/// [`TaskOutcome`], whatever happens to the others.
#[derive(Clone)]
pub struct TaskScheduler {
    config: Arc<PipelineConfig>,
    runner: Arc<dyn ProcessRunner>,
}

impl TaskScheduler {
    /// Creates a scheduler for the given run settings.
    pub fn new(config: PipelineConfig, runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            config: Arc::new(config),
            runner,
        }
    }

    fn pool(&self) -> WorkerPool {
        if self.config.sequential {
            WorkerPool::new(WorkerPoolConfig::sequential())
        } else {
            WorkerPool::new(WorkerPoolConfig::new(self.config.max_workers))
        }
    }

    /// Runs every task and returns the run summary.
    ///
    /// Outcomes are folded as they complete, so the summary's failure list
    /// is in completion order.
    pub async fn run(&self, tasks: Vec<TaskUnit>) -> ExecutionSummary {
        let mut summary = ExecutionSummary::new(tasks.len(), self.config.execution_mode());
        let start = Instant::now();

        info!(
            tasks = tasks.len(),
            mode = %summary.execution_mode,
            timeout_secs = self.config.task_timeout_secs,
            "Starting task execution"
        );

        let units = tasks.into_iter().map(|t| (t.task_id(), t)).collect();
        let scheduler = self.clone();
        let mut completions = self
            .pool()
            .spawn(units, move |task| {
                let scheduler = scheduler.clone();
                async move { scheduler.dispatch(task).await }
            });

        while let Some(completion) = completions.recv().await {
            let outcome = completion.result.unwrap_or_else(|e| {
                TaskOutcome::failure(
                    completion.unit_id.clone(),
                    TaskStatus::Exception,
                    e.to_string(),
                    start.elapsed(),
                )
            });
            log_outcome(&outcome, &summary);
            summary.record(&outcome);
        }

        summary.execution_time_seconds = start.elapsed().as_secs_f64();
        info!(
            successful = summary.successful_tasks,
            failed = summary.failed_tasks,
            elapsed_secs = format!("{:.1}", summary.execution_time_seconds),
            "Task execution finished"
        );
        summary
    }

    /// Runs the pipeline for one task and classifies the result.
    pub async fn dispatch(&self, task: TaskUnit) -> TaskOutcome {
        let task_id = task.task_id();
        let start = Instant::now();
        let output_dir = self.config.task_output_dir(&task);

        if let Err(e) = tokio::fs::create_dir_all(&output_dir).await {
            return TaskOutcome::failure(
                task_id,
                TaskStatus::Exception,
                format!("Failed to create {}: {}", output_dir.display(), e),
                start.elapsed(),
            );
        }

        let spec = build_pipeline_command(&self.config, &task, &output_dir);
        info!(task = %task_id, command = %spec.display(), "Dispatching task");

        let deadline = Deadline::after(self.config.task_timeout());
        let result = self.runner.run(&spec, &deadline).await;
        TaskOutcome::classify(task_id, result, start.elapsed())
    }
}

fn log_outcome(outcome: &TaskOutcome, summary: &ExecutionSummary) {
    let done = summary.processed() + 1;
    match outcome.status {
        TaskStatus::Success => info!(
            task = %outcome.task_id,
            progress = format!("{}/{}", done, summary.total_tasks),
            duration_secs = format!("{:.1}", outcome.duration_secs),
            "Task completed"
        ),
        TaskStatus::Timeout => warn!(
            task = %outcome.task_id,
            progress = format!("{}/{}", done, summary.total_tasks),
            "Task timed out"
        ),
        TaskStatus::NonZeroExit | TaskStatus::Exception => error!(
            task = %outcome.task_id,
            status = %outcome.status,
            progress = format!("{}/{}", done, summary.total_tasks),
            error = %outcome.detail,
            "Task failed"
        ),
    }
}
