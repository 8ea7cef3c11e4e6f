//! Outcome types for dispatched tasks.
//!
//! - `TaskStatus`: How a dispatched process ended
//! - `TaskOutcome`: Status plus identifying and diagnostic detail
//! - `ExecutionSummary`: Counts and failures for a whole run

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::runner::{ProcessError, ProcessOutput};

/// Final status of a dispatched task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Process exited with code 0 within the ceiling.
    Success,
    /// Process exited with a non-zero code or was killed by a signal.
    NonZeroExit,
    /// Process was still running at the ceiling and was terminated.
    Timeout,
    /// Launching or waiting failed on the host side.
    Exception,
}

impl TaskStatus {
    /// Returns true for [`TaskStatus::Success`].
    pub fn is_success(&self) -> bool {
        matches!(self, TaskStatus::Success)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Success => write!(f, "success"),
            TaskStatus::NonZeroExit => write!(f, "non_zero_exit"),
            TaskStatus::Timeout => write!(f, "timeout"),
            TaskStatus::Exception => write!(f, "exception"),
        }
    }
}

/// Result of dispatching one task. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskOutcome {
    pub task_id: String,
    pub status: TaskStatus,
    /// Error detail; empty on success.
    pub detail: String,
    pub duration_secs: f64,
}

impl TaskOutcome {
    /// Creates a successful outcome.
    pub fn success(task_id: impl Into<String>, duration: Duration) -> Self {
        Self {
            task_id: task_id.into(),
            status: TaskStatus::Success,
            detail: String::new(),
            duration_secs: duration.as_secs_f64(),
        }
    }

    /// Creates a failed outcome with the given status.
    pub fn failure(
        task_id: impl Into<String>,
        status: TaskStatus,
        detail: impl Into<String>,
        duration: Duration,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            status,
            detail: detail.into(),
            duration_secs: duration.as_secs_f64(),
        }
    }

    /// Classifies the result of running a task's process.
    ///
    /// This is the only place a process result becomes a status, so
    /// sequential and parallel runs classify identically.
    pub fn classify(
        task_id: impl Into<String>,
        result: Result<ProcessOutput, ProcessError>,
        elapsed: Duration,
    ) -> Self {
        match result {
            Ok(output) if output.is_success() => Self::success(task_id, elapsed),
            Ok(output) => Self::failure(
                task_id,
                TaskStatus::NonZeroExit,
                output.failure_detail(),
                elapsed,
            ),
            Err(ProcessError::DeadlineExceeded(ceiling)) => Self::failure(
                task_id,
                TaskStatus::Timeout,
                format!("Timeout after {}s", ceiling.as_secs()),
                elapsed,
            ),
            Err(e) => Self::failure(task_id, TaskStatus::Exception, e.to_string(), elapsed),
        }
    }

    /// Returns true if the task succeeded.
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// A non-successful task as recorded in the run summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedTask {
    pub task_name: String,
    pub status: TaskStatus,
    pub error: String,
}

/// Summary of one run's dispatch phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub started_at: DateTime<Utc>,
    pub total_tasks: usize,
    pub successful_tasks: usize,
    pub failed_tasks: usize,
    pub execution_time_seconds: f64,
    pub failed_task_details: Vec<FailedTask>,
    pub execution_mode: String,
}

impl ExecutionSummary {
    /// Creates an empty summary for a run of `total_tasks` tasks.
    pub fn new(total_tasks: usize, execution_mode: impl Into<String>) -> Self {
        Self {
            started_at: Utc::now(),
            total_tasks,
            successful_tasks: 0,
            failed_tasks: 0,
            execution_time_seconds: 0.0,
            failed_task_details: Vec::new(),
            execution_mode: execution_mode.into(),
        }
    }

    /// Folds one outcome into the counts.
    pub fn record(&mut self, outcome: &TaskOutcome) {
        if outcome.is_success() {
            self.successful_tasks += 1;
        } else {
            self.failed_tasks += 1;
            self.failed_task_details.push(FailedTask {
                task_name: outcome.task_id.clone(),
                status: outcome.status,
                error: outcome.detail.clone(),
            });
        }
    }

    /// Number of outcomes recorded so far.
    pub fn processed(&self) -> usize {
        self.successful_tasks + self.failed_tasks
    }

    /// Success rate in [0, 1]; 0 for an empty run.
    pub fn success_rate(&self) -> f64 {
        let total = self.processed();
        if total == 0 {
            return 0.0;
        }
        self.successful_tasks as f64 / total as f64
    }

    /// Number of failures with the given status.
    pub fn count_with_status(&self, status: TaskStatus) -> usize {
        self.failed_task_details
            .iter()
            .filter(|f| f.status == status)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_success() {
        let outcome = TaskOutcome::classify(
            "food/slide_1",
            Ok(ProcessOutput::success(Duration::from_secs(3))),
            Duration::from_secs(3),
        );
        assert_eq!(outcome.status, TaskStatus::Success);
        assert!(outcome.detail.is_empty());
    }

    #[test]
    fn test_classify_non_zero_exit_keeps_stderr() {
        let output = ProcessOutput::new(Some(1), "ModuleNotFoundError: pptx", Duration::ZERO);
        let outcome = TaskOutcome::classify("food/slide_1", Ok(output), Duration::ZERO);
        assert_eq!(outcome.status, TaskStatus::NonZeroExit);
        assert!(outcome.detail.contains("exit code 1"));
        assert!(outcome.detail.contains("ModuleNotFoundError"));
    }

    #[test]
    fn test_classify_timeout_and_exception() {
        let outcome = TaskOutcome::classify(
            "a/slide_1",
            Err(ProcessError::DeadlineExceeded(Duration::from_secs(3600))),
            Duration::from_secs(3600),
        );
        assert_eq!(outcome.status, TaskStatus::Timeout);
        assert_eq!(outcome.detail, "Timeout after 3600s");

        let outcome = TaskOutcome::classify(
            "a/slide_1",
            Err(ProcessError::Spawn {
                program: "python".to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
            }),
            Duration::ZERO,
        );
        assert_eq!(outcome.status, TaskStatus::Exception);
        assert!(outcome.detail.contains("python"));
    }

    #[test]
    fn test_summary_record() {
        let mut summary = ExecutionSummary::new(3, "sequential");
        summary.record(&TaskOutcome::success("a", Duration::ZERO));
        summary.record(&TaskOutcome::failure(
            "b",
            TaskStatus::Timeout,
            "Timeout after 1s",
            Duration::ZERO,
        ));
        summary.record(&TaskOutcome::success("c", Duration::ZERO));

        assert_eq!(summary.successful_tasks, 2);
        assert_eq!(summary.failed_tasks, 1);
        assert_eq!(summary.processed(), summary.total_tasks);
        assert_eq!(summary.failed_task_details[0].task_name, "b");
        assert_eq!(summary.count_with_status(TaskStatus::Timeout), 1);
        assert!((summary.success_rate() - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_task_status_display() {
        assert_eq!(TaskStatus::NonZeroExit.to_string(), "non_zero_exit");
        assert_eq!(TaskStatus::Timeout.to_string(), "timeout");
    }
}
