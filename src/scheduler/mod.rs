//! Bounded parallel execution of benchmark tasks.
//!
//! - **WorkerPool**: Runs a job over independent units with at most N in flight
//! - **TaskScheduler**: Launches the generation pipeline per task under a deadline
//! - **TaskOutcome**: How each task ended, folded into an `ExecutionSummary`
//!
//! # Architecture
//!
//! ```text
//!                      ┌──────────────┐
//!                      │  TaskLoader  │
//!                      └──────┬───────┘
//!                             │ Vec<TaskUnit>
//!                      ┌──────▼───────┐
//!                      │  Semaphore   │
//!                      │  (N permits) │
//!                      └──────┬───────┘
//!         ┌───────────────────┼───────────────────┐
//!         ▼                   ▼                   ▼
//!    ┌─────────┐         ┌─────────┐         ┌─────────┐
//!    │ Task 1  │         │ Task 2  │         │ Task N  │
//!    └────┬────┘         └────┬────┘         └────┬────┘
//!         └───────────────────┼───────────────────┘
//!                      ┌──────▼───────┐
//!                      │   Collector  │  (single owner of the summary)
//!                      └──────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use slide_bench::runner::TokioProcessRunner;
//! use slide_bench::scheduler::TaskScheduler;
//!
//! let scheduler = TaskScheduler::new(config, Arc::new(TokioProcessRunner::new()));
//! let summary = scheduler.run(tasks).await;
//! println!("{}/{} succeeded", summary.successful_tasks, summary.total_tasks);
//! ```

pub mod job;
pub mod task_scheduler;
pub mod worker_pool;

pub use job::{ExecutionSummary, FailedTask, TaskOutcome, TaskStatus};
pub use task_scheduler::TaskScheduler;
pub use worker_pool::{Completion, PoolError, WorkerPool, WorkerPoolConfig};
