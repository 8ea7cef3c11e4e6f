//! Bounded worker pool for independent units of work.
//!
//! Every unit runs on its own tokio task; a semaphore caps how many run at
//! once. Results are sent over a channel as they finish, so the caller sees
//! them in completion order and is the only owner of whatever it folds them
//! into.
//!
//! # Features
//!
//! - Configurable number of workers
//! - Sequential mode that runs the same job function one unit at a time
//! - Panicking jobs surface as [`PoolError::Panicked`] instead of vanishing

use std::future::Future;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinError;
use tracing::{debug, error};

use crate::pipeline::default_max_workers;

/// Errors that can end a unit without a result.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PoolError {
    /// The job panicked.
    #[error("Worker task panicked: {0}")]
    Panicked(String),

    /// The job was cancelled before finishing.
    #[error("Worker task was cancelled")]
    Cancelled,
}

impl From<JoinError> for PoolError {
    fn from(err: JoinError) -> Self {
        if err.is_panic() {
            let payload = err.into_panic();
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            PoolError::Panicked(message)
        } else {
            PoolError::Cancelled
        }
    }
}

/// Configuration for the worker pool.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerPoolConfig {
    /// Maximum number of units running at once.
    pub num_workers: usize,
    /// Run units strictly one after another.
    pub sequential: bool,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            num_workers: default_max_workers(),
            sequential: false,
        }
    }
}

impl WorkerPoolConfig {
    /// Creates a parallel configuration with the specified number of workers.
    pub fn new(num_workers: usize) -> Self {
        Self {
            num_workers: num_workers.max(1),
            sequential: false,
        }
    }

    /// Creates a sequential configuration.
    pub fn sequential() -> Self {
        Self {
            num_workers: 1,
            sequential: true,
        }
    }
}

/// A finished unit, tagged with the id it was submitted under.
#[derive(Debug)]
pub struct Completion<T> {
    pub unit_id: String,
    pub result: Result<T, PoolError>,
}

/// Pool that runs jobs over a list of units.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    config: WorkerPoolConfig,
}

impl WorkerPool {
    /// Creates a new worker pool.
    pub fn new(config: WorkerPoolConfig) -> Self {
        Self { config }
    }

    /// Starts `job` on every unit and returns the completion stream.
    ///
    /// Exactly one [`Completion`] is sent per unit. The channel closes after
    /// the last one. Must be called from within a tokio runtime.
    pub fn spawn<U, T, F, Fut>(
        &self,
        units: Vec<(String, U)>,
        job: F,
    ) -> mpsc::UnboundedReceiver<Completion<T>>
    where
        U: Send + 'static,
        T: Send + 'static,
        F: Fn(U) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = T> + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let job = Arc::new(job);

        if self.config.sequential {
            tokio::spawn(async move {
                for (unit_id, unit) in units {
                    debug!(unit = %unit_id, "Running unit");
                    let result = tokio::spawn((*job)(unit)).await.map_err(PoolError::from);
                    log_pool_error(&unit_id, &result);
                    if tx.send(Completion { unit_id, result }).is_err() {
                        break;
                    }
                }
            });
            return rx;
        }

        let permits = Arc::new(Semaphore::new(self.config.num_workers.max(1)));
        for (unit_id, unit) in units {
            let job = Arc::clone(&job);
            let permits = Arc::clone(&permits);
            let tx = tx.clone();

            tokio::spawn(async move {
                let result = match permits.acquire_owned().await {
                    Ok(_permit) => {
                        debug!(unit = %unit_id, "Running unit");
                        tokio::spawn((*job)(unit)).await.map_err(PoolError::from)
                    }
                    Err(_) => Err(PoolError::Cancelled),
                };
                log_pool_error(&unit_id, &result);
                let _ = tx.send(Completion { unit_id, result });
            });
        }

        rx
    }
}

fn log_pool_error<T>(unit_id: &str, result: &Result<T, PoolError>) {
    if let Err(e) = result {
        error!(unit = %unit_id, error = %e, "Worker task ended without a result");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    async fn drain<T>(mut rx: mpsc::UnboundedReceiver<Completion<T>>) -> Vec<Completion<T>> {
        let mut out = Vec::new();
        while let Some(c) = rx.recv().await {
            out.push(c);
        }
        out
    }

    #[test]
    fn test_worker_pool_config() {
        let config = WorkerPoolConfig::default();
        assert!(config.num_workers >= 1 && config.num_workers <= 8);
        assert!(!config.sequential);

        assert_eq!(WorkerPoolConfig::new(0).num_workers, 1);
        assert!(WorkerPoolConfig::sequential().sequential);
    }

    #[tokio::test]
    async fn test_results_arrive_in_completion_order() {
        let pool = WorkerPool::new(WorkerPoolConfig::new(4));
        let units = vec![
            ("slow".to_string(), 200u64),
            ("fast".to_string(), 10u64),
        ];
        let rx = pool.spawn(units, |delay| async move {
            tokio::time::sleep(Duration::from_millis(delay)).await;
            delay
        });

        let ids: Vec<String> = drain(rx).await.into_iter().map(|c| c.unit_id).collect();
        assert_eq!(ids, vec!["fast", "slow"]);
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let pool = WorkerPool::new(WorkerPoolConfig::new(2));
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let units: Vec<(String, ())> = (0..8).map(|i| (format!("u{}", i), ())).collect();
        let (r, p) = (Arc::clone(&running), Arc::clone(&peak));
        let rx = pool.spawn(units, move |_| {
            let (running, peak) = (Arc::clone(&r), Arc::clone(&p));
            async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                running.fetch_sub(1, Ordering::SeqCst);
            }
        });

        assert_eq!(drain(rx).await.len(), 8);
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_sequential_preserves_submission_order() {
        let pool = WorkerPool::new(WorkerPoolConfig::sequential());
        let units = vec![
            ("a".to_string(), 50u64),
            ("b".to_string(), 1u64),
            ("c".to_string(), 20u64),
        ];
        let rx = pool.spawn(units, |delay| async move {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        });

        let ids: Vec<String> = drain(rx).await.into_iter().map(|c| c.unit_id).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_panicking_job_is_reported() {
        for config in [WorkerPoolConfig::new(2), WorkerPoolConfig::sequential()] {
            let pool = WorkerPool::new(config);
            let units = vec![("ok".to_string(), false), ("boom".to_string(), true)];
            let rx = pool.spawn(units, |explode| async move {
                if explode {
                    panic!("exploded");
                }
                1u8
            });

            let completions = drain(rx).await;
            assert_eq!(completions.len(), 2);
            let boom = completions.iter().find(|c| c.unit_id == "boom").unwrap();
            assert_eq!(boom.result, Err(PoolError::Panicked("exploded".to_string())));
            let ok = completions.iter().find(|c| c.unit_id == "ok").unwrap();
            assert_eq!(ok.result, Ok(1));
        }
    }
}
