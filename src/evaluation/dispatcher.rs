//! Re-scoring of generated rounds with the two external scorers.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::config::EvaluationConfig;
use super::{GENERATED_ARTIFACT, GENERATED_PREVIEW, REF_BASED_REPORT, REF_FREE_REPORT};
use crate::dataset::{list_item_dirs, ItemDir, TaskLoader};
use crate::error::DatasetError;
use crate::runner::{CommandSpec, Deadline, ProcessRunner};
use crate::scheduler::WorkerPool;

/// Stdout of the scorers for one round is appended here.
pub const SCORER_LOG: &str = "scorer.log";

/// Counts for one `evaluate` invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationSummary {
    /// Items visited.
    pub items: usize,
    /// Rounds with a generated artifact that were sent to the scorers.
    pub rounds_scored: usize,
    /// Scorer processes that failed, timed out or could not start.
    pub scorer_failures: usize,
}

impl EvaluationSummary {
    fn merge(&mut self, other: EvaluationSummary) {
        self.items += other.items;
        self.rounds_scored += other.rounds_scored;
        self.scorer_failures += other.scorer_failures;
    }
}

/// Which scorer a command belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scorer {
    RefBased,
    RefFree,
}

impl Scorer {
    fn name(&self) -> &'static str {
        match self {
            Scorer::RefBased => "ref-based",
            Scorer::RefFree => "ref-free",
        }
    }
}

/// Runs both scorers over every generated round of a run.
///
/// Every invocation re-scores every round that has a generated artifact and
/// replaces whatever reports were there before.
#[derive(Clone)]
pub struct EvaluationDispatcher {
    config: Arc<EvaluationConfig>,
    loader: TaskLoader,
    runner: Arc<dyn ProcessRunner>,
}

impl EvaluationDispatcher {
    /// Creates a dispatcher for the run named in `config`.
    pub fn new(config: EvaluationConfig, runner: Arc<dyn ProcessRunner>) -> Self {
        let loader = TaskLoader::new(&config.dataset_path);
        Self {
            config: Arc::new(config),
            loader,
            runner,
        }
    }

    /// Scores every item of the selected categories on the worker pool.
    pub async fn evaluate(&self) -> Result<EvaluationSummary, DatasetError> {
        let run_dir = self.config.run_dir();
        if !run_dir.is_dir() {
            return Err(DatasetError::RootNotFound(run_dir));
        }

        let mut items = Vec::new();
        for category in self.config.task.categories() {
            items.extend(list_item_dirs(&self.config.category_dir(category), category)?);
        }

        let start = Instant::now();
        info!(
            run_id = %self.config.run_id,
            items = items.len(),
            workers = self.config.max_workers,
            "Starting evaluation"
        );

        let units = items
            .into_iter()
            .map(|item| (format!("{}/{}", item.category, item.name), item))
            .collect();
        let dispatcher = self.clone();
        let mut completions = WorkerPool::new(self.config.pool_config()).spawn(units, move |item| {
            let dispatcher = dispatcher.clone();
            async move { dispatcher.evaluate_item(&item).await }
        });

        let mut summary = EvaluationSummary::default();
        while let Some(completion) = completions.recv().await {
            match completion.result {
                Ok(item_summary) => summary.merge(item_summary),
                Err(_) => summary.items += 1,
            }
        }

        info!(
            items = summary.items,
            rounds = summary.rounds_scored,
            scorer_failures = summary.scorer_failures,
            elapsed_secs = format!("{:.1}", start.elapsed().as_secs_f64()),
            "Evaluation finished"
        );
        Ok(summary)
    }

    /// Scores every round of one item, newest round first.
    pub async fn evaluate_item(&self, item: &ItemDir) -> EvaluationSummary {
        let mut summary = EvaluationSummary {
            items: 1,
            ..Default::default()
        };

        let rounds = match list_rounds(&item.path) {
            Ok(rounds) => rounds,
            Err(e) => {
                warn!(item = %item.path.display(), error = %e, "Cannot list rounds, skipping item");
                return summary;
            }
        };
        if rounds.is_empty() {
            warn!(item = %item.path.display(), "No generated rounds found");
            return summary;
        }

        let ground_truth = self.loader.ground_truth_path(item.category, item.index);
        for (round, round_dir) in rounds {
            debug!(item = %item.name, round, "Scoring round");
            summary.rounds_scored += 1;
            summary.scorer_failures += self.score_round(item, &ground_truth, &round_dir).await;
        }

        info!(item = %format!("{}/{}", item.category, item.name), rounds = summary.rounds_scored, "Item evaluated");
        summary
    }

    /// Runs both scorers for one round. Returns the number of failures.
    async fn score_round(&self, item: &ItemDir, ground_truth: &Path, round_dir: &Path) -> usize {
        let artifact = round_dir.join(GENERATED_ARTIFACT);
        let preview = round_dir.join(GENERATED_PREVIEW);
        let ref_based_report = round_dir.join(REF_BASED_REPORT);
        let ref_free_report = round_dir.join(REF_FREE_REPORT);
        let mut failures = 0;

        // Stale reports must not outlive a failed or skipped scorer.
        for report in [&ref_based_report, &ref_free_report] {
            if let Err(e) = remove_if_present(report).await {
                warn!(path = %report.display(), error = %e, "Failed to remove previous report");
            }
        }

        let spec = self
            .scorer_command(&self.config.ref_based_script, round_dir)
            .flag("--reference_pptx", path_arg(ground_truth))
            .flag("--generated_pptx", path_arg(&artifact))
            .flag("--reference_page", item.index.to_string())
            .flag("--output_path", path_arg(&ref_based_report));
        if !self.run_scorer(Scorer::RefBased, &spec, &ref_based_report).await {
            failures += 1;
        }

        if preview.is_file() {
            let spec = self
                .scorer_command(&self.config.ref_free_script, round_dir)
                .flag("--image_path", path_arg(&preview))
                .flag("--response_path", path_arg(&ref_free_report));
            if !self.run_scorer(Scorer::RefFree, &spec, &ref_free_report).await {
                failures += 1;
            }
        } else {
            debug!(round_dir = %round_dir.display(), "No preview image, skipping ref-free scorer");
        }

        failures
    }

    fn scorer_command(&self, script: &Path, round_dir: &Path) -> CommandSpec {
        CommandSpec::new(&self.config.python)
            .arg(path_arg(script))
            .with_log_path(round_dir.join(SCORER_LOG))
    }

    /// Runs one scorer. A report left behind by a failed run is deleted.
    async fn run_scorer(&self, scorer: Scorer, spec: &CommandSpec, report: &Path) -> bool {
        let deadline = Deadline::after(self.config.scorer_timeout());
        let succeeded = match self.runner.run(spec, &deadline).await {
            Ok(output) if output.is_success() => true,
            Ok(output) => {
                warn!(scorer = scorer.name(), error = %output.failure_detail(), "Scorer failed");
                false
            }
            Err(e) => {
                warn!(scorer = scorer.name(), error = %e, "Scorer did not complete");
                false
            }
        };

        if !succeeded {
            if let Err(e) = remove_if_present(report).await {
                warn!(path = %report.display(), error = %e, "Failed to remove report of failed scorer");
            }
        }
        succeeded
    }
}

/// Lists numbered round directories holding a generated artifact,
/// highest round first.
pub fn list_rounds(item_dir: &Path) -> Result<Vec<(u32, PathBuf)>, walkdir::Error> {
    let mut rounds = Vec::new();
    for entry in WalkDir::new(item_dir).min_depth(1).max_depth(1) {
        let entry = entry?;
        if !entry.file_type().is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_digit()) {
            continue;
        }
        let Ok(round) = name.parse::<u32>() else {
            continue;
        };
        if entry.path().join(GENERATED_ARTIFACT).is_file() {
            rounds.push((round, entry.into_path()));
        }
    }

    rounds.sort_by(|a, b| b.0.cmp(&a.0));
    Ok(rounds)
}

async fn remove_if_present(path: &Path) -> io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
