//! Best-round selection and benchmark aggregation.
//!
//! For every item the aggregator scans rounds `1..=max_rounds` in ascending
//! order, scores every complete round and keeps the best one. The per-item
//! winners are folded into an [`AggregateResult`], which is owned by a single
//! consumer and fed over the worker pool's completion channel.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::parser::{composite_of, load_round, RefBasedScores, RefFreeScores, RoundReport};
use crate::dataset::{Category, ItemDir};
use crate::scheduler::{PoolError, WorkerPool};

/// Rule deciding which round wins when composites are equal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// The lowest round number reaching the maximum wins.
    #[default]
    EarliestRound,
    /// The highest round number reaching the maximum wins.
    LatestRound,
}

impl TieBreak {
    /// Whether a round scanned later should replace the current best.
    ///
    /// Rounds are always scanned in ascending order. NaN never wins.
    pub fn prefers(&self, candidate: f64, incumbent: Option<f64>) -> bool {
        if candidate.is_nan() {
            return false;
        }
        match incumbent {
            None => true,
            Some(best) => match self {
                TieBreak::EarliestRound => candidate > best,
                TieBreak::LatestRound => candidate >= best,
            },
        }
    }
}

impl fmt::Display for TieBreak {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TieBreak::EarliestRound => f.write_str("earliest"),
            TieBreak::LatestRound => f.write_str("latest"),
        }
    }
}

impl FromStr for TieBreak {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "earliest" | "earliest_round" => Ok(TieBreak::EarliestRound),
            "latest" | "latest_round" => Ok(TieBreak::LatestRound),
            other => Err(format!("Unknown tie-break rule: {}", other)),
        }
    }
}

/// The winning round of one item.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BestRoundSelection {
    pub round: u32,
    pub composite: f64,
    pub report: RoundReport,
}

/// Scoring result for one item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemScore {
    pub category: Category,
    pub item: String,
    pub index: u32,
    /// `None` when the item has no complete round.
    pub best: Option<BestRoundSelection>,
}

impl ItemScore {
    /// Identifier used in logs and summaries: `<category>/<item>`.
    pub fn task_id(&self) -> String {
        format!("{}/{}", self.category, self.item)
    }
}

/// Selects best rounds and aggregates them over a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundAggregator {
    max_rounds: u32,
    tie_break: TieBreak,
}

impl RoundAggregator {
    /// Creates an aggregator scanning rounds `1..=max_rounds`.
    pub fn new(max_rounds: u32, tie_break: TieBreak) -> Self {
        Self {
            max_rounds,
            tie_break,
        }
    }

    /// Picks the best complete round under `item_dir`.
    ///
    /// Incomplete rounds (a report missing) are skipped quietly; rounds with
    /// an unreadable or out-of-range report are skipped with a warning.
    pub fn select_best_round(&self, item_dir: &Path) -> Option<BestRoundSelection> {
        let mut best: Option<BestRoundSelection> = None;

        for round in 1..=self.max_rounds {
            let round_dir = item_dir.join(round.to_string());
            if !round_dir.is_dir() {
                continue;
            }

            let report = match load_round(&round_dir) {
                Ok(report) => report,
                Err(e) if e.is_missing() => {
                    debug!(round_dir = %round_dir.display(), "Round incomplete, skipping");
                    continue;
                }
                Err(e) => {
                    warn!(round_dir = %round_dir.display(), error = %e, "Unusable round report, skipping");
                    continue;
                }
            };

            let composite = report.composite();
            if self
                .tie_break
                .prefers(composite, best.as_ref().map(|b| b.composite))
            {
                best = Some(BestRoundSelection {
                    round,
                    composite,
                    report,
                });
            }
        }

        best
    }

    /// Scores one item whose output lives at `item.path`.
    pub fn score_item(&self, item: &ItemDir) -> ItemScore {
        let best = self.select_best_round(&item.path);
        match &best {
            Some(b) => info!(
                item = %format!("{}/{}", item.category, item.name),
                round = b.round,
                score = format!("{:.4}", b.composite),
                "Using best round"
            ),
            None => warn!(
                item = %format!("{}/{}", item.category, item.name),
                "No complete round found"
            ),
        }

        ItemScore {
            category: item.category,
            item: item.name.clone(),
            index: item.index,
            best,
        }
    }

    /// Scores every item on the worker pool and folds the results.
    ///
    /// `items` carry the path of each item's output directory. Every item is
    /// counted, including ones whose worker failed.
    pub async fn gather(&self, items: Vec<ItemDir>, pool: &WorkerPool) -> AggregateResult {
        let mut result = AggregateResult::default();
        let mut pending: HashMap<String, ItemDir> = HashMap::with_capacity(items.len());

        let units: Vec<(String, ItemDir)> = items
            .into_iter()
            .map(|item| {
                let id = format!("{}/{}", item.category, item.name);
                pending.insert(id.clone(), item.clone());
                (id, item)
            })
            .collect();

        let aggregator = *self;
        // Report files are read with blocking calls.
        let mut completions = pool.spawn(units, move |item| async move {
            tokio::task::spawn_blocking(move || aggregator.score_item(&item))
                .await
                .map_err(PoolError::from)
        });

        while let Some(completion) = completions.recv().await {
            let item = pending.remove(&completion.unit_id);
            match (completion.result.and_then(|scored| scored), item) {
                (Ok(score), _) => result.record(score),
                (Err(_), Some(item)) => result.record(ItemScore {
                    category: item.category,
                    item: item.name,
                    index: item.index,
                    best: None,
                }),
                (Err(e), None) => {
                    warn!(unit = %completion.unit_id, error = %e, "Completion for unknown item")
                }
            }
        }

        result
    }
}

/// Running totals over the items of a run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateResult {
    /// Sum of the winning rounds' reference-based metrics.
    pub ref_based: RefBasedScores,
    /// Sum of the winning rounds' reference-free metrics.
    pub ref_free: RefFreeScores,
    pub total_items: usize,
    pub failed_items: usize,
    pub items: Vec<ItemScore>,
}

impl AggregateResult {
    /// Folds one item into the totals.
    ///
    /// An item without a complete round adds nothing to the sums but is
    /// still part of the denominator.
    pub fn record(&mut self, score: ItemScore) {
        self.total_items += 1;
        match &score.best {
            Some(best) => {
                self.ref_based += best.report.ref_based;
                self.ref_free += best.report.ref_free;
            }
            None => self.failed_items += 1,
        }
        self.items.push(score);
    }

    /// Averages the totals over every item.
    pub fn finalize(&self) -> BenchmarkSummary {
        let (ref_based, ref_free, success_rate) = if self.total_items == 0 {
            (RefBasedScores::default(), RefFreeScores::default(), 0.0)
        } else {
            let n = self.total_items as f64;
            (
                self.ref_based.averaged(n),
                self.ref_free.averaged(n),
                (self.total_items - self.failed_items) as f64 / n,
            )
        };

        let mut items: Vec<&ItemScore> = self.items.iter().collect();
        items.sort_by_key(|s| (s.category, s.index));

        BenchmarkSummary {
            overall_score: composite_of(&ref_based, &ref_free),
            ref_based,
            ref_free,
            success_rate,
            total_items: self.total_items,
            failed_items: self.failed_items,
            items: items
                .into_iter()
                .map(|s| ItemSummary {
                    task_id: s.task_id(),
                    best_round: s.best.as_ref().map(|b| b.round),
                    composite: s.best.as_ref().map(|b| b.composite),
                })
                .collect(),
        }
    }
}

/// Final benchmark result of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkSummary {
    /// Per-metric averages over every item.
    pub ref_based: RefBasedScores,
    pub ref_free: RefFreeScores,
    /// Mean of the eight averaged metrics.
    pub overall_score: f64,
    /// Share of items with at least one complete round.
    pub success_rate: f64,
    pub total_items: usize,
    pub failed_items: usize,
    pub items: Vec<ItemSummary>,
}

/// Best-round choice of one item, as reported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemSummary {
    pub task_id: String,
    pub best_round: Option<u32>,
    pub composite: Option<f64>,
}
