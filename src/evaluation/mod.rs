//! Scoring of generated rounds and benchmark aggregation.
//!
//! A finished run holds, per item, numbered round directories:
//!
//! ```text
//! <output_root>/<run_id>/<category>/slide_<n>/<round>/
//!     refine.pptx              generated deck
//!     refine.jpg               rendered preview
//!     ref_based_report.txt     reference-based scorer output
//!     ref_free_report.json     reference-free scorer output
//! ```
//!
//! The [`EvaluationDispatcher`] (re)writes the two reports by invoking the
//! external scorers. The [`RoundAggregator`] then reads them, picks every
//! item's best round and folds the winners into a [`BenchmarkSummary`].

pub mod aggregator;
pub mod config;
pub mod dispatcher;
pub mod parser;

/// Generated deck of a round.
pub const GENERATED_ARTIFACT: &str = "refine.pptx";

/// Rendered preview of a round's deck.
pub const GENERATED_PREVIEW: &str = "refine.jpg";

/// Text report of the reference-based scorer.
pub const REF_BASED_REPORT: &str = "ref_based_report.txt";

/// JSON report of the reference-free scorer.
pub const REF_FREE_REPORT: &str = "ref_free_report.json";

pub use aggregator::{
    AggregateResult, BenchmarkSummary, BestRoundSelection, ItemScore, ItemSummary,
    RoundAggregator, TieBreak,
};
pub use config::{EvaluationConfig, DEFAULT_SCORER_TIMEOUT_SECS};
pub use dispatcher::{list_rounds, EvaluationDispatcher, EvaluationSummary, SCORER_LOG};
pub use parser::{
    composite_of, load_round, parse_ref_based, parse_ref_free, RefBasedScores, RefFreeScores,
    RoundReport,
};
