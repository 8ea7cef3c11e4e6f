//! Benchmark dataset discovery.
//!
//! The dataset is a two-level directory tree:
//!
//! ```text
//! <dataset_root>/<category>/slide_<n>/{start.py, start.jpg, instruction.txt, slide.pptx}
//! ```
//!
//! [`TaskLoader`] turns that tree into the list of [`TaskUnit`]s a run
//! dispatches, and exposes the raw item enumeration used when aggregating
//! scores.

pub mod loader;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use loader::{list_item_dirs, parse_item_index, ItemDir, TaskLoader, TaskUnit};

/// File name of the initial slide program inside an item directory.
pub const START_ARTIFACT: &str = "start.py";
/// File name of the initial slide preview inside an item directory.
pub const START_PREVIEW: &str = "start.jpg";
/// File name of the natural-language target description.
pub const INSTRUCTION: &str = "instruction.txt";
/// File name of the ground-truth deck inside an item directory.
pub const GROUND_TRUTH: &str = "slide.pptx";

/// Slide categories shipped with the benchmark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    ArtPhotos,
    Business,
    Design,
    Entrepreneur,
    Environment,
    Food,
    Marketing,
    SocialMedia,
    Technology,
}

impl Category {
    /// Every category, in canonical run order.
    pub const ALL: [Category; 9] = [
        Category::ArtPhotos,
        Category::Business,
        Category::Design,
        Category::Entrepreneur,
        Category::Environment,
        Category::Food,
        Category::Marketing,
        Category::SocialMedia,
        Category::Technology,
    ];

    /// Directory name of this category under the dataset and output roots.
    pub fn dir_name(&self) -> &'static str {
        match self {
            Category::ArtPhotos => "art_photos",
            Category::Business => "business",
            Category::Design => "design",
            Category::Entrepreneur => "entrepreneur",
            Category::Environment => "environment",
            Category::Food => "food",
            Category::Marketing => "marketing",
            Category::SocialMedia => "social_media",
            Category::Technology => "technology",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .iter()
            .copied()
            .find(|c| c.dir_name() == s.to_lowercase())
            .ok_or_else(|| format!("Unknown category: {}", s))
    }
}

/// Category selection for a run: every category or exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum CategoryFilter {
    All,
    One(Category),
}

impl CategoryFilter {
    /// Categories selected by this filter, in canonical order.
    pub fn categories(&self) -> Vec<Category> {
        match self {
            CategoryFilter::All => Category::ALL.to_vec(),
            CategoryFilter::One(category) => vec![*category],
        }
    }
}

impl Default for CategoryFilter {
    fn default() -> Self {
        Self::All
    }
}

impl fmt::Display for CategoryFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CategoryFilter::All => f.write_str("all"),
            CategoryFilter::One(category) => fmt::Display::fmt(category, f),
        }
    }
}

impl FromStr for CategoryFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("all") {
            Ok(CategoryFilter::All)
        } else {
            s.parse().map(CategoryFilter::One)
        }
    }
}

impl From<CategoryFilter> for String {
    fn from(filter: CategoryFilter) -> Self {
        filter.to_string()
    }
}

impl TryFrom<String> for CategoryFilter {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
