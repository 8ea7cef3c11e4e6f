//! Task discovery over the dataset tree.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::{Category, CategoryFilter, GROUND_TRUTH, INSTRUCTION, START_ARTIFACT, START_PREVIEW};
use crate::error::DatasetError;

/// Item directory naming convention: `slide_<n>`.
fn item_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^slide_(\d+)$").expect("item pattern is a valid regex"))
}

/// Returns the numeric index of an item directory name, if it follows the
/// `slide_<n>` convention.
pub fn parse_item_index(name: &str) -> Option<u32> {
    item_pattern()
        .captures(name)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// One evaluable benchmark item, ready to dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskUnit {
    pub category: Category,
    /// Item directory name (`slide_<n>`).
    pub item: String,
    pub index: u32,
    pub task_dir: PathBuf,
    pub init_code_path: PathBuf,
    /// Recorded even when the file does not exist.
    pub init_image_path: PathBuf,
    pub target_description_path: PathBuf,
}

impl TaskUnit {
    /// Identifier used in logs and failure reports: `<category>/<item>`.
    pub fn task_id(&self) -> String {
        format!("{}/{}", self.category, self.item)
    }
}

/// An item directory found by enumeration, before any file checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemDir {
    pub category: Category,
    pub name: String,
    pub index: u32,
    pub path: PathBuf,
}

/// Discovers tasks under a dataset root.
#[derive(Debug, Clone)]
pub struct TaskLoader {
    root: PathBuf,
}

impl TaskLoader {
    /// Creates a loader for the given dataset root.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the dataset root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the ground-truth deck for one item.
    pub fn ground_truth_path(&self, category: Category, index: u32) -> PathBuf {
        self.root
            .join(category.dir_name())
            .join(format!("slide_{}", index))
            .join(GROUND_TRUTH)
    }

    /// Produces the ordered task list for a run.
    ///
    /// With `item_id`, exactly one directory is resolved without scanning and
    /// its absence is an error. Otherwise every `slide_<n>` directory of the
    /// selected categories is considered; candidates missing a required file
    /// are logged and skipped.
    pub fn load(
        &self,
        filter: CategoryFilter,
        item_id: Option<&str>,
    ) -> Result<Vec<TaskUnit>, DatasetError> {
        if !self.root.is_dir() {
            return Err(DatasetError::RootNotFound(self.root.clone()));
        }

        let candidates = match item_id {
            Some(id) => vec![self.resolve_item(filter, id)?],
            None => {
                let mut all = Vec::new();
                for category in filter.categories() {
                    all.extend(self.discover_items(category)?);
                }
                all
            }
        };

        let mut tasks = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            if let Some(task) = accept(candidate) {
                info!(task = %task.task_id(), "Found task");
                tasks.push(task);
            }
        }

        Ok(tasks)
    }

    /// Enumerates every `slide_<n>` directory of one category, sorted by index.
    ///
    /// A missing category directory yields an empty list.
    pub fn discover_items(&self, category: Category) -> Result<Vec<ItemDir>, DatasetError> {
        list_item_dirs(&self.root.join(category.dir_name()), category)
    }

    fn resolve_item(&self, filter: CategoryFilter, id: &str) -> Result<ItemDir, DatasetError> {
        let category = match filter {
            CategoryFilter::One(category) => category,
            CategoryFilter::All => return Err(DatasetError::ItemWithoutCategory),
        };

        let name = format!("slide_{}", id.trim());
        let path = self.root.join(category.dir_name()).join(&name);
        let index = parse_item_index(&name);

        match index {
            Some(index) if path.is_dir() => Ok(ItemDir {
                category,
                name,
                index,
                path,
            }),
            _ => Err(DatasetError::ItemNotFound { item: name, path }),
        }
    }
}

/// Lists `slide_<n>` subdirectories of `dir`, sorted by numeric index.
///
/// Used for both the dataset tree and a run's output tree, which share the
/// item naming convention.
pub fn list_item_dirs(dir: &Path, category: Category) -> Result<Vec<ItemDir>, DatasetError> {
    if !dir.is_dir() {
        warn!(path = %dir.display(), "Category directory not found, skipping");
        return Ok(Vec::new());
    }

    let mut items = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry?;
        if !entry.file_type().is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        match parse_item_index(&name) {
            Some(index) => items.push(ItemDir {
                category,
                name,
                index,
                path: entry.into_path(),
            }),
            None => debug!(name = %name, "Ignoring non-item directory"),
        }
    }

    items.sort_by_key(|item| item.index);
    Ok(items)
}

/// Checks the required inputs of a candidate directory.
fn accept(candidate: ItemDir) -> Option<TaskUnit> {
    let init_code_path = candidate.path.join(START_ARTIFACT);
    let target_description_path = candidate.path.join(INSTRUCTION);

    if !init_code_path.is_file() {
        warn!(dir = %candidate.path.display(), "{} not found, skipping", START_ARTIFACT);
        return None;
    }
    if !target_description_path.is_file() {
        warn!(dir = %candidate.path.display(), "{} not found, skipping", INSTRUCTION);
        return None;
    }

    Some(TaskUnit {
        category: candidate.category,
        init_image_path: candidate.path.join(START_PREVIEW),
        item: candidate.name,
        index: candidate.index,
        init_code_path,
        target_description_path,
        task_dir: candidate.path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn make_item(root: &Path, category: &str, name: &str, files: &[&str]) {
        let dir = root.join(category).join(name);
        fs::create_dir_all(&dir).unwrap();
        for file in files {
            fs::write(dir.join(file), "x").unwrap();
        }
    }

    #[test]
    fn test_parse_item_index() {
        assert_eq!(parse_item_index("slide_12"), Some(12));
        assert_eq!(parse_item_index("slide_"), None);
        assert_eq!(parse_item_index("slides_3"), None);
        assert_eq!(parse_item_index("slide_3.bak"), None);
    }

    #[test]
    fn test_load_skips_incomplete_items() {
        let temp = TempDir::new().unwrap();
        make_item(temp.path(), "food", "slide_1", &["start.py", "instruction.txt", "start.jpg"]);
        make_item(temp.path(), "food", "slide_2", &["start.py"]);
        make_item(temp.path(), "food", "slide_3", &["instruction.txt"]);
        make_item(temp.path(), "food", "slide_4", &["start.py", "instruction.txt"]);
        make_item(temp.path(), "food", "notes", &["start.py", "instruction.txt"]);

        let loader = TaskLoader::new(temp.path());
        let tasks = loader
            .load(CategoryFilter::One(Category::Food), None)
            .unwrap();

        let ids: Vec<String> = tasks.iter().map(|t| t.task_id()).collect();
        assert_eq!(ids, vec!["food/slide_1", "food/slide_4"]);
        // The preview is recorded even when absent.
        assert_eq!(tasks[1].init_image_path, temp.path().join("food/slide_4/start.jpg"));
    }

    #[test]
    fn test_load_orders_by_numeric_index() {
        let temp = TempDir::new().unwrap();
        for name in ["slide_10", "slide_2", "slide_1"] {
            make_item(temp.path(), "design", name, &["start.py", "instruction.txt"]);
        }

        let tasks = TaskLoader::new(temp.path())
            .load(CategoryFilter::One(Category::Design), None)
            .unwrap();
        let indices: Vec<u32> = tasks.iter().map(|t| t.index).collect();
        assert_eq!(indices, vec![1, 2, 10]);
    }

    #[test]
    fn test_load_all_skips_missing_categories() {
        let temp = TempDir::new().unwrap();
        make_item(temp.path(), "business", "slide_1", &["start.py", "instruction.txt"]);
        make_item(temp.path(), "technology", "slide_1", &["start.py", "instruction.txt"]);

        let tasks = TaskLoader::new(temp.path())
            .load(CategoryFilter::All, None)
            .unwrap();
        let categories: Vec<Category> = tasks.iter().map(|t| t.category).collect();
        assert_eq!(categories, vec![Category::Business, Category::Technology]);
    }

    #[test]
    fn test_load_single_item() {
        let temp = TempDir::new().unwrap();
        make_item(temp.path(), "food", "slide_1", &["start.py", "instruction.txt"]);
        make_item(temp.path(), "food", "slide_7", &["start.py", "instruction.txt"]);

        let loader = TaskLoader::new(temp.path());
        let tasks = loader
            .load(CategoryFilter::One(Category::Food), Some("7"))
            .unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].item, "slide_7");

        let err = loader
            .load(CategoryFilter::One(Category::Food), Some("8"))
            .unwrap_err();
        assert!(matches!(err, DatasetError::ItemNotFound { .. }));

        let err = loader.load(CategoryFilter::All, Some("7")).unwrap_err();
        assert!(matches!(err, DatasetError::ItemWithoutCategory));
    }

    #[test]
    fn test_load_missing_root() {
        let temp = TempDir::new().unwrap();
        let err = TaskLoader::new(temp.path().join("nope"))
            .load(CategoryFilter::All, None)
            .unwrap_err();
        assert!(matches!(err, DatasetError::RootNotFound(_)));
    }

    #[test]
    fn test_ground_truth_path() {
        let loader = TaskLoader::new("/data");
        assert_eq!(
            loader.ground_truth_path(Category::Marketing, 4),
            PathBuf::from("/data/marketing/slide_4/slide.pptx")
        );
    }
}
