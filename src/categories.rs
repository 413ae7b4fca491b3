//! Category tree resolver.
//!
//! The source system exports subject categories as a flat table with a
//! single parent pointer per row. Importing them means turning those flat
//! pointers into two derived fields per category: the ordered ancestor list
//! (nearest first) and a human-readable breadcrumb from root to leaf.
//!
//! The tree is built once (or loaded from its persisted JSON form) and then
//! shared read-only across every record normalization; it is never touched
//! per record.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

pub const BREADCRUMB_SEPARATOR: &str = " > ";

/// Pseudo-root identifiers that terminate an ancestor walk without being
/// recorded as ancestors.
const SENTINEL_ROOTS: [&str; 2] = ["divisions", "centers"];

/// Header sentinel: a CSV row whose first cell is this literal is the
/// header row and is skipped.
const HEADER_SENTINEL: &str = "source_identifier";

/// One subject category, with its derived ancestor closure and breadcrumb.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryNode {
    pub identifier: String,
    pub model: String,
    pub raw_parents: String,
    pub title: String,
    pub description: String,
    /// Ancestor identifiers, nearest first. Excludes sentinel roots.
    #[serde(default)]
    pub parents: Vec<String>,
    /// Root-to-leaf titles joined by [`BREADCRUMB_SEPARATOR`].
    #[serde(default, rename = "breadcrumbed_name")]
    pub breadcrumb: String,
}

/// Issues observed while resolving the tree. Resolution always completes;
/// these are for the audit trail and for tests.
#[derive(Debug, Default)]
pub struct ResolveReport {
    /// Categories whose ancestor walk hit a first-order self-reference.
    pub recursion_errors: Vec<String>,
    /// Parent identifiers that were referenced but never defined.
    pub unknown_parents: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum CategoryError {
    #[error("category source unreadable: {0}")]
    Io(#[from] std::io::Error),
    #[error("category CSV malformed: {0}")]
    Csv(#[from] csv::Error),
    #[error("category JSON malformed: {0}")]
    Json(#[from] serde_json::Error),
}

/// The full category table, keyed by identifier.
///
/// BTreeMap keeps the persisted form stable across runs.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CategoryTable {
    #[serde(flatten)]
    categories: BTreeMap<String, CategoryNode>,
}

impl CategoryTable {
    /// Import raw category rows from the export CSV.
    ///
    /// Rows are `(identifier, model, rawParentId, title, description)`; the
    /// header row is recognized by its sentinel first cell and skipped. The
    /// derived fields stay empty until [`CategoryTable::resolve`] runs.
    pub fn import_raw_csv(path: impl AsRef<Path>) -> Result<CategoryTable, CategoryError> {
        let path = path.as_ref();
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(path)?;

        let mut categories = BTreeMap::new();
        for row in reader.records() {
            let row = row?;
            let cell = |i: usize| row.get(i).unwrap_or("").trim().to_string();
            let identifier = cell(0);
            if identifier == HEADER_SENTINEL {
                continue;
            }
            categories.insert(
                identifier.clone(),
                CategoryNode {
                    identifier,
                    model: cell(1),
                    raw_parents: cell(2),
                    title: cell(3),
                    description: cell(4),
                    parents: Vec::new(),
                    breadcrumb: String::new(),
                },
            );
        }
        info!(count = categories.len(), path = %path.display(), "Imported raw categories");
        Ok(CategoryTable { categories })
    }

    /// Walk every category upward through its parent pointers, populating
    /// the ancestor list and breadcrumb.
    ///
    /// The walk stops at a sentinel root (without recording it), at an
    /// unknown parent id, or at a first-order self-reference. The
    /// self-reference guard intentionally covers only direct self-loops;
    /// longer cycles were never observed in the source data and are not
    /// detected here.
    pub fn resolve(&mut self) -> ResolveReport {
        let mut report = ResolveReport::default();
        let ids: Vec<String> = self.categories.keys().cloned().collect();

        for id in ids {
            let mut parents: Vec<String> = Vec::new();
            let node = &self.categories[&id];
            let mut breadcrumb = node.title.clone();
            let mut parent_id = node.raw_parents.clone();

            while !parent_id.is_empty() {
                if SENTINEL_ROOTS.contains(&parent_id.as_str()) {
                    break;
                }
                let parent = match self.categories.get(&parent_id) {
                    Some(parent) => parent,
                    None => {
                        warn!(category = %id, parent = %parent_id, "Parent id not in category table");
                        report.unknown_parents.push(parent_id.clone());
                        break;
                    }
                };
                if parent_id == parent.raw_parents {
                    error!(parent = %parent_id, "Recursive category: parent id has itself as a parent");
                    report.recursion_errors.push(parent_id.clone());
                    break;
                }
                parents.push(parent_id.clone());
                breadcrumb = format!("{}{}{}", parent.title, BREADCRUMB_SEPARATOR, breadcrumb);
                parent_id = parent.raw_parents.clone();
            }

            let node = self.categories.get_mut(&id).expect("id came from the table");
            node.parents = parents;
            node.breadcrumb = breadcrumb;
        }
        report
    }

    /// Persist the resolved table for later runs.
    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<(), CategoryError> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(&self.categories)?;
        fs::write(path, json)?;
        info!(count = self.categories.len(), path = %path.display(), "Saved resolved categories");
        Ok(())
    }

    /// Load a previously resolved table. Missing or unreadable files are
    /// fatal at startup.
    pub fn load_json(path: impl AsRef<Path>) -> Result<CategoryTable, CategoryError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        let categories: BTreeMap<String, CategoryNode> = serde_json::from_str(&contents)?;
        info!(count = categories.len(), path = %path.display(), "Loaded resolved categories");
        Ok(CategoryTable { categories })
    }

    pub fn get(&self, id: &str) -> Option<&CategoryNode> {
        self.categories.get(id)
    }

    /// The breadcrumb for a category, if the id resolves and the breadcrumb
    /// is non-empty.
    pub fn breadcrumb(&self, id: &str) -> Option<&str> {
        self.categories
            .get(id)
            .map(|node| node.breadcrumb.as_str())
            .filter(|b| !b.is_empty())
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    /// Build a table directly from nodes. Used by tests and by callers that
    /// assemble categories without the CSV import.
    pub fn from_nodes(nodes: impl IntoIterator<Item = CategoryNode>) -> CategoryTable {
        CategoryTable {
            categories: nodes
                .into_iter()
                .map(|node| (node.identifier.clone(), node))
                .collect(),
        }
    }
}
