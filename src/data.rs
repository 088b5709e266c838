//! JSON data tree access
//!
//! Documents live under `<data_dir>/<base>/<kind>/<category>/<name>.json`.
//! `template.json` files are authoring scaffolds and never listed.

use std::path::{Component, Path, PathBuf};

use serde::Serialize;
use serde_json::Value;
use tracing::warn;
use walkdir::WalkDir;

use crate::{Error, Result};

/// File name excluded from listings
pub const TEMPLATE_FILE: &str = "template.json";

/// A subdirectory of the data tree with its document count
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryInfo {
    /// Directory name
    pub name: String,
    /// Number of non-template JSON documents directly inside
    pub count: usize,
    /// Sub-path relative to the data root
    pub path: String,
}

/// Identifying information for one document
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemSummary {
    /// Document name without extension
    pub name: String,
    /// Sub-path relative to the data root, without extension
    pub path: String,
}

/// Reads documents from a base directory
#[derive(Debug, Clone)]
pub struct Loader {
    base_dir: PathBuf,
}

impl Loader {
    /// Create a loader rooted at `base_dir`
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Root of the data tree
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Subdirectories of `sub_path` with their document counts, sorted by name
    pub async fn list_categories(&self, sub_path: &str) -> Result<Vec<CategoryInfo>> {
        let dir = self.resolve(sub_path)?;
        let mut reader = tokio::fs::read_dir(&dir)
            .await
            .map_err(|_| Error::NotFound(format!("directory not found: {sub_path}")))?;

        let mut categories = Vec::new();
        while let Some(entry) = reader.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            let path = format!("{sub_path}/{name}");
            let count = self.json_files(&path).await.map_or(0, |files| files.len());
            categories.push(CategoryInfo { name, count, path });
        }

        categories.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(categories)
    }

    /// Non-template documents directly inside `sub_path`, sorted by name
    pub async fn list_items(&self, sub_path: &str) -> Result<Vec<ItemSummary>> {
        let files = self.json_files(sub_path).await?;
        Ok(files
            .into_iter()
            .map(|file| {
                let name = file.trim_end_matches(".json").to_string();
                let path = format!("{sub_path}/{name}");
                ItemSummary { name, path }
            })
            .collect())
    }

    /// Read and parse `<sub_path>.json`
    pub async fn get_item(&self, sub_path: &str) -> Result<Value> {
        let mut target = self.resolve(sub_path)?;
        target.as_mut_os_string().push(".json");

        let raw = tokio::fs::read(&target)
            .await
            .map_err(|_| Error::NotFound(format!("item not found: {sub_path}")))?;

        serde_json::from_slice(&raw).map_err(|e| {
            warn!(path = %target.display(), error = %e, "Rejected malformed document");
            Error::InvalidJson(sub_path.to_string())
        })
    }

    /// Join `sub_path` onto the base, refusing anything but plain names
    fn resolve(&self, sub_path: &str) -> Result<PathBuf> {
        let invalid = || Error::InvalidPath(sub_path.to_string());

        if sub_path.is_empty() || sub_path.split('/').any(str::is_empty) {
            return Err(invalid());
        }
        let relative = Path::new(sub_path);
        if !relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
        {
            return Err(invalid());
        }
        if sub_path.contains('\\') {
            return Err(invalid());
        }

        Ok(self.base_dir.join(relative))
    }

    /// Sorted file names of non-template `.json` files in `sub_path`
    async fn json_files(&self, sub_path: &str) -> Result<Vec<String>> {
        let dir = self.resolve(sub_path)?;
        let mut reader = tokio::fs::read_dir(&dir)
            .await
            .map_err(|_| Error::NotFound(format!("directory not found: {sub_path}")))?;

        let mut files = Vec::new();
        while let Some(entry) = reader.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if entry.file_type().await?.is_dir()
                || !name.ends_with(".json")
                || name == TEMPLATE_FILE
            {
                continue;
            }
            files.push(name);
        }

        files.sort();
        Ok(files)
    }
}

/// Outcome of checking every document in a tree
#[derive(Debug, Default)]
pub struct ValidationReport {
    /// Documents parsed
    pub checked: usize,
    /// Documents that failed, with the reason
    pub invalid: Vec<(PathBuf, String)>,
}

impl ValidationReport {
    /// Whether every document parsed
    pub fn is_ok(&self) -> bool {
        self.invalid.is_empty()
    }
}

/// Parse every `.json` file under `root`, templates included
pub fn validate_tree(root: &Path) -> Result<ValidationReport> {
    if !root.is_dir() {
        return Err(Error::NotFound(format!(
            "data directory not found: {}",
            root.display()
        )));
    }

    let mut report = ValidationReport::default();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|e| Error::Internal(e.to_string()))?;
        let path = entry.path();
        if !entry.file_type().is_file() || path.extension().is_none_or(|ext| ext != "json") {
            continue;
        }

        report.checked += 1;
        let outcome = std::fs::read(path)
            .map_err(|e| e.to_string())
            .and_then(|raw| {
                serde_json::from_slice::<Value>(&raw)
                    .map(drop)
                    .map_err(|e| e.to_string())
            });
        if let Err(reason) = outcome {
            report.invalid.push((path.to_path_buf(), reason));
        }
    }
    Ok(report)
}
