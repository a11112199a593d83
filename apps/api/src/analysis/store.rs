//! On-disk store for scraped posts and analysis results, one directory per
//! handle:
//!
//! ```text
//! <data_dir>/<handle>/raw.json            scraped posts
//! <data_dir>/<handle>/main.json           bundle minus categories
//! <data_dir>/<handle>/<category_id>.json  one per category
//! ```

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::analysis::models::Post;
use crate::errors::AppError;
use crate::selection::models::{AnalysisBundle, CategoryDefinition};

pub const RAW_FILE: &str = "raw.json";
pub const MAIN_FILE: &str = "main.json";
const AVAILABLE_CATEGORIES_KEY: &str = "available_categories";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HandleSummary {
    pub name: String,
    pub has_raw: bool,
    pub has_main: bool,
    pub category_count: usize,
    pub last_modified: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisFile {
    pub filename: String,
    pub is_main: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_id: Option<String>,
    pub display_name: String,
}

/// Result of writing an analysis to disk.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SavedAnalysis {
    pub main_file: String,
    pub category_files: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct HandleStore {
    root: PathBuf,
}

impl HandleStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn handle_dir(&self, handle: &str) -> Result<PathBuf, AppError> {
        if !is_safe_segment(handle) {
            return Err(AppError::Validation(format!("Invalid handle: {handle:?}")));
        }
        Ok(self.root.join(handle))
    }

    pub async fn save_raw(&self, handle: &str, posts: &[Post]) -> Result<(), AppError> {
        let dir = self.handle_dir(handle)?;
        tokio::fs::create_dir_all(&dir).await?;
        write_json(&dir.join(RAW_FILE), &posts).await?;
        info!("Saved {} raw posts for {}", posts.len(), handle);
        Ok(())
    }

    pub async fn load_raw(&self, handle: &str) -> Result<Vec<Post>, AppError> {
        let path = self.handle_dir(handle)?.join(RAW_FILE);
        if !exists(&path).await {
            return Err(AppError::NotFound(
                "No raw data found. Please scrape first.".to_string(),
            ));
        }
        read_json(&path).await
    }

    /// Writes main.json plus one file per category. Category files from a
    /// previous analysis are removed first so stale categories don't linger.
    pub async fn save_analysis(
        &self,
        handle: &str,
        bundle: &AnalysisBundle,
    ) -> Result<SavedAnalysis, AppError> {
        let dir = self.handle_dir(handle)?;
        tokio::fs::create_dir_all(&dir).await?;

        for stale in category_file_names(&dir).await? {
            tokio::fs::remove_file(dir.join(stale)).await?;
        }

        let category_ids: Vec<String> = bundle
            .categories
            .iter()
            .map(|c| category_file_stem(c.category_id.as_deref()))
            .collect();

        let mut main = serde_json::to_value(bundle).map_err(|e| AppError::Internal(e.into()))?;
        if let Value::Object(map) = &mut main {
            map.remove("categories");
            map.insert(AVAILABLE_CATEGORIES_KEY.into(), json!(category_ids));
        }
        write_json(&dir.join(MAIN_FILE), &main).await?;

        let mut category_files = Vec::with_capacity(bundle.categories.len());
        for (stem, category) in category_ids.iter().zip(&bundle.categories) {
            let filename = format!("{stem}.json");
            write_json(&dir.join(&filename), category).await?;
            category_files.push(filename);
        }

        info!(
            "Saved analysis for {} with {} categories",
            handle,
            category_files.len()
        );
        Ok(SavedAnalysis {
            main_file: MAIN_FILE.to_string(),
            category_files,
        })
    }

    /// Reassembles the bundle from main.json and the category files it lists.
    pub async fn load_bundle(&self, handle: &str) -> Result<AnalysisBundle, AppError> {
        let dir = self.handle_dir(handle)?;
        let main = self.load_main(handle).await?;

        let stems: Vec<String> = main
            .get(AVAILABLE_CATEGORIES_KEY)
            .and_then(Value::as_array)
            .map(|ids| {
                ids.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let mut bundle: AnalysisBundle =
            serde_json::from_value(main).map_err(|e| AppError::Internal(e.into()))?;
        bundle.extra.remove(AVAILABLE_CATEGORIES_KEY);

        for stem in stems {
            let path = dir.join(format!("{}.json", category_file_stem(Some(&stem))));
            if !exists(&path).await {
                warn!("Category file {} missing for {}", path.display(), handle);
                continue;
            }
            bundle.categories.push(read_json::<CategoryDefinition>(&path).await?);
        }

        Ok(bundle)
    }

    /// Raw main.json, as served to the canvas page.
    pub async fn load_main(&self, handle: &str) -> Result<Value, AppError> {
        let path = self.handle_dir(handle)?.join(MAIN_FILE);
        if !exists(&path).await {
            return Err(AppError::NotFound(format!(
                "{MAIN_FILE} not found for {handle}. Please run analysis first."
            )));
        }
        read_json(&path).await
    }

    /// Every handle directory, most recently updated first.
    pub async fn list_handles(&self) -> Result<Vec<HandleSummary>, AppError> {
        if !exists(&self.root).await {
            return Ok(Vec::new());
        }

        let mut handles = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let dir = entry.path();
            let raw_modified = modified(&dir.join(RAW_FILE)).await;
            let main_modified = modified(&dir.join(MAIN_FILE)).await;

            handles.push(HandleSummary {
                name: entry.file_name().to_string_lossy().into_owned(),
                has_raw: raw_modified.is_some(),
                has_main: main_modified.is_some(),
                category_count: category_file_names(&dir).await?.len(),
                last_modified: main_modified.or(raw_modified),
            });
        }

        handles.sort_by(|a, b| b.last_modified.cmp(&a.last_modified));
        Ok(handles)
    }

    /// main.json first (when present), then category files by name.
    pub async fn analysis_files(&self, handle: &str) -> Result<Vec<AnalysisFile>, AppError> {
        let dir = self.handle_dir(handle)?;
        if !exists(&dir).await {
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        if exists(&dir.join(MAIN_FILE)).await {
            files.push(AnalysisFile {
                filename: MAIN_FILE.to_string(),
                is_main: true,
                category_id: None,
                display_name: format!("Universal Elements ({MAIN_FILE})"),
            });
        }

        for filename in category_file_names(&dir).await? {
            let category_id = filename.trim_end_matches(".json").to_string();
            files.push(AnalysisFile {
                display_name: format!("Category: {}", title_case(&category_id)),
                filename,
                is_main: false,
                category_id: Some(category_id),
            });
        }
        Ok(files)
    }

    /// Reads one JSON file from a handle directory.
    pub async fn read_file(&self, handle: &str, filename: &str) -> Result<Value, AppError> {
        if !is_safe_segment(filename) || !filename.ends_with(".json") {
            return Err(AppError::Validation(format!("Invalid file name: {filename:?}")));
        }
        let path = self.handle_dir(handle)?.join(filename);
        if !exists(&path).await {
            return Err(AppError::NotFound("File not found".to_string()));
        }
        read_json(&path).await
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Helpers
// ────────────────────────────────────────────────────────────────────────────

/// A single path component: no separators, no leading dot.
pub fn is_safe_segment(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

/// File stem for a category id. Characters that can't appear in a file name
/// become underscores.
pub fn category_file_stem(category_id: Option<&str>) -> String {
    let id = category_id.unwrap_or("unknown");
    let stem: String = id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    match stem.as_str() {
        "" | "raw" | "main" => format!("category_{stem}"),
        _ => stem,
    }
}

fn title_case(id: &str) -> String {
    id.split('_')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

async fn category_file_names(dir: &Path) -> Result<Vec<String>, AppError> {
    let mut names = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.ends_with(".json") && name != RAW_FILE && name != MAIN_FILE {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

async fn exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

async fn modified(path: &Path) -> Option<DateTime<Utc>> {
    let metadata = tokio::fs::metadata(path).await.ok()?;
    let time: SystemTime = metadata.modified().ok()?;
    Some(time.into())
}

async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), AppError> {
    let bytes = serde_json::to_vec_pretty(value).map_err(|e| AppError::Internal(e.into()))?;
    tokio::fs::write(path, bytes).await?;
    Ok(())
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, AppError> {
    let bytes = tokio::fs::read(path).await?;
    serde_json::from_slice(&bytes).map_err(|e| {
        AppError::Internal(anyhow::anyhow!("Invalid JSON in {}: {e}", path.display()))
    })
}
