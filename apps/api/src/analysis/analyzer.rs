//! Design analysis: turns scraped posts into an `AnalysisBundle`.
//!
//! Phase 1 asks the model to group posts into categories and describe how to
//! recognise each one. Phase 2 builds a design system per category, at most
//! three model calls in flight. Phase 3 assembles the bundle locally.
//!
//! `AppState` holds an `Arc<dyn DesignAnalyzer>`.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::analysis::models::Post;
use crate::analysis::prompts::{ANALYSIS_SYSTEM, CATEGORY_DETECTION_PROMPT, DESIGN_SYSTEM_PROMPT};
use crate::errors::AppError;
use crate::llm_client::prompts::DESCRIPTIVE_VALUES_INSTRUCTION;
use crate::llm_client::{ContentPart, LlmClient, LlmError, MessageContent};
use crate::selection::indicators::{IndicatorKey, KNOWN_INDICATOR_LABELS};
use crate::selection::models::{
    AnalysisBundle, AnalysisMetadata, CategoryDefinition, CategorySelectorData, SelectionLogic,
};

pub const FALLBACK_CATEGORY_ID: &str = "fallback_all_posts";
const MAX_CONCURRENT_CATEGORIES: usize = 3;
const DETECTION_CAPTION_CHARS: usize = 200;
const IMAGE_DOWNLOAD_RETRIES: u32 = 3;
const IMAGE_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);

static RE_HEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"#[0-9A-Fa-f]{3,8}").expect("valid regex"));
static RE_PERCENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+%").expect("valid regex"));
static RE_DEGREES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)-?\d+\s*(degrees?|deg|°)").expect("valid regex"));
static RE_PIXELS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\d+\s*px").expect("valid regex"));

// ────────────────────────────────────────────────────────────────────────────
// Trait definition
// ────────────────────────────────────────────────────────────────────────────

#[async_trait]
pub trait DesignAnalyzer: Send + Sync {
    /// `posts` are newest first.
    async fn analyze(&self, posts: &[Post]) -> Result<AnalysisBundle, AppError>;
}

// ────────────────────────────────────────────────────────────────────────────
// Phase 1 output
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CategoryDetection {
    pub categories: Vec<DetectedCategory>,
    pub universal_elements: UniversalFlags,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DetectedCategory {
    pub category_id: String,
    pub category_name: String,
    pub category_description: String,
    /// 1-based post numbers.
    pub post_assignments: Vec<usize>,
    pub purpose: String,
    pub selection_keywords: Vec<String>,
    pub content_indicators: Vec<String>,
    /// color_palette_notes, logo_consistency, ...
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct UniversalFlags {
    pub canvas_consistent: bool,
    pub canvas_dimensions: Option<Value>,
    pub logo_position_consistent: bool,
    pub universal_logo_position: Option<String>,
    pub fonts_consistent: bool,
    pub universal_fonts: Vec<String>,
    pub brand_colors_present: bool,
    pub core_brand_colors: Vec<Value>,
}

impl CategoryDetection {
    /// Single catch-all category used when phase 1 output can't be parsed.
    pub fn fallback(post_count: usize) -> Self {
        CategoryDetection {
            categories: vec![DetectedCategory {
                category_id: FALLBACK_CATEGORY_ID.to_string(),
                category_name: "All Posts".to_string(),
                category_description:
                    "Failed to detect categories, treating all as one category".to_string(),
                post_assignments: (1..=post_count).collect(),
                purpose: "mixed".to_string(),
                ..Default::default()
            }],
            universal_elements: UniversalFlags::default(),
        }
    }

    /// Fills blank ids and drops post numbers outside `1..=post_count`.
    fn normalized(mut self, post_count: usize) -> Self {
        for (index, category) in self.categories.iter_mut().enumerate() {
            if category.category_id.trim().is_empty() {
                category.category_id = format!("category_{}", index + 1);
            }
            category
                .post_assignments
                .retain(|n| (1..=post_count).contains(n));
        }
        self
    }
}

// ────────────────────────────────────────────────────────────────────────────
// LlmDesignAnalyzer
// ────────────────────────────────────────────────────────────────────────────

pub struct LlmDesignAnalyzer {
    llm: LlmClient,
    http: Client,
    max_images_per_post: usize,
}

impl LlmDesignAnalyzer {
    pub fn new(llm: LlmClient, max_images_per_post: usize) -> Result<Self, AppError> {
        let http = Client::builder()
            .timeout(IMAGE_DOWNLOAD_TIMEOUT)
            .build()
            .map_err(|e| AppError::Internal(e.into()))?;
        Ok(Self {
            llm,
            http,
            max_images_per_post,
        })
    }

    async fn detect_categories(&self, posts: &[Post]) -> Result<CategoryDetection, AppError> {
        let prompt = CATEGORY_DETECTION_PROMPT
            .replace("{post_count}", &posts.len().to_string())
            .replace("{indicator_labels}", &KNOWN_INDICATOR_LABELS.join(", "))
            .replace(
                "{posts_json}",
                &posts_summary(posts, Some(DETECTION_CAPTION_CHARS)),
            );

        let images = download_post_images(&self.http, posts, self.max_images_per_post).await;
        if images.is_empty() {
            return Err(AppError::ImageService(
                "No images could be downloaded for category detection".to_string(),
            ));
        }
        info!("Phase 1: detecting categories from {} images", images.len());

        let content = multimodal_content(prompt, images);
        match self
            .llm
            .call_json::<CategoryDetection>(ANALYSIS_SYSTEM, &content)
            .await
        {
            Ok(detection) if !detection.categories.is_empty() => {
                Ok(detection.normalized(posts.len()))
            }
            Ok(_) => {
                warn!("Category detection returned no categories, using a single category");
                Ok(CategoryDetection::fallback(posts.len()))
            }
            Err(LlmError::Parse(e)) => {
                warn!("Could not parse category detection output: {e}");
                Ok(CategoryDetection::fallback(posts.len()))
            }
            Err(e) => Err(AppError::Llm(format!("Category detection failed: {e}"))),
        }
    }

    /// Runs phase 2 for every category. Results come back in detection order;
    /// a failed category carries its error message instead of a design.
    async fn analyze_categories(
        &self,
        posts: &[Post],
        detection: &CategoryDetection,
    ) -> Result<Vec<Result<Map<String, Value>, String>>, AppError> {
        let semaphore = Arc::new(Semaphore::new(MAX_CONCURRENT_CATEGORIES));
        let mut tasks = JoinSet::new();

        for (index, category) in detection.categories.iter().enumerate() {
            let category_posts: Vec<Post> = category
                .post_assignments
                .iter()
                .map(|n| posts[n - 1].clone())
                .collect();
            let category = category.clone();
            let llm = self.llm.clone();
            let http = self.http.clone();
            let semaphore = semaphore.clone();
            let max_images = self.max_images_per_post;

            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                let result =
                    analyze_category(&llm, &http, &category_posts, &category, max_images).await;
                (index, result)
            });
        }

        let mut results: Vec<Option<Result<Map<String, Value>, String>>> =
            vec![None; detection.categories.len()];
        while let Some(joined) = tasks.join_next().await {
            let (index, result) = joined.map_err(|e| AppError::Internal(e.into()))?;
            let name = &detection.categories[index].category_name;
            match &result {
                Ok(_) => info!("Completed analysis for category '{}'", name),
                Err(e) => warn!("Analysis failed for category '{}': {}", name, e),
            }
            results[index] = Some(result);
        }

        Ok(results
            .into_iter()
            .map(|r| r.unwrap_or_else(|| Err("Analysis task did not complete".to_string())))
            .collect())
    }
}

#[async_trait]
impl DesignAnalyzer for LlmDesignAnalyzer {
    async fn analyze(&self, posts: &[Post]) -> Result<AnalysisBundle, AppError> {
        if posts.is_empty() {
            return Err(AppError::Validation("No posts to analyze".to_string()));
        }

        let detection = self.detect_categories(posts).await?;
        info!(
            "Detected {} categories: {}",
            detection.categories.len(),
            detection
                .categories
                .iter()
                .map(|c| format!("{} ({} posts)", c.category_name, c.post_assignments.len()))
                .collect::<Vec<_>>()
                .join(", ")
        );

        let designs = self.analyze_categories(posts, &detection).await?;
        Ok(assemble_bundle(&detection, designs, posts.len()))
    }
}

async fn analyze_category(
    llm: &LlmClient,
    http: &Client,
    posts: &[Post],
    category: &DetectedCategory,
    max_images: usize,
) -> Result<Map<String, Value>, String> {
    let prompt = DESIGN_SYSTEM_PROMPT
        .replace("{category_name}", &category.category_name)
        .replace("{category_description}", &category.category_description)
        .replace("{descriptive_values}", DESCRIPTIVE_VALUES_INSTRUCTION)
        .replace("{posts_json}", &posts_summary(posts, None));

    let images = download_post_images(http, posts, max_images).await;
    if images.is_empty() {
        return Err(format!(
            "No images could be downloaded for category '{}'",
            category.category_name
        ));
    }
    debug!(
        "Phase 2: '{}' with {} posts, {} images",
        category.category_name,
        posts.len(),
        images.len()
    );

    let design: Map<String, Value> = llm
        .call_json(ANALYSIS_SYSTEM, &multimodal_content(prompt, images))
        .await
        .map_err(|e| e.to_string())?;

    let issues = prompt_template_issues(&design);
    if !issues.is_empty() {
        warn!(
            "prompt_template for '{}' contains raw values: {}",
            category.category_name,
            issues.join(", ")
        );
    }
    Ok(design)
}

// ────────────────────────────────────────────────────────────────────────────
// Request building
// ────────────────────────────────────────────────────────────────────────────

fn multimodal_content(prompt: String, images: Vec<String>) -> MessageContent {
    let mut parts = Vec::with_capacity(images.len() + 1);
    parts.push(ContentPart::text(prompt));
    parts.extend(images.into_iter().map(ContentPart::image));
    MessageContent::Parts(parts)
}

/// Post metadata sent alongside the images, numbered from 1 (newest).
pub fn posts_summary(posts: &[Post], caption_chars: Option<usize>) -> String {
    let summary: Vec<Value> = posts
        .iter()
        .enumerate()
        .map(|(i, post)| {
            let caption = post.caption.as_deref().unwrap_or("N/A");
            let caption: String = match caption_chars {
                Some(limit) => caption.chars().take(limit).collect(),
                None => caption.to_string(),
            };
            json!({
                "post_number": i + 1,
                "is_newest": i == 0,
                "url": post.url.as_deref().unwrap_or("N/A"),
                "caption": caption,
                "type": post.post_type.as_deref().unwrap_or("N/A"),
                "timestamp": post.timestamp.as_deref().unwrap_or("N/A"),
            })
        })
        .collect();
    serde_json::to_string_pretty(&summary).unwrap_or_default()
}

async fn download_post_images(http: &Client, posts: &[Post], max_images: usize) -> Vec<String> {
    let urls: Vec<String> = posts
        .iter()
        .flat_map(|p| p.image_urls(max_images))
        .collect();

    let mut images = Vec::with_capacity(urls.len());
    for url in &urls {
        match download_image_data_url(http, url).await {
            Some(data_url) => images.push(data_url),
            None => warn!("Skipping image {} (download failed)", url),
        }
    }
    debug!("Downloaded {}/{} images", images.len(), urls.len());
    images
}

/// Fetches an image as a `data:` URL. Transport errors are retried with a
/// linear backoff; a non-success status gives up immediately.
async fn download_image_data_url(http: &Client, url: &str) -> Option<String> {
    for attempt in 0..IMAGE_DOWNLOAD_RETRIES {
        match http.get(url).send().await {
            Ok(response) if response.status().is_success() => {
                let mime = response
                    .headers()
                    .get(reqwest::header::CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .filter(|v| v.starts_with("image/"))
                    .unwrap_or("image/jpeg")
                    .to_string();
                let bytes = response.bytes().await.ok()?;
                return Some(format!("data:{mime};base64,{}", STANDARD.encode(&bytes)));
            }
            Ok(response) => {
                debug!("Image {} returned {}", url, response.status());
                return None;
            }
            Err(e) if attempt + 1 < IMAGE_DOWNLOAD_RETRIES => {
                let wait = Duration::from_secs(2 * u64::from(attempt + 1));
                debug!("Image download failed ({e}), retrying in {}s", wait.as_secs());
                tokio::time::sleep(wait).await;
            }
            Err(e) => {
                warn!("Image download failed after {IMAGE_DOWNLOAD_RETRIES} attempts: {e}");
            }
        }
    }
    None
}

// ────────────────────────────────────────────────────────────────────────────
// Phase 3: assembly
// ────────────────────────────────────────────────────────────────────────────

pub fn assemble_bundle(
    detection: &CategoryDetection,
    designs: Vec<Result<Map<String, Value>, String>>,
    post_count: usize,
) -> AnalysisBundle {
    let categories: Vec<CategoryDefinition> = detection
        .categories
        .iter()
        .zip(designs)
        .map(|(detected, design)| category_definition(detected, design))
        .collect();

    let mut metadata_extra = Map::new();
    metadata_extra.insert("total_posts_analyzed".into(), json!(post_count));
    metadata_extra.insert("categories_detected".into(), json!(categories.len()));
    metadata_extra.insert("analysis_timestamp".into(), json!(Utc::now().to_rfc3339()));

    let mut extra = Map::new();
    extra.insert(
        "universal_design_elements".into(),
        universal_design_elements(&detection.universal_elements),
    );
    extra.insert(
        "cross_category_patterns".into(),
        cross_category_patterns(&categories),
    );

    AnalysisBundle {
        analysis_metadata: AnalysisMetadata {
            primary_category: primary_category_id(detection),
            recommended_category_for_generation: None,
            extra: metadata_extra,
        },
        categories,
        generation_category_selector: Some(build_selector(detection)),
        extra,
    }
}

/// The category holding post 1, else the first category.
pub fn primary_category_id(detection: &CategoryDetection) -> Option<String> {
    detection
        .categories
        .iter()
        .find(|c| c.post_assignments.contains(&1))
        .or_else(|| detection.categories.first())
        .map(|c| c.category_id.clone())
}

pub fn build_selector(detection: &CategoryDetection) -> CategorySelectorData {
    let mut selection_logic = BTreeMap::new();

    for category in &detection.categories {
        let mut keywords: Vec<String> = Vec::new();
        for keyword in &category.selection_keywords {
            let keyword = keyword.trim().to_lowercase();
            if !keyword.is_empty() && !keywords.contains(&keyword) {
                keywords.push(keyword);
            }
        }

        let (known, unknown): (Vec<&String>, Vec<&String>) = category
            .content_indicators
            .iter()
            .partition(|label| IndicatorKey::from_label(label).is_some());
        if !unknown.is_empty() {
            debug!(
                "Dropping unknown indicators for '{}': {:?}",
                category.category_id, unknown
            );
        }

        selection_logic.insert(
            category.category_id.clone(),
            SelectionLogic {
                keywords,
                content_indicators: known.into_iter().map(|l| l.to_lowercase()).collect(),
                purpose: category.purpose.to_lowercase(),
            },
        );
    }

    CategorySelectorData {
        available_categories: detection
            .categories
            .iter()
            .map(|c| c.category_id.clone())
            .collect(),
        selection_logic,
    }
}

fn category_definition(
    detected: &DetectedCategory,
    design: Result<Map<String, Value>, String>,
) -> CategoryDefinition {
    let mut design = design.unwrap_or_else(|error| {
        let mut failed = Map::new();
        failed.insert("error".into(), json!(error));
        failed.insert("note".into(), json!("Analysis failed for this category"));
        failed
    });

    // The model's own fields win over phase-1 notes.
    for (key, value) in &detected.extra {
        design.entry(key.clone()).or_insert_with(|| value.clone());
    }
    design.insert("posts_included".into(), json!(detected.post_assignments));
    design.insert("post_count".into(), json!(detected.post_assignments.len()));

    CategoryDefinition {
        category_id: Some(detected.category_id.clone()),
        category_name: Some(detected.category_name.clone()),
        category_description: Some(detected.category_description.clone()),
        purpose: Some(detected.purpose.clone()),
        design,
    }
}

pub fn universal_design_elements(flags: &UniversalFlags) -> Value {
    let mut result = Map::new();
    result.insert(
        "description".into(),
        json!("Design elements that are consistent across all posts, regardless of category"),
    );

    result.insert(
        "canvas".into(),
        if flags.canvas_consistent {
            let dims = flags.canvas_dimensions.clone().unwrap_or_else(|| json!({}));
            json!({
                "width": dims.get("width").cloned().unwrap_or(json!(1080)),
                "height": dims.get("height").cloned().unwrap_or(json!(1350)),
                "aspect_ratio": dims.get("aspect_ratio").cloned().unwrap_or(json!("4:5")),
                "note": "All posts use the same canvas dimensions",
            })
        } else {
            json!({"consistent": false, "note": "Canvas dimensions vary across posts"})
        },
    );

    if flags.fonts_consistent {
        result.insert(
            "typography".into(),
            json!({
                "universal_fonts": flags.universal_fonts,
                "note": "These fonts are used across all posts",
            }),
        );
    }

    if flags.logo_position_consistent {
        let position = flags.universal_logo_position.as_deref().unwrap_or("unknown");
        result.insert(
            "logo".into(),
            json!({
                "universal_position": position,
                "note": format!("Logo always appears in {position} across all posts"),
            }),
        );
    }

    if flags.brand_colors_present {
        result.insert(
            "brand_colors".into(),
            json!({
                "core_colors": flags.core_brand_colors,
                "note": "These brand colors appear in every post",
            }),
        );
    }

    result.insert(
        "note".into(),
        json!("When generating new posts, always include these universal elements unless instructed otherwise"),
    );
    Value::Object(result)
}

/// Compares design systems across categories. Failed categories contribute
/// nothing.
pub fn cross_category_patterns(categories: &[CategoryDefinition]) -> Value {
    if categories.is_empty() {
        return json!({});
    }

    let logo_positions: BTreeSet<&str> = categories
        .iter()
        .filter_map(|c| {
            design_path(&c.design, "consistency_tracking/logo_placement/primary_position")
                .and_then(Value::as_str)
        })
        .collect();
    let logo_positions: Vec<&str> = logo_positions.into_iter().collect();
    let logo_consistency = match logo_positions.len() {
        0 => "Unknown - no logo data available".to_string(),
        1 => format!(
            "CONSISTENT - logo always {} across all posts",
            logo_positions[0]
        ),
        2 => format!(
            "MOSTLY CONSISTENT - logo typically in {}",
            logo_positions.join(" or ")
        ),
        _ => format!(
            "VARIABLE - logo varies by category ({})",
            logo_positions.join(", ")
        ),
    };

    let fonts: BTreeSet<&str> = categories
        .iter()
        .filter_map(|c| design_path(&c.design, "design_system/typography"))
        .filter_map(Value::as_object)
        .flat_map(|styles| styles.values())
        .filter_map(|style| style.get("font_family").and_then(Value::as_str))
        .collect();
    let font_consistency = if fonts.is_empty() {
        "Unknown - no font data available".to_string()
    } else {
        format!(
            "{} used across categories",
            fonts.into_iter().collect::<Vec<_>>().join(", ")
        )
    };

    let canvas_sizes: BTreeSet<String> = categories
        .iter()
        .filter_map(|c| design_path(&c.design, "design_system/canvas"))
        .map(|canvas| {
            let dim = |key: &str| {
                canvas
                    .get(key)
                    .map(|v| v.to_string())
                    .unwrap_or_else(|| "unknown".to_string())
            };
            format!("{}x{}", dim("width"), dim("height"))
        })
        .collect();
    let canvas_consistency = if canvas_sizes.len() <= 1 {
        "CONSISTENT - All posts use same dimensions"
    } else {
        "VARIABLE - Multiple canvas sizes detected"
    };

    let carousel_usage = categories
        .iter()
        .map(|c| {
            let is_carousel = design_path(&c.design, "image_sequence/is_carousel")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            format!(
                "{}: {}",
                c.display_name(),
                if is_carousel { "carousel" } else { "single image" }
            )
        })
        .collect::<Vec<_>>()
        .join(", ");

    json!({
        "global_logo_consistency": logo_consistency,
        "font_consistency": font_consistency,
        "canvas_consistency": canvas_consistency,
        "carousel_usage": carousel_usage,
    })
}

/// Slash-separated lookup into a design payload.
fn design_path<'a>(design: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let (first, rest) = path.split_once('/').unwrap_or((path, ""));
    let value = design.get(first)?;
    if rest.is_empty() {
        Some(value)
    } else {
        value.pointer(&format!("/{rest}"))
    }
}

/// Raw technical values in a prompt template tend to be drawn as literal
/// text by image models.
pub fn prompt_template_issues(design: &Map<String, Value>) -> Vec<&'static str> {
    let Some(template) = design.get("prompt_template").and_then(Value::as_str) else {
        return Vec::new();
    };

    let checks: [(&Lazy<Regex>, &'static str); 4] = [
        (&RE_HEX, "hex codes"),
        (&RE_PERCENT, "percentage values"),
        (&RE_DEGREES, "degree measurements"),
        (&RE_PIXELS, "pixel values"),
    ];
    checks
        .iter()
        .filter(|(re, _)| re.is_match(template))
        .map(|(_, issue)| *issue)
        .collect()
}
