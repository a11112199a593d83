//! Image generation and editing backends.
//!
//! First-pass generation goes through an image-capable chat model on
//! OpenRouter; edits of an existing canvas go to a Replicate prediction.
//! Both are carried in `AppState` as trait objects.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::canvas::prompts::{editing_prompt, is_region_edit, GENERATION_INSTRUCTION};
use crate::canvas::storage::file_to_data_url;
use crate::errors::AppError;
use crate::llm_client::{LlmClient, MessageContent, ResponseMessage, IMAGE_MODEL};

pub const DEFAULT_EDIT_MODEL: &str = "prunaai/p-image-edit";
const REPLICATE_API_URL: &str = "https://api.replicate.com/v1";
/// Nominal; the chat model doesn't report image cost.
const GENERATION_COST: f64 = 0.005;
const EDIT_COST: f64 = 0.01;
const PREDICTION_POLL_INTERVAL: Duration = Duration::from_secs(1);
const MAX_PREDICTION_POLLS: u32 = 120;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
/// Bare URLs are only trusted in short replies.
const BARE_URL_MAX_CONTENT_CHARS: usize = 1000;

static RE_MARKDOWN_IMAGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"!\[.*?\]\((https?://[^)]+)\)").expect("valid regex"));
static RE_MARKDOWN_LINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[.*?\]\((https?://[^)]+)\)").expect("valid regex"));
static RE_IMAGE_EXTENSION_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(https?://[^\s)]+\.(?:jpg|jpeg|png|webp))").expect("valid regex")
});
static RE_GOOGLE_CONTENT_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(https?://[a-zA-Z0-9-]+\.googleusercontent\.com/[^\s)]+)").expect("valid regex")
});
static RE_ANY_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(https?://[^\s)"]+)"#).expect("valid regex"));

/// Output of a generation or edit call.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedImage {
    /// Remote URL or `data:` URL.
    pub reference: String,
    /// Estimated USD cost of the call.
    pub cost: f64,
}

// ────────────────────────────────────────────────────────────────────────────
// Trait definitions
// ────────────────────────────────────────────────────────────────────────────

#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<GeneratedImage, AppError>;
}

#[async_trait]
pub trait ImageEditor: Send + Sync {
    /// Edits the image at `image_path` following `prompt`.
    async fn edit(&self, prompt: &str, image_path: &Path) -> Result<GeneratedImage, AppError>;
}

// ────────────────────────────────────────────────────────────────────────────
// OpenRouterImageGenerator
// ────────────────────────────────────────────────────────────────────────────

pub struct OpenRouterImageGenerator {
    llm: LlmClient,
}

impl OpenRouterImageGenerator {
    pub fn new(llm: LlmClient) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl ImageGenerator for OpenRouterImageGenerator {
    async fn generate(&self, prompt: &str) -> Result<GeneratedImage, AppError> {
        let content = MessageContent::Text(format!("{GENERATION_INSTRUCTION}{prompt}"));
        let response = self
            .llm
            .call(IMAGE_MODEL, None, &content)
            .await
            .map_err(|e| AppError::ImageService(format!("Image generation call failed: {e}")))?;

        let message = response
            .message()
            .ok_or_else(|| AppError::ImageService("No choices returned".to_string()))?;

        let reference = extract_image_reference(message).ok_or_else(|| {
            let preview: String = message
                .content
                .as_deref()
                .unwrap_or_default()
                .chars()
                .take(200)
                .collect();
            AppError::ImageService(format!("Could not find image in response: {preview}"))
        })?;

        info!("Generated image via {}", IMAGE_MODEL);
        Ok(GeneratedImage {
            reference,
            cost: GENERATION_COST,
        })
    }
}

/// Finds the generated image in a chat reply: the `images` field first, then
/// URLs in the text from most to least specific.
pub fn extract_image_reference(message: &ResponseMessage) -> Option<String> {
    if let Some(image) = message.images.first() {
        return Some(image.image_url.url.clone());
    }

    let content = message.content.as_deref().unwrap_or_default();
    let patterns: [&Lazy<Regex>; 4] = [
        &RE_MARKDOWN_IMAGE,
        &RE_MARKDOWN_LINK,
        &RE_IMAGE_EXTENSION_URL,
        &RE_GOOGLE_CONTENT_URL,
    ];
    for pattern in patterns {
        if let Some(caps) = pattern.captures(content) {
            return Some(caps[1].to_string());
        }
    }

    if content.chars().count() < BARE_URL_MAX_CONTENT_CHARS {
        if let Some(caps) = RE_ANY_URL.captures(content) {
            return Some(caps[1].to_string());
        }
    }
    None
}

// ────────────────────────────────────────────────────────────────────────────
// ReplicateImageEditor
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ReplicateError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Prediction {id} {status}: {message}")]
    PredictionFailed {
        id: String,
        status: String,
        message: String,
    },

    #[error("Prediction {id} still {status} after {polls} polls")]
    Timeout { id: String, status: String, polls: u32 },

    #[error("Prediction {0} returned no output")]
    EmptyOutput(String),
}

impl From<ReplicateError> for AppError {
    fn from(e: ReplicateError) -> Self {
        AppError::ImageService(e.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct Prediction {
    id: String,
    status: String,
    #[serde(default)]
    output: Option<PredictionOutput>,
    #[serde(default)]
    error: Option<Value>,
    #[serde(default)]
    urls: Option<PredictionUrls>,
}

#[derive(Debug, Deserialize)]
struct PredictionUrls {
    #[serde(default)]
    get: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PredictionOutput {
    Single(String),
    Many(Vec<String>),
}

impl PredictionOutput {
    fn first(self) -> Option<String> {
        match self {
            PredictionOutput::Single(url) => Some(url),
            PredictionOutput::Many(urls) => urls.into_iter().next(),
        }
    }
}

impl Prediction {
    fn is_terminal(&self) -> bool {
        matches!(self.status.as_str(), "succeeded" | "failed" | "canceled")
    }
}

pub struct ReplicateImageEditor {
    client: Client,
    api_token: String,
    model: String,
}

impl ReplicateImageEditor {
    pub fn new(api_token: String) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| AppError::Internal(e.into()))?;
        Ok(Self {
            client,
            api_token,
            model: DEFAULT_EDIT_MODEL.to_string(),
        })
    }

    async fn create_prediction(&self, input: &Value) -> Result<Prediction, ReplicateError> {
        let response = self
            .client
            .post(format!("{REPLICATE_API_URL}/models/{}/predictions", self.model))
            .bearer_auth(&self.api_token)
            .header("Prefer", "wait")
            .json(&json!({ "input": input }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ReplicateError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response.json().await?)
    }

    async fn wait_for(&self, mut prediction: Prediction) -> Result<Prediction, ReplicateError> {
        let mut polls = 0;
        while !prediction.is_terminal() {
            if polls >= MAX_PREDICTION_POLLS {
                return Err(ReplicateError::Timeout {
                    id: prediction.id,
                    status: prediction.status,
                    polls,
                });
            }
            let get_url = prediction
                .urls
                .as_ref()
                .and_then(|u| u.get.clone())
                .unwrap_or_else(|| format!("{REPLICATE_API_URL}/predictions/{}", prediction.id));

            tokio::time::sleep(PREDICTION_POLL_INTERVAL).await;
            polls += 1;
            debug!("Polling prediction {} ({})", prediction.id, prediction.status);
            prediction = self
                .client
                .get(&get_url)
                .bearer_auth(&self.api_token)
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;
        }
        Ok(prediction)
    }

    async fn run(&self, prompt: &str, image_path: &Path) -> Result<GeneratedImage, AppError> {
        if !tokio::fs::try_exists(image_path).await.unwrap_or(false) {
            return Err(AppError::ImageService(format!(
                "Input image file not found: {}",
                image_path.display()
            )));
        }

        let input = edit_input(prompt, file_to_data_url(image_path).await?);
        let prediction = self.create_prediction(&input).await?;
        let prediction = self.wait_for(prediction).await?;

        if prediction.status != "succeeded" {
            let message = prediction
                .error
                .map(|e| match e {
                    Value::String(s) => s,
                    other => other.to_string(),
                })
                .unwrap_or_else(|| "no error message".to_string());
            warn!("Prediction {} {}: {}", prediction.id, prediction.status, message);
            return Err(ReplicateError::PredictionFailed {
                id: prediction.id,
                status: prediction.status,
                message,
            }
            .into());
        }

        let id = prediction.id;
        let reference = prediction
            .output
            .and_then(PredictionOutput::first)
            .ok_or(ReplicateError::EmptyOutput(id))?;

        Ok(GeneratedImage {
            reference,
            cost: EDIT_COST,
        })
    }
}

#[async_trait]
impl ImageEditor for ReplicateImageEditor {
    async fn edit(&self, prompt: &str, image_path: &Path) -> Result<GeneratedImage, AppError> {
        self.run(prompt, image_path).await
    }
}

/// Prediction input for an edit. Region edits trade speed for precision.
fn edit_input(prompt: &str, image_data_url: String) -> Value {
    json!({
        "prompt": editing_prompt(prompt),
        "turbo": !is_region_edit(prompt),
        "aspect_ratio": "match_input_image",
        "images": [image_data_url],
    })
}
