//! Post scraping through an Apify actor run.
//!
//! `AppState` holds an `Arc<dyn PostScraper>` so handlers and tests never
//! touch the network directly.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info};

use crate::analysis::models::Post;
use crate::errors::AppError;

const APIFY_API_URL: &str = "https://api.apify.com/v2";
const POLL_INTERVAL: Duration = Duration::from_secs(5);
/// 10 minutes at the default interval.
const MAX_POLLS: u32 = 120;

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Failed to start actor (status {status}): {body}")]
    StartFailed { status: u16, body: String },

    #[error("Actor run finished with status {0}")]
    RunFailed(String),

    #[error("Actor run still {status} after {polls} polls")]
    Timeout { status: String, polls: u32 },

    #[error("Failed to fetch dataset (status {status}): {body}")]
    DatasetFailed { status: u16, body: String },
}

impl From<ScrapeError> for AppError {
    fn from(e: ScrapeError) -> Self {
        AppError::Scrape(e.to_string())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Trait definition
// ────────────────────────────────────────────────────────────────────────────

#[async_trait]
pub trait PostScraper: Send + Sync {
    /// Returns the most recent posts for `username`, newest first.
    async fn scrape(&self, username: &str) -> Result<Vec<Post>, AppError>;
}

/// Trims whitespace and a leading `@`. Empty handles are rejected.
pub fn normalize_username(raw: &str) -> Result<String, AppError> {
    let username = raw.trim().trim_start_matches('@').trim();
    if username.is_empty() {
        return Err(AppError::Validation("Username is required".to_string()));
    }
    Ok(username.to_string())
}

pub fn profile_url(username: &str) -> String {
    format!("https://www.instagram.com/{username}/")
}

// ────────────────────────────────────────────────────────────────────────────
// ApifyScraper
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct RunEnvelope {
    data: RunData,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RunData {
    id: String,
    #[serde(default)]
    default_dataset_id: Option<String>,
    status: String,
}

fn is_terminal(status: &str) -> bool {
    matches!(status, "SUCCEEDED" | "FAILED" | "ABORTED" | "TIMED-OUT")
}

pub struct ApifyScraper {
    client: Client,
    api_key: String,
    actor_id: String,
    max_posts: usize,
    max_images_per_post: usize,
    poll_interval: Duration,
    max_polls: u32,
}

impl ApifyScraper {
    pub fn new(
        api_key: String,
        actor_id: String,
        max_posts: usize,
        max_images_per_post: usize,
    ) -> Self {
        Self {
            client: Client::new(),
            api_key,
            actor_id,
            max_posts,
            max_images_per_post,
            poll_interval: POLL_INTERVAL,
            max_polls: MAX_POLLS,
        }
    }

    async fn start_run(&self, username: &str) -> Result<RunData, ScrapeError> {
        let actor_input = json!({
            "directUrls": [profile_url(username)],
            "resultsType": "posts",
            "resultsLimit": self.max_posts,
            "addParentData": false,
        });

        let response = self
            .client
            .post(format!("{APIFY_API_URL}/acts/{}/runs", self.actor_id))
            .query(&[("token", &self.api_key)])
            .json(&actor_input)
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::CREATED {
            let body = response.text().await.unwrap_or_default();
            return Err(ScrapeError::StartFailed {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json::<RunEnvelope>().await?.data)
    }

    async fn wait_for_run(&self, run_id: &str) -> Result<RunData, ScrapeError> {
        let status_url = format!("{APIFY_API_URL}/acts/{}/runs/{run_id}", self.actor_id);
        let mut last_status = String::from("UNKNOWN");

        for _ in 0..self.max_polls {
            let run = self
                .client
                .get(&status_url)
                .query(&[("token", &self.api_key)])
                .send()
                .await?
                .json::<RunEnvelope>()
                .await?
                .data;

            if is_terminal(&run.status) {
                info!("Actor run {} finished with status {}", run_id, run.status);
                return Ok(run);
            }

            debug!("Actor run {} status {}, waiting", run_id, run.status);
            last_status = run.status;
            tokio::time::sleep(self.poll_interval).await;
        }

        Err(ScrapeError::Timeout {
            status: last_status,
            polls: self.max_polls,
        })
    }

    async fn fetch_dataset(&self, dataset_id: &str) -> Result<Vec<Post>, ScrapeError> {
        let response = self
            .client
            .get(format!("{APIFY_API_URL}/datasets/{dataset_id}/items"))
            .query(&[("token", &self.api_key)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ScrapeError::DatasetFailed {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json().await?)
    }

    async fn run(&self, username: &str) -> Result<Vec<Post>, ScrapeError> {
        info!("Starting Apify actor for {}", profile_url(username));
        let started = self.start_run(username).await?;
        let finished = self.wait_for_run(&started.id).await?;

        if finished.status != "SUCCEEDED" {
            return Err(ScrapeError::RunFailed(finished.status));
        }

        let dataset_id = finished
            .default_dataset_id
            .or(started.default_dataset_id)
            .unwrap_or_default();
        let posts = self.fetch_dataset(&dataset_id).await?;
        info!("Retrieved {} posts for {}", posts.len(), username);

        Ok(limit_media(posts, self.max_images_per_post))
    }
}

#[async_trait]
impl PostScraper for ApifyScraper {
    async fn scrape(&self, username: &str) -> Result<Vec<Post>, AppError> {
        Ok(self.run(username).await?)
    }
}

fn limit_media(mut posts: Vec<Post>, max_images: usize) -> Vec<Post> {
    for post in &mut posts {
        post.truncate_media(max_images);
    }
    posts
}
