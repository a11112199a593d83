use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::analysis::scraper::normalize_username;
use crate::analysis::store::{AnalysisFile, HandleSummary};
use crate::errors::AppError;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct HandleRequest {
    #[serde(default)]
    pub username: String,
}

#[derive(Serialize)]
pub struct HandleListResponse {
    pub handles: Vec<HandleSummary>,
}

#[derive(Serialize)]
pub struct AnalysisResponse {
    pub success: bool,
    pub handle: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub posts_count: Option<usize>,
    pub main_file: String,
    pub category_files: Vec<String>,
}

#[derive(Serialize)]
pub struct AnalysisFilesResponse {
    pub files: Vec<AnalysisFile>,
}

/// GET /api/v1/handles
pub async fn handle_list_handles(
    State(state): State<AppState>,
) -> Result<Json<HandleListResponse>, AppError> {
    let handles = state.store.list_handles().await?;
    Ok(Json(HandleListResponse { handles }))
}

/// POST /api/v1/handles/scrape
///
/// Scrapes fresh posts, stores them as raw.json, then runs the full analysis.
pub async fn handle_scrape(
    State(state): State<AppState>,
    Json(req): Json<HandleRequest>,
) -> Result<Json<AnalysisResponse>, AppError> {
    let handle = normalize_username(&req.username)?;

    let posts = state.scraper.scrape(&handle).await?;
    state.store.save_raw(&handle, &posts).await?;

    let bundle = state.analyzer.analyze(&posts).await?;
    let saved = state.store.save_analysis(&handle, &bundle).await?;
    info!("Scraped and analyzed {} ({} posts)", handle, posts.len());

    Ok(Json(AnalysisResponse {
        success: true,
        handle,
        posts_count: Some(posts.len()),
        main_file: saved.main_file,
        category_files: saved.category_files,
    }))
}

/// POST /api/v1/handles/analyze
///
/// Re-runs analysis on previously scraped posts.
pub async fn handle_analyze(
    State(state): State<AppState>,
    Json(req): Json<HandleRequest>,
) -> Result<Json<AnalysisResponse>, AppError> {
    let handle = normalize_username(&req.username)?;

    let posts = state.store.load_raw(&handle).await?;
    let bundle = state.analyzer.analyze(&posts).await?;
    let saved = state.store.save_analysis(&handle, &bundle).await?;

    Ok(Json(AnalysisResponse {
        success: true,
        handle,
        posts_count: None,
        main_file: saved.main_file,
        category_files: saved.category_files,
    }))
}

/// GET /api/v1/handles/:handle/files
pub async fn handle_analysis_files(
    State(state): State<AppState>,
    Path(handle): Path<String>,
) -> Result<Json<AnalysisFilesResponse>, AppError> {
    let files = state.store.analysis_files(&handle).await?;
    Ok(Json(AnalysisFilesResponse { files }))
}

/// GET /api/v1/handles/:handle/files/:filename
pub async fn handle_analysis_file(
    State(state): State<AppState>,
    Path((handle, filename)): Path<(String, String)>,
) -> Result<Json<Value>, AppError> {
    Ok(Json(state.store.read_file(&handle, &filename).await?))
}

/// GET /api/v1/handles/:handle/universal
pub async fn handle_universal_elements(
    State(state): State<AppState>,
    Path(handle): Path<String>,
) -> Result<Json<Value>, AppError> {
    Ok(Json(state.store.load_main(&handle).await?))
}
