use axum::{
    extract::{Multipart, Path, State},
    Json,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::canvas::prompts::{extract_user_prompt, generation_prompt};
use crate::canvas::session::{CanvasSession, HistoryEntry};
use crate::canvas::storage::{is_remote_url, StoredImage};
use crate::errors::AppError;
use crate::selection::selector::{select_category_for_generation, SelectionResult};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct ProcessRequest {
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub session_id: Option<Uuid>,
    /// Used to auto-select a category design when `analysis_json` is absent.
    #[serde(default)]
    pub handle: Option<String>,
    /// Universal design elements (main.json).
    #[serde(default)]
    pub main_json: Option<Value>,
    /// Category design system.
    #[serde(default)]
    pub analysis_json: Option<Value>,
}

#[derive(Serialize)]
pub struct UploadResponse {
    pub success: bool,
    pub session_id: Uuid,
    pub image_url: String,
    pub history: Vec<HistoryEntry>,
}

#[derive(Serialize)]
pub struct ProcessResponse {
    pub success: bool,
    pub session_id: Uuid,
    pub image_url: String,
    pub history: Vec<HistoryEntry>,
    pub total_cost: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_selection: Option<SelectionResult>,
}

#[derive(Serialize)]
pub struct SessionStateResponse {
    pub has_session: bool,
    pub image_url: Option<String>,
    pub history: Vec<HistoryEntry>,
    pub total_cost: f64,
}

impl From<CanvasSession> for SessionStateResponse {
    fn from(session: CanvasSession) -> Self {
        Self {
            has_session: session.has_history(),
            image_url: session.current_image_url,
            history: session.history,
            total_cost: round4(session.total_cost),
        }
    }
}

#[derive(Serialize)]
pub struct ResetResponse {
    pub success: bool,
}

/// POST /api/v1/canvas/upload
///
/// Multipart form: `image` (required file), `session_id` (optional).
pub async fn handle_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let mut session_id: Option<Uuid> = None;
    let mut upload: Option<(String, Bytes)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Invalid multipart body: {e}")))?
    {
        match field.name() {
            Some("image") => {
                let name = field.file_name().unwrap_or_default().to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::Validation(format!("Failed to read upload: {e}")))?;
                upload = Some((name, bytes));
            }
            Some("session_id") => {
                let raw = field
                    .text()
                    .await
                    .map_err(|e| AppError::Validation(format!("Invalid session_id: {e}")))?;
                session_id = Some(
                    Uuid::parse_str(raw.trim())
                        .map_err(|_| AppError::Validation("Invalid session_id".to_string()))?,
                );
            }
            _ => {}
        }
    }

    let (original_name, bytes) =
        upload.ok_or_else(|| AppError::Validation("No image file provided".to_string()))?;
    if original_name.is_empty() {
        return Err(AppError::Validation("No image selected".to_string()));
    }

    let stored = state.images.save_upload(&original_name, &bytes).await?;
    let (session_id, session) = state
        .sessions
        .start_with_upload(session_id, stored.clone(), &original_name)
        .await;
    info!("Session {} started from upload {}", session_id, original_name);

    Ok(Json(UploadResponse {
        success: true,
        session_id,
        image_url: stored.url,
        history: session.history,
    }))
}

/// POST /api/v1/canvas/process
///
/// Edits the session's current image when one exists on disk, otherwise
/// generates a new image with the design context attached.
pub async fn handle_process(
    State(state): State<AppState>,
    Json(req): Json<ProcessRequest>,
) -> Result<Json<ProcessResponse>, AppError> {
    if req.prompt.trim().is_empty() {
        return Err(AppError::Validation("Prompt is required".to_string()));
    }

    let session_id = req.session_id.unwrap_or_else(Uuid::new_v4);
    let session = state.sessions.get(session_id).await;

    let editable = match session.current_image_path.as_deref() {
        Some(path) => tokio::fs::try_exists(path)
            .await
            .unwrap_or(false)
            .then(|| path.to_path_buf()),
        None => None,
    };

    let mut category_selection = None;
    let generated = match editable {
        Some(path) => state.editor.edit(&req.prompt, &path).await?,
        None => {
            let (main_json, analysis_json, selection) = design_context(&state, &req).await?;
            category_selection = selection;
            let prompt = generation_prompt(&req.prompt, main_json.as_ref(), analysis_json.as_ref());
            state.generator.generate(&prompt).await?
        }
    };

    let stored = match state.images.persist(&generated.reference).await {
        Ok(stored) => stored,
        Err(e) if is_remote_url(&generated.reference) => {
            warn!("Keeping remote image URL, download failed: {e}");
            StoredImage::remote(generated.reference.clone())
        }
        Err(e) => return Err(e),
    };

    let session = state
        .sessions
        .record_result(
            session_id,
            stored,
            generated.cost,
            extract_user_prompt(&req.prompt),
        )
        .await;

    Ok(Json(ProcessResponse {
        success: true,
        session_id,
        image_url: session.current_image_url.clone().unwrap_or_default(),
        history: session.history,
        total_cost: round4(session.total_cost),
        category_selection,
    }))
}

/// GET /api/v1/canvas/:session_id
pub async fn handle_session_state(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Json<SessionStateResponse> {
    Json(state.sessions.get(session_id).await.into())
}

/// POST /api/v1/canvas/:session_id/reset
pub async fn handle_reset(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Json<ResetResponse> {
    state.sessions.reset(session_id).await;
    Json(ResetResponse { success: true })
}

/// Design context for first-pass generation. Explicit JSON from the request
/// wins; otherwise, given a handle, the stored analysis is loaded and the
/// category is chosen from the prompt text.
async fn design_context(
    state: &AppState,
    req: &ProcessRequest,
) -> Result<(Option<Value>, Option<Value>, Option<SelectionResult>), AppError> {
    let Some(handle) = req.handle.as_deref().filter(|_| req.analysis_json.is_none()) else {
        return Ok((req.main_json.clone(), req.analysis_json.clone(), None));
    };

    let bundle = state.store.load_bundle(handle).await?;
    let selection = select_category_for_generation(&req.prompt, Some(&bundle));
    info!(
        "Auto-selected category {:?} for {} (confidence {})",
        selection.selected_category_id, handle, selection.confidence_score
    );

    let main_json = match &req.main_json {
        Some(main) => Some(main.clone()),
        None => bundle.extra.get("universal_design_elements").cloned(),
    };
    let analysis_json = selection
        .category_data
        .as_ref()
        .map(serde_json::to_value)
        .transpose()
        .map_err(|e| AppError::Internal(e.into()))?;

    Ok((main_json, analysis_json, Some(selection)))
}

fn round4(x: f64) -> f64 {
    (x * 10_000.0).round() / 10_000.0
}
