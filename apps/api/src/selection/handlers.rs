use axum::{extract::State, Json};
use serde::Deserialize;

use crate::errors::AppError;
use crate::selection::models::AnalysisBundle;
use crate::selection::selector::{select_category_for_generation, SelectionResult};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct SelectCategoryRequest {
    #[serde(default)]
    pub user_text: String,
    /// Load the stored analysis for this handle.
    #[serde(default)]
    pub handle: Option<String>,
    /// Inline analysis; takes precedence over `handle`.
    #[serde(default)]
    pub analysis: Option<AnalysisBundle>,
}

/// POST /api/v1/categories/select
pub async fn handle_select_category(
    State(state): State<AppState>,
    Json(req): Json<SelectCategoryRequest>,
) -> Result<Json<SelectionResult>, AppError> {
    let analysis = match (req.analysis, req.handle.as_deref()) {
        (Some(bundle), _) => Some(bundle),
        (None, Some(handle)) => Some(state.store.load_bundle(handle).await?),
        (None, None) => None,
    };

    Ok(Json(select_category_for_generation(
        &req.user_text,
        analysis.as_ref(),
    )))
}
