pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::services::ServeDir;

use crate::analysis::handlers as analysis;
use crate::canvas::handlers as canvas;
use crate::canvas::storage::UPLOADS_ROUTE;
use crate::selection::handlers as selection;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    let uploads = ServeDir::new(state.images.dir());
    let body_limit = state.config.max_upload_bytes;

    Router::new()
        .route("/health", get(health::health_handler))
        // Handles: scrape, analyze, browse stored analysis
        .route("/api/v1/handles", get(analysis::handle_list_handles))
        .route("/api/v1/handles/scrape", post(analysis::handle_scrape))
        .route("/api/v1/handles/analyze", post(analysis::handle_analyze))
        .route(
            "/api/v1/handles/:handle/files",
            get(analysis::handle_analysis_files),
        )
        .route(
            "/api/v1/handles/:handle/files/:filename",
            get(analysis::handle_analysis_file),
        )
        .route(
            "/api/v1/handles/:handle/universal",
            get(analysis::handle_universal_elements),
        )
        // Category selection
        .route(
            "/api/v1/categories/select",
            post(selection::handle_select_category),
        )
        // Canvas
        .route("/api/v1/canvas/upload", post(canvas::handle_upload))
        .route("/api/v1/canvas/process", post(canvas::handle_process))
        .route("/api/v1/canvas/:session_id", get(canvas::handle_session_state))
        .route("/api/v1/canvas/:session_id/reset", post(canvas::handle_reset))
        .nest_service(UPLOADS_ROUTE, uploads)
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}
