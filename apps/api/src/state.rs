use std::sync::Arc;

use crate::analysis::analyzer::DesignAnalyzer;
use crate::analysis::scraper::PostScraper;
use crate::analysis::store::HandleStore;
use crate::canvas::images::{ImageEditor, ImageGenerator};
use crate::canvas::session::SessionStore;
use crate::canvas::storage::ImageStorage;
use crate::config::Config;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    /// Per-handle raw posts and analysis files under DATA_DIR.
    pub store: HandleStore,
    /// Uploaded and generated images under UPLOAD_DIR.
    pub images: ImageStorage,
    pub sessions: SessionStore,
    /// Pluggable collaborators. Production wires Apify, OpenRouter and Replicate;
    /// tests swap in fakes.
    pub scraper: Arc<dyn PostScraper>,
    pub analyzer: Arc<dyn DesignAnalyzer>,
    pub generator: Arc<dyn ImageGenerator>,
    pub editor: Arc<dyn ImageEditor>,
}
