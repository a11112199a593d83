mod analysis;
mod canvas;
mod config;
mod errors;
mod llm_client;
mod routes;
mod selection;
mod state;

use anyhow::Result;
use std::net::SocketAddr;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use std::sync::Arc;

use crate::analysis::analyzer::LlmDesignAnalyzer;
use crate::analysis::scraper::ApifyScraper;
use crate::analysis::store::HandleStore;
use crate::canvas::images::{OpenRouterImageGenerator, ReplicateImageEditor};
use crate::canvas::session::SessionStore;
use crate::canvas::storage::ImageStorage;
use crate::config::Config;
use crate::llm_client::LlmClient;
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting BrandCanvas API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize LLM client
    let llm = LlmClient::new(config.openrouter_api_key.clone())?;
    info!(
        "LLM client initialized (analysis: {}, image: {})",
        llm_client::ANALYSIS_MODEL,
        llm_client::IMAGE_MODEL
    );

    let scraper = Arc::new(ApifyScraper::new(
        config.apify_api_key.clone(),
        config.apify_actor_id.clone(),
        config.max_posts,
        config.max_images_per_post,
    ));
    let analyzer = Arc::new(LlmDesignAnalyzer::new(
        llm.clone(),
        config.max_images_per_post,
    )?);
    let generator = Arc::new(OpenRouterImageGenerator::new(llm));
    let editor = Arc::new(ReplicateImageEditor::new(
        config.replicate_api_token.clone(),
    )?);

    tokio::fs::create_dir_all(&config.data_dir).await?;
    tokio::fs::create_dir_all(&config.upload_dir).await?;
    info!(
        "Data dir: {}, upload dir: {}",
        config.data_dir.display(),
        config.upload_dir.display()
    );

    // Build app state
    let state = AppState {
        store: HandleStore::new(&config.data_dir),
        images: ImageStorage::new(&config.upload_dir)?,
        sessions: SessionStore::new(),
        scraper,
        analyzer,
        generator,
        editor,
        config: config.clone(),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
