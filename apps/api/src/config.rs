use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result};

const DEFAULT_APIFY_ACTOR_ID: &str = "shu8hvrXbJbY3Eb9W";
const DEFAULT_MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

/// Application configuration loaded from environment variables.
/// Startup fails if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub openrouter_api_key: String,
    pub apify_api_key: String,
    pub apify_actor_id: String,
    pub replicate_api_token: String,
    /// Posts requested per scrape.
    pub max_posts: usize,
    pub max_images_per_post: usize,
    /// Per-handle analysis files live under here.
    pub data_dir: PathBuf,
    /// Uploaded and generated images; served at /uploads.
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            openrouter_api_key: require_env("OPENROUTER_API_KEY")?,
            apify_api_key: require_env("APIFY_API_KEY")?,
            apify_actor_id: std::env::var("APIFY_ACTOR_ID")
                .unwrap_or_else(|_| DEFAULT_APIFY_ACTOR_ID.to_string()),
            replicate_api_token: require_env("REPLICATE_API_TOKEN")?,
            max_posts: parse_env("MAX_POSTS", 5)?,
            max_images_per_post: parse_env("MAX_IMAGES_PER_POST", 10)?,
            data_dir: PathBuf::from(std::env::var("DATA_DIR").unwrap_or_else(|_| "data".into())),
            upload_dir: PathBuf::from(
                std::env::var("UPLOAD_DIR").unwrap_or_else(|_| "uploads".into()),
            ),
            max_upload_bytes: parse_env("MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?,
            port: parse_env("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} must be a valid number, got '{raw}'")),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_env_uses_default_when_unset() {
        let value: u16 = parse_env("BRANDCANVAS_TEST_UNSET_PORT", 8080).unwrap();
        assert_eq!(value, 8080);
    }

    #[test]
    fn test_require_env_names_the_missing_variable() {
        let err = require_env("BRANDCANVAS_TEST_MISSING_KEY").unwrap_err();
        assert!(err.to_string().contains("BRANDCANVAS_TEST_MISSING_KEY"));
    }
}
