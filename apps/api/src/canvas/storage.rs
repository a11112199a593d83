//! Local image storage under `UPLOAD_DIR`, served at `/uploads`.
//!
//! Generated images arrive as data URLs or short-lived remote URLs; both are
//! written to disk so later edits always have a local input file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Client;
use tracing::debug;
use uuid::Uuid;

use crate::errors::AppError;

pub const UPLOADS_ROUTE: &str = "/uploads";
pub const ALLOWED_UPLOAD_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp"];
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// An image the canvas can display. `path` is `None` only when a remote
/// image could not be downloaded.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredImage {
    pub path: Option<PathBuf>,
    pub url: String,
}

impl StoredImage {
    pub fn remote(url: impl Into<String>) -> Self {
        Self {
            path: None,
            url: url.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ImageStorage {
    dir: PathBuf,
    http: Client,
}

impl ImageStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, AppError> {
        let http = Client::builder()
            .timeout(DOWNLOAD_TIMEOUT)
            .build()
            .map_err(|e| AppError::Internal(e.into()))?;
        Ok(Self {
            dir: dir.into(),
            http,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Saves a user upload. Only JPG, PNG and WEBP are accepted.
    pub async fn save_upload(
        &self,
        original_name: &str,
        bytes: &[u8],
    ) -> Result<StoredImage, AppError> {
        let extension = Path::new(original_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();
        if !ALLOWED_UPLOAD_EXTENSIONS.contains(&extension.as_str()) {
            return Err(AppError::Validation(
                "Only JPG, PNG, and WEBP images are allowed".to_string(),
            ));
        }
        if bytes.is_empty() {
            return Err(AppError::Validation("Uploaded image is empty".to_string()));
        }

        let filename = format!(
            "upload_{}_{}",
            Uuid::new_v4().simple(),
            secure_filename(original_name)
        );
        self.write(&filename, bytes).await
    }

    /// Writes a generated image reference to disk: data URLs are decoded,
    /// http(s) URLs downloaded.
    pub async fn persist(&self, reference: &str) -> Result<StoredImage, AppError> {
        if is_data_url(reference) {
            let (mime, bytes) = decode_data_url(reference)?;
            let filename = format!(
                "generated_{}.{}",
                Uuid::new_v4().simple(),
                extension_for_mime(&mime)
            );
            return self.write(&filename, &bytes).await;
        }

        if is_remote_url(reference) {
            let response = self
                .http
                .get(reference)
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .map_err(|e| AppError::ImageService(format!("Failed to download image: {e}")))?;
            let mime = response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("image/png")
                .to_string();
            let bytes = response
                .bytes()
                .await
                .map_err(|e| AppError::ImageService(format!("Failed to read image: {e}")))?;
            let filename = format!(
                "generated_{}.{}",
                Uuid::new_v4().simple(),
                extension_for_mime(&mime)
            );
            return self.write(&filename, &bytes).await;
        }

        Err(AppError::ImageService(format!(
            "Unsupported image reference: {}",
            reference.chars().take(60).collect::<String>()
        )))
    }

    async fn write(&self, filename: &str, bytes: &[u8]) -> Result<StoredImage, AppError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(filename);
        tokio::fs::write(&path, bytes).await?;
        debug!("Stored image {} ({} bytes)", path.display(), bytes.len());
        Ok(StoredImage {
            path: Some(path),
            url: format!("{UPLOADS_ROUTE}/{filename}"),
        })
    }
}

pub fn is_data_url(value: &str) -> bool {
    value.starts_with("data:image/")
}

pub fn is_remote_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

/// Splits `data:<mime>;base64,<payload>` into its mime type and bytes.
pub fn decode_data_url(data_url: &str) -> Result<(String, Vec<u8>), AppError> {
    let (header, payload) = data_url
        .split_once(',')
        .ok_or_else(|| AppError::ImageService("Malformed data URL".to_string()))?;
    let mime = header
        .trim_start_matches("data:")
        .split(';')
        .next()
        .filter(|m| !m.is_empty())
        .unwrap_or("image/png")
        .to_string();
    let bytes = STANDARD
        .decode(payload.trim())
        .map_err(|e| AppError::ImageService(format!("Invalid base64 image data: {e}")))?;
    Ok((mime, bytes))
}

pub fn extension_for_mime(mime: &str) -> &'static str {
    let mime = mime.to_lowercase();
    if mime.contains("png") {
        "png"
    } else if mime.contains("jpeg") || mime.contains("jpg") {
        "jpg"
    } else if mime.contains("webp") {
        "webp"
    } else if mime.contains("gif") {
        "gif"
    } else {
        "png"
    }
}

pub fn mime_for_path(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .as_deref()
    {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => "application/octet-stream",
    }
}

/// Encodes a local file as a `data:` URL for upload to an image API.
pub async fn file_to_data_url(path: &Path) -> Result<String, AppError> {
    let bytes = tokio::fs::read(path).await?;
    Ok(format!(
        "data:{};base64,{}",
        mime_for_path(path),
        STANDARD.encode(bytes)
    ))
}

/// Reduces a client-supplied file name to `[A-Za-z0-9._-]`, without leading
/// dots or path components.
pub fn secure_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();
    let cleaned = cleaned.trim_start_matches(['.', '_']).to_string();
    if cleaned.is_empty() {
        "image".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_secure_filename() {
        assert_eq!(secure_filename("My Photo.png"), "My_Photo.png");
        assert_eq!(secure_filename("../../etc/passwd"), "passwd");
        assert_eq!(secure_filename("C:\\Users\\x\\pic.jpg"), "pic.jpg");
        assert_eq!(secure_filename("..."), "image");
        assert_eq!(secure_filename("café.webp"), "caf.webp");
    }

    #[test]
    fn test_decode_data_url() {
        let (mime, bytes) = decode_data_url("data:image/webp;base64,aGVsbG8=").unwrap();
        assert_eq!(mime, "image/webp");
        assert_eq!(bytes, b"hello");
    }

    #[test]
    fn test_decode_data_url_rejects_garbage() {
        assert!(decode_data_url("data:image/png;base64").is_err());
        assert!(decode_data_url("data:image/png;base64,%%%").is_err());
    }

    #[test]
    fn test_extension_for_mime() {
        assert_eq!(extension_for_mime("image/png"), "png");
        assert_eq!(extension_for_mime("image/jpeg"), "jpg");
        assert_eq!(extension_for_mime("image/webp"), "webp");
        assert_eq!(extension_for_mime("application/octet-stream"), "png");
    }

    #[test]
    fn test_mime_for_path() {
        assert_eq!(mime_for_path(Path::new("a/b.JPG")), "image/jpeg");
        assert_eq!(mime_for_path(Path::new("a/b")), "application/octet-stream");
    }

    #[test]
    fn test_url_kinds() {
        assert!(is_data_url("data:image/png;base64,AA"));
        assert!(!is_data_url("data:text/plain;base64,AA"));
        assert!(is_remote_url("https://replicate.delivery/x.png"));
        assert!(!is_remote_url("/uploads/x.png"));
    }

    #[tokio::test]
    async fn test_save_upload_writes_file_and_url() {
        let tmp = TempDir::new().unwrap();
        let storage = ImageStorage::new(tmp.path()).unwrap();

        let stored = storage.save_upload("flyer.PNG", b"png-bytes").await.unwrap();
        let path = stored.path.clone().unwrap();

        assert!(stored.url.starts_with("/uploads/upload_"));
        assert!(stored.url.ends_with("_flyer.PNG"));
        assert_eq!(std::fs::read(path).unwrap(), b"png-bytes");
    }

    #[tokio::test]
    async fn test_save_upload_rejects_other_types() {
        let tmp = TempDir::new().unwrap();
        let storage = ImageStorage::new(tmp.path()).unwrap();

        for name in ["notes.txt", "noext", "anim.gif"] {
            assert!(
                matches!(
                    storage.save_upload(name, b"x").await,
                    Err(AppError::Validation(_))
                ),
                "{name} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn test_persist_data_url() {
        let tmp = TempDir::new().unwrap();
        let storage = ImageStorage::new(tmp.path().join("uploads")).unwrap();

        let stored = storage
            .persist("data:image/jpeg;base64,aGVsbG8=")
            .await
            .unwrap();

        assert!(stored.url.starts_with("/uploads/generated_"));
        assert!(stored.url.ends_with(".jpg"));
        assert_eq!(std::fs::read(stored.path.unwrap()).unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_persist_rejects_unknown_reference() {
        let tmp = TempDir::new().unwrap();
        let storage = ImageStorage::new(tmp.path()).unwrap();
        assert!(matches!(
            storage.persist("ftp://nope").await,
            Err(AppError::ImageService(_))
        ));
    }

    #[tokio::test]
    async fn test_file_to_data_url() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("x.png");
        std::fs::write(&path, b"hello").unwrap();

        assert_eq!(
            file_to_data_url(&path).await.unwrap(),
            "data:image/png;base64,aGVsbG8="
        );
    }
}
