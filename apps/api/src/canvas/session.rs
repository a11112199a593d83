//! In-memory canvas sessions keyed by id. Sessions are lost on restart.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::canvas::storage::StoredImage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryKind {
    Upload,
    User,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    #[serde(rename = "type")]
    pub kind: HistoryKind,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CanvasSession {
    pub history: Vec<HistoryEntry>,
    /// Local copy of the current image; edits read from here.
    pub current_image_path: Option<PathBuf>,
    pub current_image_url: Option<String>,
    pub total_cost: f64,
}

impl CanvasSession {
    pub fn has_history(&self) -> bool {
        !self.history.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<Uuid, CanvasSession>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a session from an uploaded image, replacing any existing state
    /// under `id`. A fresh id is minted when none is given.
    pub async fn start_with_upload(
        &self,
        id: Option<Uuid>,
        image: StoredImage,
        original_name: &str,
    ) -> (Uuid, CanvasSession) {
        let id = id.unwrap_or_else(Uuid::new_v4);
        let session = CanvasSession {
            history: vec![HistoryEntry {
                kind: HistoryKind::Upload,
                message: format!("Uploaded {original_name}"),
            }],
            current_image_path: image.path,
            current_image_url: Some(image.url),
            total_cost: 0.0,
        };
        self.sessions.write().await.insert(id, session.clone());
        (id, session)
    }

    /// Snapshot of a session. Unknown ids yield an empty session.
    pub async fn get(&self, id: Uuid) -> CanvasSession {
        self.sessions
            .read()
            .await
            .get(&id)
            .cloned()
            .unwrap_or_default()
    }

    /// Records a processed image: it becomes the current image, its cost is
    /// added, and `message` is appended to the history.
    pub async fn record_result(
        &self,
        id: Uuid,
        image: StoredImage,
        cost: f64,
        message: String,
    ) -> CanvasSession {
        let mut sessions = self.sessions.write().await;
        let session = sessions.entry(id).or_default();
        session.current_image_path = image.path;
        session.current_image_url = Some(image.url);
        session.total_cost += cost;
        session.history.push(HistoryEntry {
            kind: HistoryKind::User,
            message,
        });
        session.clone()
    }

    /// Returns whether a session existed.
    pub async fn reset(&self, id: Uuid) -> bool {
        self.sessions.write().await.remove(&id).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local(name: &str) -> StoredImage {
        StoredImage {
            path: Some(PathBuf::from(format!("uploads/{name}"))),
            url: format!("/uploads/{name}"),
        }
    }

    #[tokio::test]
    async fn test_upload_starts_fresh_history() {
        let store = SessionStore::new();
        let (id, session) = store
            .start_with_upload(None, local("a.png"), "a.png")
            .await;

        assert_eq!(session.history.len(), 1);
        assert_eq!(session.history[0].kind, HistoryKind::Upload);
        assert_eq!(session.history[0].message, "Uploaded a.png");
        assert_eq!(store.get(id).await, session);
    }

    #[tokio::test]
    async fn test_upload_replaces_existing_session() {
        let store = SessionStore::new();
        let (id, _) = store.start_with_upload(None, local("a.png"), "a.png").await;
        store
            .record_result(id, local("b.png"), 0.01, "edit".to_string())
            .await;

        let (same_id, session) = store
            .start_with_upload(Some(id), local("c.png"), "c.png")
            .await;
        assert_eq!(same_id, id);
        assert_eq!(session.history.len(), 1);
        assert_eq!(session.total_cost, 0.0);
    }

    #[tokio::test]
    async fn test_record_result_accumulates_cost_and_history() {
        let store = SessionStore::new();
        let id = Uuid::new_v4();

        store
            .record_result(id, local("g.png"), 0.005, "a poster".to_string())
            .await;
        let session = store
            .record_result(id, StoredImage::remote("https://x/y.png"), 0.01, "bluer".to_string())
            .await;

        assert!((session.total_cost - 0.015).abs() < 1e-9);
        assert_eq!(session.history.len(), 2);
        assert_eq!(session.history[1].kind, HistoryKind::User);
        assert!(session.current_image_path.is_none());
        assert_eq!(session.current_image_url.as_deref(), Some("https://x/y.png"));
    }

    #[tokio::test]
    async fn test_reset_and_unknown_sessions() {
        let store = SessionStore::new();
        let (id, _) = store.start_with_upload(None, local("a.png"), "a.png").await;

        assert!(store.reset(id).await);
        assert!(!store.reset(id).await);
        assert!(!store.get(id).await.has_history());
    }

    #[test]
    fn test_history_entry_serializes_type_tag() {
        let entry = HistoryEntry {
            kind: HistoryKind::Upload,
            message: "Uploaded a.png".to_string(),
        };
        assert_eq!(
            serde_json::to_value(entry).unwrap(),
            serde_json::json!({"type": "upload", "message": "Uploaded a.png"})
        );
    }
}
