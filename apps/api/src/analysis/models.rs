use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A scraped post as returned by the scraping actor. Only the fields the
/// analyzer reads are typed; everything else is kept for raw.json.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub post_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_url: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,
    /// Carousel children.
    #[serde(default)]
    pub child_posts: Vec<ChildPost>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildPost {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_url: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Post {
    /// Caps image lists so carousels don't blow up analysis payloads.
    pub fn truncate_media(&mut self, max_images: usize) {
        self.images.truncate(max_images);
        self.child_posts.truncate(max_images);
    }

    /// Image URLs for this post: cover first, then carousel children, then
    /// the flat `images` list. Deduplicated and capped at `max_images`.
    pub fn image_urls(&self, max_images: usize) -> Vec<String> {
        let mut urls: Vec<String> = Vec::new();
        let mut push = |url: &str| {
            if !url.is_empty() && !urls.iter().any(|u| u == url) {
                urls.push(url.to_string());
            }
        };

        if let Some(display_url) = self.display_url.as_deref() {
            push(display_url);
        }
        for child in self.child_posts.iter().take(max_images) {
            if let Some(url) = child.display_url.as_deref() {
                push(url);
            }
        }
        for url in self.images.iter().take(max_images) {
            push(url);
        }

        urls.truncate(max_images);
        urls
    }
}
