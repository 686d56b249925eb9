//! Stock-footage adapter backed by the Pexels video search API.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::info;

use super::FootageStage;
use crate::error::{StageError, StageResult};

const API_URL: &str = "https://api.pexels.com/videos/search";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    videos: Vec<Video>,
}

#[derive(Debug, Deserialize)]
struct Video {
    #[serde(default)]
    video_files: Vec<VideoFile>,
}

#[derive(Debug, Deserialize)]
struct VideoFile {
    link: String,
}

pub struct PexelsFootageStage {
    key: Option<String>,
    client: Client,
}

impl PexelsFootageStage {
    pub fn new(key: Option<String>) -> Self {
        Self {
            key,
            client: Client::new(),
        }
    }
}

#[async_trait]
impl FootageStage for PexelsFootageStage {
    fn is_available(&self) -> bool {
        self.key.is_some()
    }

    async fn search(&self, keyword: &str, count: usize) -> StageResult<Vec<String>> {
        let key = self
            .key
            .as_deref()
            .ok_or(StageError::Unavailable { provider: "pexels" })?;

        let response = self
            .client
            .get(API_URL)
            .header("Authorization", key)
            .query(&[
                ("query", keyword),
                ("per_page", &count.to_string()),
                ("page", "1"),
            ])
            .send()
            .await
            .map_err(|e| StageError::provider_failed("pexels", e.to_string()))?;

        if !response.status().is_success() {
            return Err(StageError::provider_failed(
                "pexels",
                format!("HTTP {}", response.status()),
            ));
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| StageError::parse("footage search", e.to_string()))?;

        let urls: Vec<String> = parsed
            .videos
            .into_iter()
            .filter_map(|v| v.video_files.into_iter().next().map(|f| f.link))
            .collect();

        info!(keyword, clips = urls.len(), "Footage search complete");
        Ok(urls)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unavailable_without_key() {
        let stage = PexelsFootageStage::new(None);
        assert!(!stage.is_available());
        let err = stage.search("ocean", 3).await.unwrap_err();
        assert!(matches!(err, StageError::Unavailable { provider: "pexels" }));
    }

    #[test]
    fn test_search_response_parsing() {
        let body = r#"{"videos": [
            {"video_files": [{"link": "https://cdn.example/a.mp4"}, {"link": "https://cdn.example/a-hd.mp4"}]},
            {"video_files": []}
        ]}"#;
        let parsed: SearchResponse = serde_json::from_str(body).unwrap();
        let urls: Vec<String> = parsed
            .videos
            .into_iter()
            .filter_map(|v| v.video_files.into_iter().next().map(|f| f.link))
            .collect();
        // Entries without files are dropped; the first rendition wins
        assert_eq!(urls, vec!["https://cdn.example/a.mp4"]);
    }
}
