//! Optional publishing sink: upload a finished video to YouTube.
//!
//! Uses a stored OAuth token (obtained out of band) and refreshes it with
//! the configured client credentials when it is near expiry. Metadata is
//! clamped to the platform limits before upload so an oversized title or
//! tag list never fails the whole run at the last step.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::error::{StageError, StageResult};

const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const UPLOAD_URL: &str =
    "https://www.googleapis.com/upload/youtube/v3/videos?uploadType=multipart&part=snippet,status";

/// Platform metadata limits.
const TITLE_LIMIT: usize = 100;
const DESCRIPTION_LIMIT: usize = 5000;
const TAGS_TOTAL_LIMIT: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Public,
    Unlisted,
    Private,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Unlisted => "unlisted",
            Self::Private => "private",
        }
    }
}

#[derive(Debug, Clone)]
pub struct PublishRequest {
    pub video_path: PathBuf,
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub visibility: Visibility,
}

/// Token file layout at `$VIDEOFORGE_HOME/youtube_token.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredToken {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    expiry: Option<DateTime<Utc>>,
}

impl StoredToken {
    fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        match self.expiry {
            Some(expiry) => expiry <= now + ChronoDuration::seconds(60),
            None => true,
        }
    }
}

/// Truncate at a char boundary, never mid-codepoint.
fn clamp_chars(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}

/// Keep tags in order while their combined length fits the platform's
/// total-characters budget.
fn clamp_tags(tags: &[String], total_limit: usize) -> Vec<String> {
    let mut kept = Vec::new();
    let mut total = 0usize;
    for tag in tags {
        let len = tag.chars().count();
        if total + len > total_limit {
            break;
        }
        total += len;
        kept.push(tag.clone());
    }
    kept
}

pub struct YouTubePublisher {
    client_id: Option<String>,
    client_secret: Option<String>,
    token_path: PathBuf,
    client: Client,
}

impl YouTubePublisher {
    pub fn new(
        client_id: Option<String>,
        client_secret: Option<String>,
        token_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            client_id,
            client_secret,
            token_path: token_path.into(),
            client: Client::new(),
        }
    }

    /// Publishing needs both client credentials and a previously stored
    /// token; anything less reports unavailable before any network call.
    pub fn is_available(&self) -> bool {
        self.client_id.is_some() && self.client_secret.is_some() && self.token_path.exists()
    }

    fn load_token(&self) -> StageResult<StoredToken> {
        let raw = std::fs::read_to_string(&self.token_path).map_err(|e| {
            StageError::delivery(format!(
                "cannot read token file {}: {}",
                self.token_path.display(),
                e
            ))
        })?;
        serde_json::from_str(&raw).map_err(|e| StageError::parse("stored token", e.to_string()))
    }

    fn store_token(&self, token: &StoredToken) -> StageResult<()> {
        let raw = serde_json::to_string_pretty(token)
            .map_err(|e| StageError::delivery(e.to_string()))?;
        std::fs::write(&self.token_path, raw).map_err(|e| {
            StageError::delivery(format!(
                "cannot write token file {}: {}",
                self.token_path.display(),
                e
            ))
        })
    }

    async fn refresh(&self, token: &StoredToken) -> StageResult<StoredToken> {
        let (client_id, client_secret) = match (&self.client_id, &self.client_secret) {
            (Some(id), Some(secret)) => (id, secret),
            _ => {
                return Err(StageError::Unavailable {
                    provider: "youtube",
                })
            }
        };

        let response = self
            .client
            .post(TOKEN_URL)
            .form(&[
                ("client_id", client_id.as_str()),
                ("client_secret", client_secret.as_str()),
                ("refresh_token", token.refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(|e| StageError::delivery(format!("token refresh: {}", e)))?;

        if !response.status().is_success() {
            return Err(StageError::delivery(format!(
                "token refresh: HTTP {}",
                response.status()
            )));
        }

        #[derive(Deserialize)]
        struct RefreshResponse {
            access_token: String,
            expires_in: i64,
        }

        let refreshed: RefreshResponse = response
            .json()
            .await
            .map_err(|e| StageError::parse("token refresh response", e.to_string()))?;

        let updated = StoredToken {
            access_token: refreshed.access_token,
            refresh_token: token.refresh_token.clone(),
            expiry: Some(Utc::now() + ChronoDuration::seconds(refreshed.expires_in)),
        };
        self.store_token(&updated)?;
        info!("Refreshed publishing token");
        Ok(updated)
    }

    async fn fresh_token(&self) -> StageResult<StoredToken> {
        let token = self.load_token()?;
        if token.needs_refresh(Utc::now()) {
            self.refresh(&token).await
        } else {
            Ok(token)
        }
    }

    /// Upload a video. Returns the watch URL.
    pub async fn publish(&self, request: &PublishRequest) -> StageResult<String> {
        if !self.is_available() {
            return Err(StageError::Unavailable {
                provider: "youtube",
            });
        }

        let token = self.fresh_token().await?;

        let title = clamp_chars(&request.title, TITLE_LIMIT);
        let description = clamp_chars(&request.description, DESCRIPTION_LIMIT);
        let tags = clamp_tags(&request.tags, TAGS_TOTAL_LIMIT);
        if tags.len() < request.tags.len() {
            warn!(
                dropped = request.tags.len() - tags.len(),
                "Dropped tags over the platform budget"
            );
        }

        let metadata = json!({
            "snippet": {
                "title": title,
                "description": description,
                "tags": tags,
            },
            "status": {
                "privacyStatus": request.visibility.as_str(),
            },
        });

        let bytes = tokio::fs::read(&request.video_path).await.map_err(|e| {
            StageError::delivery(format!(
                "cannot read {}: {}",
                request.video_path.display(),
                e
            ))
        })?;

        let form = Form::new()
            .part(
                "metadata",
                Part::text(metadata.to_string()).mime_str("application/json").map_err(|e| StageError::delivery(e.to_string()))?,
            )
            .part(
                "file",
                Part::bytes(bytes)
                    .file_name(file_name(&request.video_path))
                    .mime_str("video/mp4")
                    .map_err(|e| StageError::delivery(e.to_string()))?,
            );

        let response = self
            .client
            .post(UPLOAD_URL)
            .bearer_auth(&token.access_token)
            .multipart(form)
            .send()
            .await
            .map_err(|e| StageError::delivery(format!("upload: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(StageError::delivery(format!(
                "upload: HTTP {}: {}",
                status,
                body.chars().take(200).collect::<String>()
            )));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| StageError::parse("upload response", e.to_string()))?;

        let video_id = body["id"]
            .as_str()
            .ok_or_else(|| StageError::parse("upload response", "no video id"))?;

        info!(video_id, "Published video");
        Ok(format!("https://youtu.be/{}", video_id))
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "video.mp4".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_clamp_chars_is_codepoint_safe() {
        assert_eq!(clamp_chars("hello", 100), "hello");
        assert_eq!(clamp_chars("hello", 3), "hel");
        // Multibyte input truncates whole characters
        assert_eq!(clamp_chars("héllo", 2), "hé");
    }

    #[test]
    fn test_clamp_tags_total_budget() {
        let tags: Vec<String> = vec!["ocean".into(), "waves".into(), "documentary".into()];
        // "ocean" (5) + "waves" (5) fit in 10; "documentary" does not
        assert_eq!(clamp_tags(&tags, 10), vec!["ocean", "waves"]);
        assert_eq!(clamp_tags(&tags, 500), tags);
        assert!(clamp_tags(&tags, 3).is_empty());
    }

    #[test]
    fn test_token_refresh_window() {
        let now = Utc::now();
        let fresh = StoredToken {
            access_token: "a".into(),
            refresh_token: "r".into(),
            expiry: Some(now + ChronoDuration::minutes(10)),
        };
        assert!(!fresh.needs_refresh(now));

        let near_expiry = StoredToken {
            expiry: Some(now + ChronoDuration::seconds(30)),
            ..fresh.clone()
        };
        assert!(near_expiry.needs_refresh(now));

        let unknown = StoredToken {
            expiry: None,
            ..fresh
        };
        assert!(unknown.needs_refresh(now));
    }

    #[test]
    fn test_unavailable_without_token_file() {
        let temp = TempDir::new().unwrap();
        let publisher = YouTubePublisher::new(
            Some("id".into()),
            Some("secret".into()),
            temp.path().join("youtube_token.json"),
        );
        assert!(!publisher.is_available());
    }

    #[test]
    fn test_available_with_creds_and_token() {
        let temp = TempDir::new().unwrap();
        let token_path = temp.path().join("youtube_token.json");
        std::fs::write(
            &token_path,
            r#"{"access_token": "a", "refresh_token": "r"}"#,
        )
        .unwrap();

        let publisher =
            YouTubePublisher::new(Some("id".into()), Some("secret".into()), &token_path);
        assert!(publisher.is_available());

        let token = publisher.load_token().unwrap();
        assert_eq!(token.access_token, "a");
        assert!(token.expiry.is_none());
    }
}
