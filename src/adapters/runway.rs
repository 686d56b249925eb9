//! Avatar-video adapter backed by a Runway-style task API.
//!
//! Submit returns a task id; the task endpoint reports status and, on
//! success, a list of output URLs. Avatar renders run for several minutes,
//! so the poll cadence is short-interval, long-timeout.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::AvatarStage;
use crate::core::poller::{JobClient, JobPoller, PollConfig, RemoteStatus};
use crate::error::{StageError, StageResult};

const API_URL: &str = "https://api.dev.runwayml.com/v1";
const API_VERSION: &str = "2024-11-06";

struct RunwayClient {
    key: String,
    client: Client,
}

#[async_trait]
impl JobClient for RunwayClient {
    fn provider(&self) -> &'static str {
        "runway"
    }

    async fn submit(&self, payload: Value) -> StageResult<String> {
        let response = self
            .client
            .post(format!("{}/text_to_video", API_URL))
            .bearer_auth(&self.key)
            .header("X-Runway-Version", API_VERSION)
            .json(&payload)
            .send()
            .await
            .map_err(|e| StageError::submission("runway", e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(StageError::submission(
                "runway",
                format!("HTTP {}: {}", status, body.chars().take(200).collect::<String>()),
            ));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| StageError::submission("runway", e.to_string()))?;

        body["id"]
            .as_str()
            .map(String::from)
            .ok_or_else(|| StageError::submission("runway", "no task id in response"))
    }

    async fn status(&self, job_id: &str) -> StageResult<RemoteStatus> {
        let body = self.fetch_task(job_id).await?;

        match body["status"].as_str() {
            Some("SUCCEEDED") => Ok(RemoteStatus::Succeeded),
            Some("FAILED") | Some("ERROR") => Ok(RemoteStatus::Failed {
                message: body["failure"]
                    .as_str()
                    .unwrap_or("render failed")
                    .to_string(),
                content_policy: body["failureCode"]
                    .as_str()
                    .map(|c| c.starts_with("SAFETY"))
                    .unwrap_or(false),
            }),
            Some("CANCELLED") => Ok(RemoteStatus::Cancelled {
                message: "task cancelled".to_string(),
            }),
            _ => Ok(RemoteStatus::InProgress),
        }
    }

    async fn result(&self, job_id: &str) -> StageResult<Value> {
        self.fetch_task(job_id).await
    }
}

impl RunwayClient {
    async fn fetch_task(&self, task_id: &str) -> StageResult<Value> {
        let response = self
            .client
            .get(format!("{}/tasks/{}", API_URL, task_id))
            .bearer_auth(&self.key)
            .header("X-Runway-Version", API_VERSION)
            .send()
            .await
            .map_err(|e| StageError::provider_failed("runway", e.to_string()))?;

        response
            .json()
            .await
            .map_err(|e| StageError::provider_failed("runway", e.to_string()))
    }
}

/// Output arrives either as a list of URL strings or objects with a `url`
/// field, depending on the model.
fn extract_output_url(result: &Value) -> Option<String> {
    match &result["output"] {
        Value::String(url) => Some(url.clone()),
        Value::Array(items) => items.first().and_then(|item| match item {
            Value::String(url) => Some(url.clone()),
            Value::Object(_) => item["url"].as_str().map(String::from),
            _ => None,
        }),
        _ => None,
    }
}

pub struct RunwayAvatarStage {
    key: Option<String>,
    poll: PollConfig,
}

impl RunwayAvatarStage {
    pub fn new(key: Option<String>, timeout: Duration) -> Self {
        Self {
            key,
            poll: PollConfig::new(Duration::from_secs(5), timeout),
        }
    }
}

#[async_trait]
impl AvatarStage for RunwayAvatarStage {
    fn is_available(&self) -> bool {
        self.key.is_some()
    }

    async fn render(&self, script: &str, seconds: u32) -> StageResult<String> {
        let key = self
            .key
            .as_deref()
            .ok_or(StageError::Unavailable { provider: "runway" })?;

        let excerpt: String = script.chars().take(200).collect();
        let payload = json!({
            "model": "veo3",
            "promptText": format!("An AI character speaking: {}", excerpt),
            "ratio": "1280:720",
            "duration": seconds.min(8),
        });

        let client = RunwayClient {
            key: key.to_string(),
            client: Client::new(),
        };
        let poller = JobPoller::new(self.poll);
        let mut job = poller.submit(&client, payload).await?;
        let result = poller.wait(&client, &mut job, None).await?;

        extract_output_url(&result)
            .ok_or_else(|| StageError::provider_failed("runway", "no usable URL in output"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_output_url_shapes() {
        let as_list = json!({"output": ["https://cdn.example/a.mp4"]});
        assert_eq!(
            extract_output_url(&as_list).as_deref(),
            Some("https://cdn.example/a.mp4")
        );

        let as_objects = json!({"output": [{"url": "https://cdn.example/b.mp4"}]});
        assert_eq!(
            extract_output_url(&as_objects).as_deref(),
            Some("https://cdn.example/b.mp4")
        );

        let as_string = json!({"output": "https://cdn.example/c.mp4"});
        assert_eq!(
            extract_output_url(&as_string).as_deref(),
            Some("https://cdn.example/c.mp4")
        );

        let empty = json!({"output": []});
        assert_eq!(extract_output_url(&empty), None);
    }

    #[tokio::test]
    async fn test_render_without_key_is_unavailable() {
        let stage = RunwayAvatarStage::new(None, Duration::from_secs(600));
        assert!(!stage.is_available());
        let err = stage.render("hello", 8).await.unwrap_err();
        assert!(matches!(err, StageError::Unavailable { provider: "runway" }));
    }
}
