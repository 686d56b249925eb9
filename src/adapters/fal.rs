//! Image and animation adapters backed by a fal-style queue API.
//!
//! Both capabilities run through the generic job poller: submit to
//! `queue.fal.run/<model>`, poll the status endpoint, then fetch the full
//! result payload. Content-policy rejections surface as a structured error
//! code in the status body and are mapped to `StageError::ContentPolicy`,
//! never matched against message text.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::{AnimationStage, ImageStage};
use crate::core::poller::{JobClient, JobPoller, PollConfig, RemoteStatus};
use crate::error::{StageError, StageResult};

const QUEUE_URL: &str = "https://queue.fal.run";
const IMAGE_MODEL: &str = "fal-ai/nano-banana-pro";
const IMAGE_EDIT_MODEL: &str = "fal-ai/nano-banana-pro/edit";
const ANIMATION_MODEL: &str = "fal-ai/veo3.1/fast/image-to-video";

const CONTENT_POLICY_CODE: &str = "content_policy_violation";

/// One queued fal model endpoint.
struct FalQueueClient {
    key: String,
    model: &'static str,
    client: Client,
}

impl FalQueueClient {
    fn new(key: String, model: &'static str) -> Self {
        Self {
            key,
            model,
            client: Client::new(),
        }
    }

    fn auth(&self) -> String {
        format!("Key {}", self.key)
    }
}

#[async_trait]
impl JobClient for FalQueueClient {
    fn provider(&self) -> &'static str {
        "fal"
    }

    async fn submit(&self, payload: Value) -> StageResult<String> {
        let response = self
            .client
            .post(format!("{}/{}", QUEUE_URL, self.model))
            .header("Authorization", self.auth())
            .json(&payload)
            .send()
            .await
            .map_err(|e| StageError::submission("fal", e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(StageError::submission(
                "fal",
                format!("HTTP {}: {}", status, body.chars().take(200).collect::<String>()),
            ));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| StageError::submission("fal", e.to_string()))?;

        body["request_id"]
            .as_str()
            .map(String::from)
            .ok_or_else(|| StageError::submission("fal", "no request_id in response"))
    }

    async fn status(&self, job_id: &str) -> StageResult<RemoteStatus> {
        let response = self
            .client
            .get(format!(
                "{}/{}/requests/{}/status",
                QUEUE_URL, self.model, job_id
            ))
            .header("Authorization", self.auth())
            .send()
            .await
            .map_err(|e| StageError::provider_failed("fal", e.to_string()))?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| StageError::provider_failed("fal", e.to_string()))?;

        match body["status"].as_str() {
            Some("IN_QUEUE") | Some("IN_PROGRESS") => Ok(RemoteStatus::InProgress),
            Some("COMPLETED") => Ok(RemoteStatus::Succeeded),
            Some("CANCELLED") => Ok(RemoteStatus::Cancelled {
                message: "cancelled by provider".to_string(),
            }),
            _ => {
                let code = body["error"]["code"].as_str();
                let message = body["error"]["message"]
                    .as_str()
                    .unwrap_or("unknown failure")
                    .to_string();
                Ok(RemoteStatus::Failed {
                    message,
                    content_policy: code == Some(CONTENT_POLICY_CODE),
                })
            }
        }
    }

    async fn result(&self, job_id: &str) -> StageResult<Value> {
        let response = self
            .client
            .get(format!("{}/{}/requests/{}", QUEUE_URL, self.model, job_id))
            .header("Authorization", self.auth())
            .send()
            .await
            .map_err(|e| StageError::provider_failed("fal", e.to_string()))?;

        response
            .json()
            .await
            .map_err(|e| StageError::provider_failed("fal", e.to_string()))
    }
}

/// Shared run: submit payload, poll to terminal, hand back the payload.
async fn run_job(
    key: &str,
    model: &'static str,
    payload: Value,
    poll: PollConfig,
) -> StageResult<Value> {
    let client = FalQueueClient::new(key.to_string(), model);
    let poller = JobPoller::new(poll);
    let mut job = poller.submit(&client, payload).await?;
    poller.wait(&client, &mut job, None).await
}

/// Still-image generation; a reference asset routes to the edit endpoint
/// so the character stays consistent across scenes.
pub struct FalImageStage {
    key: Option<String>,
    poll: PollConfig,
}

impl FalImageStage {
    pub fn new(key: Option<String>, timeout: Duration) -> Self {
        Self {
            key,
            poll: PollConfig::new(Duration::from_secs(5), timeout),
        }
    }
}

#[async_trait]
impl ImageStage for FalImageStage {
    fn is_available(&self) -> bool {
        self.key.is_some()
    }

    async fn generate(&self, prompt: &str, reference_url: Option<&str>) -> StageResult<String> {
        let key = self
            .key
            .as_deref()
            .ok_or(StageError::Unavailable { provider: "fal" })?;

        let (model, payload) = match reference_url {
            Some(reference) => (
                IMAGE_EDIT_MODEL,
                json!({
                    "prompt": prompt,
                    "image_urls": [reference],
                    "image_size": {"width": 768, "height": 1344},
                }),
            ),
            None => (
                IMAGE_MODEL,
                json!({
                    "prompt": prompt,
                    "image_size": {"width": 768, "height": 1344},
                }),
            ),
        };

        let result = run_job(key, model, payload, self.poll).await?;
        result["images"][0]["url"]
            .as_str()
            .map(String::from)
            .ok_or_else(|| StageError::provider_failed("fal", "no image in result"))
    }
}

/// Image-to-video animation, vertical 9:16.
pub struct FalAnimationStage {
    key: Option<String>,
    poll: PollConfig,
}

impl FalAnimationStage {
    pub fn new(key: Option<String>, timeout: Duration) -> Self {
        Self {
            key,
            poll: PollConfig::new(Duration::from_secs(10), timeout),
        }
    }
}

#[async_trait]
impl AnimationStage for FalAnimationStage {
    fn is_available(&self) -> bool {
        self.key.is_some()
    }

    async fn animate(
        &self,
        image_url: &str,
        prompt: &str,
        duration_secs: u32,
    ) -> StageResult<String> {
        let key = self
            .key
            .as_deref()
            .ok_or(StageError::Unavailable { provider: "fal" })?;

        let payload = json!({
            "prompt": prompt,
            "image_url": image_url,
            "duration": format!("{}s", duration_secs),
            "aspect_ratio": "9:16",
        });

        let result = run_job(key, ANIMATION_MODEL, payload, self.poll).await?;
        result["video"]["url"]
            .as_str()
            .map(String::from)
            .ok_or_else(|| StageError::provider_failed("fal", "no video in result"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_without_key() {
        let image = FalImageStage::new(None, Duration::from_secs(300));
        assert!(!image.is_available());

        let animation = FalAnimationStage::new(None, Duration::from_secs(600));
        assert!(!animation.is_available());
    }

    #[tokio::test]
    async fn test_generate_without_key_fails_before_network() {
        let image = FalImageStage::new(None, Duration::from_secs(300));
        let err = image.generate("a lighthouse", None).await.unwrap_err();
        assert!(matches!(err, StageError::Unavailable { provider: "fal" }));
    }
}
