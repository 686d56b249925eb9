//! Context-analysis adapter backed by an xAI-style chat completions API.
//!
//! Used by the tweet-reaction variant: the model has live access to the
//! platform's discussion, so its analysis feeds scene planning with
//! current context the topic text alone would not carry.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use super::ContextStage;
use crate::error::{StageError, StageResult};

const API_URL: &str = "https://api.x.ai/v1/chat/completions";
const MODEL: &str = "grok-3";

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: String,
}

pub struct GrokContextStage {
    key: Option<String>,
    client: Client,
}

impl GrokContextStage {
    pub fn new(key: Option<String>) -> Self {
        Self {
            key,
            client: Client::new(),
        }
    }
}

#[async_trait]
impl ContextStage for GrokContextStage {
    fn is_available(&self) -> bool {
        self.key.is_some()
    }

    async fn analyze(&self, source_text: &str) -> StageResult<String> {
        let key = self
            .key
            .as_deref()
            .ok_or(StageError::Unavailable { provider: "grok" })?;

        let prompt = format!(
            "Analyze this tweet/post and search X (Twitter) for related context:\n\n{source_text}\n\n\
             Provide a comprehensive analysis:\n\
             1. TOPIC: What is this tweet about? (1 sentence)\n\
             2. KEY POINTS: The main claims or ideas (3-5 bullet points)\n\
             3. X CONTEXT: What are people saying about this topic on X right now? Include \
             related posts, replies, counter-arguments, trending takes\n\
             4. TRENDING ANGLE: What's the most engaging angle for a short video about this?\n\
             5. VISUAL IDEAS: What kind of visual scenes would make this compelling as a \
             30-45 second animated video?\n\n\
             Be specific and detailed. This will be used to write a video screenplay."
        );

        let response = self
            .client
            .post(API_URL)
            .bearer_auth(key)
            .json(&json!({
                "model": MODEL,
                "messages": [{"role": "user", "content": prompt}],
                "max_tokens": 2000,
            }))
            .send()
            .await
            .map_err(|e| StageError::provider_failed("grok", e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(StageError::provider_failed(
                "grok",
                format!("HTTP {}: {}", status, body.chars().take(200).collect::<String>()),
            ));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| StageError::parse("chat response", e.to_string()))?;

        let analysis = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| StageError::parse("chat response", "no choices"))?;

        info!(chars = analysis.len(), "Context analysis complete");
        Ok(analysis)
    }
}
