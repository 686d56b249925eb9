//! Script-writing adapter backed by an Anthropic-style messages API.
//!
//! Covers every text capability of the pipeline: flat and chaptered
//! scripts (with the one-shot continuation when materially short), scene
//! planning for animated variants, footage keyword extraction, and the
//! content-policy prompt sanitizer.

use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use super::{strip_code_fence, ScriptStage};
use crate::domain::{chapter_count_for_minutes, Scene, StructuredScript};
use crate::error::{StageError, StageResult};

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";
const DEFAULT_MODEL: &str = "claude-3-5-haiku-latest";

/// Natural speaking pace used to size scripts against a minute target.
pub const WORDS_PER_MINUTE: u32 = 150;

/// A script below this fraction of its word target gets exactly one
/// continuation call.
const CONTINUATION_THRESHOLD: f64 = 0.6;

/// True when the produced length is materially short of the target.
pub fn needs_continuation(word_count: usize, target_words: u32) -> bool {
    (word_count as f64) < target_words as f64 * CONTINUATION_THRESHOLD
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    text: String,
}

/// Scene schema as the planner returns it; durations arrive as "8s"/"4s".
#[derive(Debug, Deserialize)]
struct PlannedScene {
    name: String,
    image_prompt: String,
    animation_prompt: String,
    #[serde(default = "default_duration")]
    duration: String,
}

fn default_duration() -> String {
    "8s".to_string()
}

impl PlannedScene {
    fn into_scene(self) -> Scene {
        let duration_secs = self
            .duration
            .trim_end_matches('s')
            .parse::<u32>()
            .unwrap_or(8);
        Scene {
            name: self.name,
            image_prompt: self.image_prompt,
            animation_prompt: self.animation_prompt,
            duration_secs,
            image_url: None,
            clip_url: None,
        }
    }
}

pub struct ScribeStage {
    api_key: Option<String>,
    model: String,
    client: Client,
}

impl ScribeStage {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            api_key,
            model: DEFAULT_MODEL.to_string(),
            client: Client::new(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    fn key(&self) -> StageResult<&str> {
        self.api_key
            .as_deref()
            .ok_or(StageError::Unavailable { provider: "scribe" })
    }

    async fn complete(&self, prompt: &str, max_tokens: u32) -> StageResult<String> {
        let key = self.key()?;

        let response = self
            .client
            .post(API_URL)
            .header("x-api-key", key)
            .header("anthropic-version", API_VERSION)
            .json(&json!({
                "model": self.model,
                "max_tokens": max_tokens,
                "messages": [{"role": "user", "content": prompt}],
            }))
            .send()
            .await
            .map_err(|e| StageError::provider_failed("scribe", e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(StageError::provider_failed(
                "scribe",
                format!("HTTP {}: {}", status, body.chars().take(200).collect::<String>()),
            ));
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| StageError::parse("messages response", e.to_string()))?;

        parsed
            .content
            .into_iter()
            .next()
            .map(|block| block.text)
            .ok_or_else(|| StageError::parse("messages response", "empty content"))
    }

    fn parse_structured(text: &str) -> StageResult<StructuredScript> {
        let unwrapped = strip_code_fence(text);
        let script: StructuredScript = serde_json::from_str(unwrapped)
            .map_err(|e| StageError::parse("structured script", e.to_string()))?;
        if script.chapters.is_empty() {
            return Err(StageError::parse("structured script", "no chapters"));
        }
        Ok(script)
    }
}

#[async_trait::async_trait]
impl ScriptStage for ScribeStage {
    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    async fn flat_script(&self, topic: &str, minutes: u32) -> StageResult<String> {
        let target_words = minutes * WORDS_PER_MINUTE;
        let prompt = format!(
            "Write a detailed {minutes}-minute video script about: {topic}\n\
             Requirements:\n\
             - Professional educational tone\n\
             - Include specific facts and examples\n\
             - Approximately {target_words} words\n\
             - Natural speaking pace\n\
             - Structure: Hook, Introduction, Main Content, Conclusion\n\
             - Do NOT include stage directions, just the spoken words"
        );

        let mut script = self
            .complete(&prompt, (target_words + 500).min(4000))
            .await?;

        let word_count = script.split_whitespace().count();
        info!(word_count, target_words, "Flat script generated");

        if needs_continuation(word_count, target_words) {
            warn!(word_count, target_words, "Script too short, extending");
            let remaining = target_words.saturating_sub(word_count as u32);
            let tail: String = script
                .chars()
                .rev()
                .take(500)
                .collect::<String>()
                .chars()
                .rev()
                .collect();
            let continuation = self
                .complete(
                    &format!("Continue this script with {remaining} more words:\n\n{tail}"),
                    (remaining + 200).min(4000),
                )
                .await?;
            script.push_str("\n\n");
            script.push_str(&continuation);
        }

        Ok(script)
    }

    async fn structured_script(&self, topic: &str, minutes: u32) -> StageResult<StructuredScript> {
        let chapter_count = chapter_count_for_minutes(minutes);
        let target_words = minutes * WORDS_PER_MINUTE;
        let words_per_chapter = target_words / chapter_count;

        let prompt = format!(
            "Write a {minutes}-minute video script about: {topic}\n\n\
             Structure it as exactly {chapter_count} chapters. Each chapter should have \
             approximately {words_per_chapter} words of narration.\n\n\
             For each chapter, provide:\n\
             1. \"title\" - short chapter title (2-5 words)\n\
             2. \"narration\" - the spoken narration text (~{words_per_chapter} words). \
             Professional educational tone, specific facts, natural speaking pace. \
             No stage directions, just spoken words.\n\
             3. \"visual\" - a detailed image generation prompt for this chapter's visual slide. \
             Describe a vivid, cinematic 16:9 scene that illustrates the chapter's topic. \
             Include: subject, setting, lighting, mood, camera angle. \
             Style: photorealistic, high detail, professional cinematography.\n\n\
             Return ONLY valid JSON. No markdown, no explanation. Format:\n\
             {{\"chapters\": [{{\"title\": \"The Hook\", \"narration\": \"Did you know that...\", \
             \"visual\": \"A dramatic close-up of...\"}}]}}"
        );

        let raw = self
            .complete(&prompt, (target_words + 2000).min(8000))
            .await?;
        let mut script = Self::parse_structured(&raw)?;

        let total_words = script.word_count();
        info!(
            chapters = script.chapters.len(),
            total_words, target_words, "Structured script generated"
        );

        if needs_continuation(total_words, target_words) {
            warn!(total_words, target_words, "Structured script too short, extending");
            let remaining = target_words.saturating_sub(total_words as u32);
            let ext_prompt = format!(
                "The following script chapters are too short (total {total_words} words, need \
                 {target_words}). Add {remaining} more words by expanding each chapter's \
                 narration with more detail, examples, and facts. Return the complete updated \
                 JSON in the same format.\n\n{raw}"
            );
            match self
                .complete(&ext_prompt, (remaining + 2000).min(8000))
                .await
                .and_then(|ext| Self::parse_structured(&ext))
            {
                Ok(extended) => script = extended,
                // Best effort: keep the short original rather than fail the run
                Err(e) => warn!(error = %e, "Extension failed, keeping original script"),
            }
        }

        Ok(script)
    }

    async fn plan_scenes(&self, brief: &str, count: u32) -> StageResult<Vec<Scene>> {
        let prompt = format!(
            "You are creating a short-form animated video (vertical, 9:16) about:\n{brief}\n\n\
             Generate exactly {count} scenes. For each scene, provide:\n\
             1. \"name\" - short scene name (1-2 words)\n\
             2. \"image_prompt\" - hyper-detailed prompt for a stylized 3D character image: \
             anthropomorphic character with an expressive face, specific texture, lighting and \
             environment, 9:16 vertical, shallow depth of field, centered\n\
             3. \"animation_prompt\" - prompt for animating the image with spoken dialogue: the \
             character speaks in FIRST PERSON with the dialogue in quotes, describe a visual \
             transformation, and end with: Do not display any text, captions, subtitles, or \
             words on screen\n\
             4. \"duration\" - \"8s\" for dialogue scenes, \"4s\" for quick transitions\n\n\
             Return ONLY a valid JSON array. No markdown, no explanation."
        );

        let raw = self.complete(&prompt, 3000).await?;
        let unwrapped = strip_code_fence(&raw);

        let planned: Vec<PlannedScene> = serde_json::from_str(unwrapped)
            .map_err(|e| StageError::parse("scene plan", e.to_string()))?;
        if planned.is_empty() {
            return Err(StageError::parse("scene plan", "no scenes"));
        }

        info!(scenes = planned.len(), "Scene plan generated");
        Ok(planned.into_iter().map(PlannedScene::into_scene).collect())
    }

    async fn extract_keywords(&self, script: &str, count: usize) -> StageResult<Vec<String>> {
        let excerpt: String = script.chars().take(3000).collect();
        let prompt = format!(
            "Extract {count} short visual search keywords for finding stock background footage \
             matching this script. Each keyword is 1-2 generic, concrete words (e.g. \"ocean \
             waves\", \"city night\").\n\nScript:\n{excerpt}\n\n\
             Return ONLY a valid JSON array of strings. No markdown, no explanation."
        );

        let raw = self.complete(&prompt, 300).await?;
        let keywords: Vec<String> = serde_json::from_str(strip_code_fence(&raw))
            .map_err(|e| StageError::parse("keywords", e.to_string()))?;
        if keywords.is_empty() {
            return Err(StageError::parse("keywords", "no keywords"));
        }
        Ok(keywords)
    }

    async fn sanitize_prompt(&self, prompt: &str) -> StageResult<String> {
        let rewrite = format!(
            "The following video-generation prompt was rejected by a content filter. Rewrite it \
             to express the same visual scene in safer, gentler language: keep the same subject, \
             setting, and camera movement, remove anything that could read as violent, frightening \
             or suggestive, and keep the instruction that no text, captions, subtitles, or words \
             appear on screen.\n\nPrompt:\n{prompt}\n\n\
             Return ONLY the rewritten prompt, nothing else."
        );

        let rewritten = self.complete(&rewrite, 1000).await?;
        Ok(rewritten.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_continuation_threshold() {
        // Target 1500 words: below 60% continues, at/above does not
        assert!(needs_continuation(600, 1500)); // 40%
        assert!(needs_continuation(899, 1500));
        assert!(!needs_continuation(900, 1500)); // exactly 60%
        assert!(!needs_continuation(1500, 1500));
    }

    #[test]
    fn test_unavailable_without_key() {
        let stage = ScribeStage::new(None);
        assert!(!stage.is_available());
    }

    #[test]
    fn test_planned_scene_duration_parsing() {
        let planned = PlannedScene {
            name: "intro".to_string(),
            image_prompt: "x".to_string(),
            animation_prompt: "y".to_string(),
            duration: "4s".to_string(),
        };
        assert_eq!(planned.into_scene().duration_secs, 4);

        let odd = PlannedScene {
            name: "intro".to_string(),
            image_prompt: "x".to_string(),
            animation_prompt: "y".to_string(),
            duration: "fast".to_string(),
        };
        assert_eq!(odd.into_scene().duration_secs, 8);
    }

    #[test]
    fn test_parse_structured_strict() {
        let good = r#"{"chapters": [{"title": "A", "narration": "words here", "visual": "v"}]}"#;
        assert!(ScribeStage::parse_structured(good).is_ok());

        let fenced = format!("```json\n{}\n```", good);
        assert!(ScribeStage::parse_structured(&fenced).is_ok());

        // A degraded shape is a ParseError, never silently coerced
        let wrong_shape = r#"{"sections": []}"#;
        assert!(matches!(
            ScribeStage::parse_structured(wrong_shape),
            Err(StageError::Parse { .. })
        ));

        let empty = r#"{"chapters": []}"#;
        assert!(matches!(
            ScribeStage::parse_structured(empty),
            Err(StageError::Parse { .. })
        ));
    }
}
