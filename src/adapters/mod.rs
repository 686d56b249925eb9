//! Stage adapters for external content-generation providers.
//!
//! Each adapter normalizes one provider's request/response surface onto a
//! stage trait. Shared behavior: a missing credential is reported as
//! `StageError::Unavailable` before any network call; structured output is
//! unwrapped from incidental markdown fencing and then parsed strictly;
//! generation stages with a length target issue at most one continuation.

pub mod delivery;
pub mod elevenlabs;
pub mod fal;
pub mod grok;
pub mod pexels;
pub mod publish;
pub mod runway;
pub mod scribe;

use async_trait::async_trait;

use crate::domain::{Scene, StructuredScript};
use crate::error::StageResult;

pub use delivery::{DeliveryPayload, DeliverySink, FileDelivery};
pub use elevenlabs::ElevenLabsStage;
pub use fal::{FalAnimationStage, FalImageStage};
pub use grok::GrokContextStage;
pub use pexels::PexelsFootageStage;
pub use publish::{PublishRequest, Visibility, YouTubePublisher};
pub use runway::RunwayAvatarStage;
pub use scribe::ScribeStage;

/// Text generation: scripts, scene planning, keyword extraction, and the
/// prompt sanitizer.
#[async_trait]
pub trait ScriptStage: Send + Sync {
    fn is_available(&self) -> bool;

    /// Flat narration script sized to a target duration in minutes.
    async fn flat_script(&self, topic: &str, minutes: u32) -> StageResult<String>;

    /// Chaptered script with per-chapter narration and visual prompts.
    async fn structured_script(&self, topic: &str, minutes: u32) -> StageResult<StructuredScript>;

    /// Plan an ordered scene list for a short-form animated video.
    async fn plan_scenes(&self, brief: &str, count: u32) -> StageResult<Vec<Scene>>;

    /// Extract stock-footage search keywords from a script.
    async fn extract_keywords(&self, script: &str, count: usize) -> StageResult<Vec<String>>;

    /// Rewrite a policy-flagged prompt into safer language with the same
    /// visual intent. Used only as a retry input.
    async fn sanitize_prompt(&self, prompt: &str) -> StageResult<String>;
}

/// Context analysis for reaction videos (tweet + surrounding discussion).
#[async_trait]
pub trait ContextStage: Send + Sync {
    fn is_available(&self) -> bool;

    async fn analyze(&self, source_text: &str) -> StageResult<String>;
}

/// Still-image generation. A reference asset routes the call to the
/// provider's identity-preserving edit capability.
#[async_trait]
pub trait ImageStage: Send + Sync {
    fn is_available(&self) -> bool;

    async fn generate(&self, prompt: &str, reference_url: Option<&str>) -> StageResult<String>;
}

/// Image-to-video animation.
#[async_trait]
pub trait AnimationStage: Send + Sync {
    fn is_available(&self) -> bool;

    async fn animate(
        &self,
        image_url: &str,
        prompt: &str,
        duration_secs: u32,
    ) -> StageResult<String>;
}

/// Avatar / single-clip text-to-video, polled to a URL.
#[async_trait]
pub trait AvatarStage: Send + Sync {
    fn is_available(&self) -> bool;

    async fn render(&self, script: &str, seconds: u32) -> StageResult<String>;
}

/// Text-to-speech. Implementations split text above the provider chunk
/// limit at sentence boundaries and concatenate the segments in order.
#[async_trait]
pub trait SpeechStage: Send + Sync {
    fn is_available(&self) -> bool;

    async fn synthesize(&self, text: &str) -> StageResult<Vec<u8>>;
}

/// Stock-footage search.
#[async_trait]
pub trait FootageStage: Send + Sync {
    fn is_available(&self) -> bool;

    async fn search(&self, keyword: &str, count: usize) -> StageResult<Vec<String>>;

    /// Fetch clips for several keywords, deduplicated, manifest order
    /// preserved.
    async fn search_many(&self, keywords: &[String], per_keyword: usize) -> StageResult<Vec<String>> {
        let mut seen = std::collections::HashSet::new();
        let mut urls = Vec::new();
        for keyword in keywords {
            for url in self.search(keyword, per_keyword).await? {
                if seen.insert(url.clone()) {
                    urls.push(url);
                }
            }
        }
        Ok(urls)
    }
}

/// Strip an incidental markdown code fence from a model response.
///
/// The contract stays strict: this unwraps one layer of ```/```json
/// fencing and nothing else; the caller still parses the result and fails
/// with a `ParseError` on any mismatch.
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    rest.trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("{\"a\":1}"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```\n[1,2]\n```"), "[1,2]");
        assert_eq!(strip_code_fence("  {\"a\":1}  "), "{\"a\":1}");
    }

    #[test]
    fn test_strip_code_fence_leaves_inner_content_alone() {
        // Inner backticks are content, not fencing
        let inner = "```json\n{\"text\": \"use ``` for code\"}\n```";
        assert_eq!(strip_code_fence(inner), "{\"text\": \"use ``` for code\"}");
    }
}
