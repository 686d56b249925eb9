//! Text-to-speech adapter backed by an ElevenLabs-style API.
//!
//! The provider caps request size, so long narration is split at sentence
//! boundaries and the resulting MP3 segments are concatenated in order.
//! Segments synthesized with the same voice and profile share framing, so
//! byte-level concatenation yields a continuous stream.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::info;

use super::SpeechStage;
use crate::error::{StageError, StageResult};

const API_URL: &str = "https://api.elevenlabs.io/v1/text-to-speech";
const DEFAULT_VOICE: &str = "21m00Tcm4TlvDq8ikWAM";
const MODEL: &str = "eleven_multilingual_v2";

/// Provider request cap in characters.
pub const CHUNK_LIMIT: usize = 2500;

/// Split text into chunks of at most `limit` characters, breaking only at
/// sentence boundaries. A single sentence longer than the limit becomes
/// its own oversized chunk rather than being cut mid-sentence.
pub fn split_at_sentences(text: &str, limit: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for sentence in sentences(text) {
        if !current.is_empty() && current.len() + sentence.len() + 1 > limit {
            chunks.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(&sentence);
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Sentences ending at '.', '!', or '?'. Runs of terminal punctuation
/// ("?!", "...") stay attached to their sentence.
fn sentences(text: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for piece in text.split_inclusive(['.', '!', '?']) {
        let trimmed = piece.trim();
        if trimmed.is_empty() {
            continue;
        }
        if !trimmed.chars().any(char::is_alphanumeric) {
            if let Some(last) = out.last_mut() {
                last.push_str(trimmed);
                continue;
            }
        }
        out.push(trimmed.to_string());
    }
    out
}

pub struct ElevenLabsStage {
    key: Option<String>,
    voice: String,
    client: Client,
}

impl ElevenLabsStage {
    pub fn new(key: Option<String>) -> Self {
        Self {
            key,
            voice: DEFAULT_VOICE.to_string(),
            client: Client::new(),
        }
    }

    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = voice.into();
        self
    }

    async fn synthesize_chunk(&self, key: &str, text: &str) -> StageResult<Vec<u8>> {
        let response = self
            .client
            .post(format!("{}/{}", API_URL, self.voice))
            .header("xi-api-key", key)
            .json(&json!({
                "text": text,
                "model_id": MODEL,
            }))
            .send()
            .await
            .map_err(|e| StageError::provider_failed("elevenlabs", e.to_string()))?;

        if !response.status().is_success() {
            return Err(StageError::provider_failed(
                "elevenlabs",
                format!("HTTP {}", response.status()),
            ));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| StageError::provider_failed("elevenlabs", e.to_string()))?;

        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl SpeechStage for ElevenLabsStage {
    fn is_available(&self) -> bool {
        self.key.is_some()
    }

    async fn synthesize(&self, text: &str) -> StageResult<Vec<u8>> {
        let key = self.key.clone().ok_or(StageError::Unavailable {
            provider: "elevenlabs",
        })?;

        let chunks = split_at_sentences(text, CHUNK_LIMIT);
        if chunks.is_empty() {
            return Err(StageError::provider_failed("elevenlabs", "empty text"));
        }

        info!(chunks = chunks.len(), chars = text.len(), "Synthesizing speech");

        let mut audio = Vec::new();
        for chunk in &chunks {
            let segment = self.synthesize_chunk(&key, chunk).await?;
            audio.extend_from_slice(&segment);
        }

        info!(bytes = audio.len(), "Speech synthesis complete");
        Ok(audio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_text_is_one_chunk() {
        let chunks = split_at_sentences("Hello there. How are you?", 100);
        assert_eq!(chunks, vec!["Hello there. How are you?"]);
    }

    #[test]
    fn test_split_happens_at_sentence_boundaries() {
        let text = "First sentence here. Second sentence here. Third one.";
        let chunks = split_at_sentences(text, 30);

        assert_eq!(chunks.len(), 3);
        for chunk in &chunks {
            assert!(chunk.ends_with('.'), "chunk not sentence-terminated: {chunk}");
        }
        // Order preserved, nothing lost
        assert_eq!(chunks.join(" "), text);
    }

    #[test]
    fn test_oversized_sentence_is_not_cut() {
        let long = format!("{}.", "word ".repeat(50).trim());
        let chunks = split_at_sentences(&long, 30);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0], long);
    }

    #[test]
    fn test_question_and_exclamation_boundaries() {
        let chunks = split_at_sentences("Really?! Yes! Quite sure.", 12);
        assert_eq!(chunks, vec!["Really?!", "Yes!", "Quite sure."]);
    }
}
