//! Pipeline requests.
//!
//! A request is created when a user confirms a variant + parameter choice
//! and is read-only from then on. All per-request state lives in
//! [`crate::domain::PipelineRun`], never in ambient per-user globals.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Immutable input for one pipeline execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRequest {
    /// Unique identifier for this request
    pub id: Uuid,

    /// Requester identity; keys the isolated work area
    pub requester: String,

    /// Topic, or quoted source content (e.g. tweet text) for reaction videos
    pub source_text: String,

    /// Chosen pipeline variant with its cardinality parameter
    pub variant: PipelineVariant,

    /// When the user confirmed the request
    pub created_at: DateTime<Utc>,
}

impl PipelineRequest {
    pub fn new(requester: impl Into<String>, source_text: impl Into<String>, variant: PipelineVariant) -> Self {
        Self {
            id: Uuid::new_v4(),
            requester: requester.into(),
            source_text: source_text.into(),
            variant,
            created_at: Utc::now(),
        }
    }
}

/// The content shape being produced, with its cardinality parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "variant")]
pub enum PipelineVariant {
    /// Short-form animated video built from N generated scenes
    AnimatedShort { scenes: u32 },

    /// Reaction video to a tweet: context analysis feeds scene planning
    TweetReaction { scenes: u32 },

    /// Long-form narrated video targeting a duration in minutes
    Narrated { minutes: u32 },

    /// Single avatar/narrative clip of roughly the given length
    Avatar { seconds: u32 },
}

impl PipelineVariant {
    /// Human-readable name used in progress messages and logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::AnimatedShort { .. } => "animated_short",
            Self::TweetReaction { .. } => "tweet_reaction",
            Self::Narrated { .. } => "narrated",
            Self::Avatar { .. } => "avatar",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_is_self_contained() {
        let req = PipelineRequest::new(
            "user-42",
            "the history of lighthouses",
            PipelineVariant::Narrated { minutes: 10 },
        );

        assert_eq!(req.requester, "user-42");
        assert_eq!(req.variant, PipelineVariant::Narrated { minutes: 10 });
        assert_eq!(req.variant.name(), "narrated");
    }

    #[test]
    fn test_variant_serialization() {
        let variant = PipelineVariant::AnimatedShort { scenes: 4 };
        let json = serde_json::to_string(&variant).unwrap();
        let parsed: PipelineVariant = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, variant);
    }
}
