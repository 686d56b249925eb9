//! Scenes and chapters: the narrative+visual units of a video.
//!
//! The planning stage creates the ordered list; later stages attach the
//! produced asset URLs in place. Order is narratively significant — the
//! first scene's image is reused as a reference so the character stays
//! visually consistent across the run.

use serde::{Deserialize, Serialize};

/// One unit of a short-form animated video.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scene {
    /// Short scene name (1-2 words)
    pub name: String,

    /// Prompt for still-image generation
    pub image_prompt: String,

    /// Prompt for animating the image, including spoken dialogue
    pub animation_prompt: String,

    /// Target clip length in seconds ("8s" dialogue / "4s" transition in
    /// the planner's output)
    pub duration_secs: u32,

    /// Produced still-image URL, attached by the image stage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,

    /// Produced animated-clip URL, attached by the animation stage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clip_url: Option<String>,
}

impl Scene {
    /// The clip URL, once the animation stage has attached a usable one.
    pub fn assemblable_clip(&self) -> Option<&str> {
        self.clip_url.as_deref().filter(|u| !u.is_empty())
    }
}

/// One chapter of a long-form narrated video.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chapter {
    /// Short chapter title (2-5 words)
    pub title: String,

    /// Spoken narration text
    pub narration: String,

    /// Image-generation prompt for the chapter's visual slide
    pub visual: String,

    /// Produced slide-image URL, attached by the image stage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl Chapter {
    pub fn narration_word_count(&self) -> usize {
        self.narration.split_whitespace().count()
    }
}

/// The structured output of the chaptered script stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredScript {
    pub chapters: Vec<Chapter>,
}

impl StructuredScript {
    /// Total narration word count across chapters.
    pub fn word_count(&self) -> usize {
        self.chapters.iter().map(|c| c.narration_word_count()).sum()
    }

    /// The full narration in chapter order, as fed to speech synthesis.
    pub fn joined_narration(&self) -> String {
        self.chapters
            .iter()
            .map(|c| c.narration.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Chapter count scales with target length, clamped to a sane range.
pub fn chapter_count_for_minutes(minutes: u32) -> u32 {
    (minutes * 2).saturating_sub(2).clamp(4, 16)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assemblable_clip_requires_a_clip_url() {
        let mut scene = Scene {
            name: "intro".to_string(),
            image_prompt: "a lighthouse at dusk".to_string(),
            animation_prompt: "the beam sweeps across the sea".to_string(),
            duration_secs: 8,
            image_url: None,
            clip_url: None,
        };
        assert!(scene.assemblable_clip().is_none());

        scene.clip_url = Some(String::new());
        assert!(scene.assemblable_clip().is_none());

        scene.clip_url = Some("https://cdn.example/clip0.mp4".to_string());
        assert_eq!(scene.assemblable_clip(), Some("https://cdn.example/clip0.mp4"));
    }

    #[test]
    fn test_chapter_count_clamping() {
        assert_eq!(chapter_count_for_minutes(1), 4); // floor
        assert_eq!(chapter_count_for_minutes(3), 4);
        assert_eq!(chapter_count_for_minutes(5), 8);
        assert_eq!(chapter_count_for_minutes(10), 16);
        assert_eq!(chapter_count_for_minutes(20), 16); // ceiling
    }

    #[test]
    fn test_structured_script_word_count() {
        let script = StructuredScript {
            chapters: vec![
                Chapter {
                    title: "Hook".to_string(),
                    narration: "one two three".to_string(),
                    visual: "x".to_string(),
                    image_url: None,
                },
                Chapter {
                    title: "Body".to_string(),
                    narration: "four five".to_string(),
                    visual: "y".to_string(),
                    image_url: None,
                },
            ],
        };
        assert_eq!(script.word_count(), 5);
        assert!(script.joined_narration().contains("four five"));
    }
}
