//! Turns generated assets into a single finished video.
//!
//! Three modes, one per pipeline shape:
//! - scene clips: per-scene AI videos trimmed and joined in order
//! - stills: chapter images rendered with slow pan/zoom, crossfaded and
//!   timed against the narration, then muxed
//! - stock: searched footage shuffled and looped to cover the narration
//!
//! All intermediates live in the caller's work area; the assembler never
//! writes outside it.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use rand::seq::SliceRandom;
use reqwest::Client;
use tracing::{info, warn};

use super::ffmpeg::{self, KenBurnsEffect};
use crate::error::{StageError, StageResult};

/// Minimum seconds a chapter's still stays on screen.
const CHAPTER_FLOOR_SECONDS: f64 = 3.0;

/// AI video models pad the end of a clip; the last second is cut.
const TAIL_TRIM_SECONDS: f64 = 1.0;

/// Split a narration's total length across chapters in proportion to their
/// word counts, holding a floor so short chapters stay readable. The
/// returned durations sum to `total_seconds` exactly (floor permitting).
pub fn allocate_chapter_durations(word_counts: &[usize], total_seconds: f64) -> Vec<f64> {
    let n = word_counts.len();
    if n == 0 {
        return Vec::new();
    }
    // Not enough time for every chapter to hold the floor: equal split
    if total_seconds <= CHAPTER_FLOOR_SECONDS * n as f64 {
        return vec![total_seconds / n as f64; n];
    }

    let total_words: usize = word_counts.iter().sum();
    let weights: Vec<f64> = if total_words == 0 {
        vec![1.0 / n as f64; n]
    } else {
        word_counts
            .iter()
            .map(|&w| w as f64 / total_words as f64)
            .collect()
    };

    // Waterfill: chapters that would fall under the floor are pinned to it
    // and the remaining time is re-split over the rest.
    let mut durations = vec![0.0; n];
    let mut pinned = vec![false; n];
    loop {
        let pinned_total: f64 = pinned.iter().filter(|&&p| p).count() as f64 * CHAPTER_FLOOR_SECONDS;
        let remaining = total_seconds - pinned_total;
        let free_weight: f64 = weights
            .iter()
            .zip(&pinned)
            .filter(|(_, &p)| !p)
            .map(|(w, _)| w)
            .sum();

        if free_weight <= 0.0 {
            break;
        }

        let mut changed = false;
        for i in 0..n {
            if pinned[i] {
                continue;
            }
            let share = weights[i] / free_weight * remaining;
            if share < CHAPTER_FLOOR_SECONDS {
                durations[i] = CHAPTER_FLOOR_SECONDS;
                pinned[i] = true;
                changed = true;
            } else {
                durations[i] = share;
            }
        }
        if !changed {
            break;
        }
    }

    durations
}

/// One chapter's render input: the still image plus its narration weight.
#[derive(Debug, Clone)]
pub struct ChapterStill {
    pub image: PathBuf,
    pub narration_words: usize,
}

/// The assembly operations the orchestrator drives. All paths are rooted
/// in the caller's work area.
#[async_trait]
pub trait AssemblyEngine: Send + Sync {
    /// Fetch a remote asset into the work area under `name`.
    async fn download(&self, work: &Path, url: &str, name: &str) -> StageResult<PathBuf>;

    /// Clip-per-scene mode: trim each clip's tail, hard-cut join in order.
    async fn assemble_scene_clips(&self, work: &Path, clips: &[PathBuf]) -> StageResult<PathBuf>;

    /// Still-image mode: pan/zoom each chapter image, crossfade, mux.
    async fn assemble_stills(
        &self,
        work: &Path,
        chapters: &[ChapterStill],
        audio: &Path,
    ) -> StageResult<PathBuf>;

    /// Stock-footage mode: loop shuffled clips to cover the narration.
    async fn assemble_stock(
        &self,
        work: &Path,
        clips: &[PathBuf],
        audio: &Path,
    ) -> StageResult<PathBuf>;
}

/// The ffmpeg-backed engine.
pub struct Assembler {
    client: Client,
}

impl Default for Assembler {
    fn default() -> Self {
        Self::new()
    }
}

impl Assembler {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }
}

#[async_trait]
impl AssemblyEngine for Assembler {
    async fn download(&self, work: &Path, url: &str, name: &str) -> StageResult<PathBuf> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| StageError::assembly("download", e.to_string()))?;

        if !response.status().is_success() {
            return Err(StageError::assembly(
                "download",
                format!("HTTP {} for {}", response.status(), url),
            ));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| StageError::assembly("download", e.to_string()))?;

        let dest = work.join(name);
        tokio::fs::write(&dest, &bytes)
            .await
            .map_err(|e| StageError::assembly("download", e.to_string()))?;

        info!(url, bytes = bytes.len(), dest = %dest.display(), "Downloaded asset");
        Ok(dest)
    }

    async fn assemble_scene_clips(&self, work: &Path, clips: &[PathBuf]) -> StageResult<PathBuf> {
        if clips.is_empty() {
            return Err(StageError::assembly("scene clips", "no clips to assemble"));
        }

        let mut trimmed = Vec::with_capacity(clips.len());
        for (i, clip) in clips.iter().enumerate() {
            let duration = ffmpeg::probe_duration(clip).await?;
            if duration > TAIL_TRIM_SECONDS + 1.0 {
                let out = work.join(format!("trimmed_{i}.mp4"));
                ffmpeg::trim_to(clip, &out, duration - TAIL_TRIM_SECONDS).await?;
                trimmed.push(out);
            } else {
                // Too short to trim; use as-is
                trimmed.push(clip.clone());
            }
        }

        let output = work.join("final.mp4");
        ffmpeg::concat_encode(&trimmed, &work.join("scenes.txt"), &output).await?;
        info!(scenes = clips.len(), "Assembled scene clips");
        Ok(output)
    }

    async fn assemble_stills(
        &self,
        work: &Path,
        chapters: &[ChapterStill],
        audio: &Path,
    ) -> StageResult<PathBuf> {
        if chapters.is_empty() {
            return Err(StageError::assembly("stills", "no chapter images"));
        }

        let audio_seconds = ffmpeg::probe_duration(audio).await?;
        let word_counts: Vec<usize> = chapters.iter().map(|c| c.narration_words).collect();

        // Each crossfade overlaps its neighbours by the fade length, so the
        // joined track comes out (n-1)*fade shorter than the clips sum to.
        // Allocate over the padded total so the visual track matches the
        // narration exactly.
        let overlap = ffmpeg::FADE_SECONDS * chapters.len().saturating_sub(1) as f64;
        let durations = allocate_chapter_durations(&word_counts, audio_seconds + overlap);

        let mut rendered = Vec::with_capacity(chapters.len());
        for (i, (chapter, seconds)) in chapters.iter().zip(&durations).enumerate() {
            let out = work.join(format!("still_{i}.mp4"));
            ffmpeg::ken_burns(&chapter.image, &out, *seconds, KenBurnsEffect::for_index(i)).await?;
            rendered.push(out);
        }

        let silent = work.join("stills_joined.mp4");
        ffmpeg::xfade_concat(&rendered, &silent).await?;

        let output = work.join("final.mp4");
        ffmpeg::mux_with_audio(&silent, audio, &output, audio_seconds).await?;
        info!(
            chapters = chapters.len(),
            seconds = audio_seconds,
            "Assembled still-image video"
        );
        Ok(output)
    }

    async fn assemble_stock(
        &self,
        work: &Path,
        clips: &[PathBuf],
        audio: &Path,
    ) -> StageResult<PathBuf> {
        if clips.is_empty() {
            return Err(StageError::assembly("stock", "no footage clips"));
        }

        let audio_seconds = ffmpeg::probe_duration(audio).await?;

        let mut durations = Vec::with_capacity(clips.len());
        for clip in clips {
            durations.push(ffmpeg::probe_duration(clip).await?);
        }
        let pass_total: f64 = durations.iter().sum();
        if pass_total <= 0.0 {
            return Err(StageError::assembly("stock", "footage has zero duration"));
        }

        let mut playlist = Vec::new();
        let mut covered = 0.0;
        let mut order: Vec<usize> = (0..clips.len()).collect();
        while covered < audio_seconds {
            // ThreadRng is not Send; keep it out of scope across awaits
            order.shuffle(&mut rand::thread_rng());
            for &i in &order {
                playlist.push(clips[i].clone());
                covered += durations[i];
                if covered >= audio_seconds {
                    break;
                }
            }
        }
        if playlist.len() > clips.len() {
            warn!(
                passes = playlist.len().div_ceil(clips.len()),
                "Looping footage to cover narration"
            );
        }

        let silent = work.join("stock_joined.mp4");
        ffmpeg::concat_normalize(&playlist, &work.join("stock.txt"), &silent, audio_seconds).await?;

        let output = work.join("final.mp4");
        ffmpeg::mux_with_audio(&silent, audio, &output, audio_seconds).await?;
        info!(
            clips = clips.len(),
            entries = playlist.len(),
            seconds = audio_seconds,
            "Assembled stock-footage video"
        );
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn test_durations_proportional_to_words() {
        let durations = allocate_chapter_durations(&[100, 200, 100], 40.0);
        assert!(close(durations[0], 10.0));
        assert!(close(durations[1], 20.0));
        assert!(close(durations[2], 10.0));
        assert!(close(durations.iter().sum::<f64>(), 40.0));
    }

    #[test]
    fn test_short_chapter_holds_floor() {
        // 10 words of 1010 would get ~0.6s of 60; pinned to 3s instead
        let durations = allocate_chapter_durations(&[10, 500, 500], 60.0);
        assert!(close(durations[0], 3.0));
        assert!(close(durations[1], 28.5));
        assert!(close(durations[2], 28.5));
        assert!(close(durations.iter().sum::<f64>(), 60.0));
    }

    #[test]
    fn test_total_too_small_for_floor_splits_equally() {
        let durations = allocate_chapter_durations(&[10, 500], 4.0);
        assert!(close(durations[0], 2.0));
        assert!(close(durations[1], 2.0));
    }

    #[test]
    fn test_zero_word_counts_split_equally() {
        let durations = allocate_chapter_durations(&[0, 0, 0], 30.0);
        for d in &durations {
            assert!(close(*d, 10.0));
        }
    }

    #[test]
    fn test_empty_chapters() {
        assert!(allocate_chapter_durations(&[], 30.0).is_empty());
    }

    #[test]
    fn test_crossfaded_allocation_covers_the_audio_exactly() {
        // Allocation is padded by the total crossfade overlap, so the
        // joined track (clip sum minus overlaps) equals the audio length
        let audio = 40.0;
        let words = [120usize, 80, 200];
        let overlap = ffmpeg::FADE_SECONDS * (words.len() - 1) as f64;

        let durations = allocate_chapter_durations(&words, audio + overlap);
        let offsets = ffmpeg::xfade_offsets(&durations, ffmpeg::FADE_SECONDS);
        let joined = offsets.last().unwrap() + durations.last().unwrap();

        assert!(close(durations.iter().sum::<f64>(), audio + overlap));
        assert!(close(joined, audio));
    }

    #[test]
    fn test_engine_futures_are_send() {
        // The orchestrator spawns these across await points; the futures
        // must stay Send even with the shuffling rng in assemble_stock
        fn assert_send<T: Send>(_: T) {}

        let engine = Assembler::new();
        let work = Path::new("/tmp");
        assert_send(engine.assemble_stock(work, &[], Path::new("/tmp/narration.mp3")));
        assert_send(engine.assemble_scene_clips(work, &[]));
    }
}
