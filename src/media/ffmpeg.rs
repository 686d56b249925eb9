//! Thin ffmpeg/ffprobe wrapper.
//!
//! Every operation shells out to the system binaries with a hard timeout
//! and surfaces failures as `StageError::Assembly` carrying the operation
//! name and the tail of stderr. Filter graphs are built by pure functions
//! so the string construction is testable without ffmpeg installed.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use serde::Deserialize;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use crate::error::{StageError, StageResult};

/// Hard ceiling for a single ffmpeg invocation.
const OP_TIMEOUT: Duration = Duration::from_secs(300);

/// Crossfade length between consecutive chapter stills.
pub const FADE_SECONDS: f64 = 0.5;

const FPS: u32 = 30;
const FRAME_W: u32 = 1280;
const FRAME_H: u32 = 720;

async fn run(binary: &str, args: &[String], operation: &'static str) -> StageResult<Vec<u8>> {
    debug!(binary, operation, ?args, "Running media command");

    let child = Command::new(binary)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| StageError::assembly(operation, format!("failed to spawn {binary}: {e}")))?;

    let output = timeout(OP_TIMEOUT, child.wait_with_output())
        .await
        .map_err(|_| {
            StageError::assembly(
                operation,
                format!("{binary} exceeded {}s", OP_TIMEOUT.as_secs()),
            )
        })?
        .map_err(|e| StageError::assembly(operation, e.to_string()))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let tail: String = stderr
            .lines()
            .rev()
            .take(5)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect::<Vec<_>>()
            .join("\n");
        return Err(StageError::assembly(
            operation,
            format!(
                "{binary} exited with {}: {}",
                output.status.code().unwrap_or(-1),
                tail.trim()
            ),
        ));
    }

    Ok(output.stdout)
}

async fn run_ffmpeg(args: Vec<String>, operation: &'static str) -> StageResult<()> {
    let mut full = vec!["-y".to_string(), "-v".to_string(), "error".to_string()];
    full.extend(args);
    run("ffmpeg", &full, operation).await.map(|_| ())
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    format: ProbeFormat,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: String,
}

/// Duration of a media file in seconds, via ffprobe.
pub async fn probe_duration(path: &Path) -> StageResult<f64> {
    let args = vec![
        "-v".to_string(),
        "error".to_string(),
        "-show_entries".to_string(),
        "format=duration".to_string(),
        "-of".to_string(),
        "json".to_string(),
        path.display().to_string(),
    ];
    let stdout = run("ffprobe", &args, "probe").await?;

    let parsed: ProbeOutput = serde_json::from_slice(&stdout)
        .map_err(|e| StageError::assembly("probe", e.to_string()))?;
    parsed
        .format
        .duration
        .parse::<f64>()
        .map_err(|e| StageError::assembly("probe", format!("bad duration: {e}")))
}

/// Re-encode `input` keeping only the first `seconds`.
pub async fn trim_to(input: &Path, output: &Path, seconds: f64) -> StageResult<()> {
    run_ffmpeg(
        vec![
            "-i".to_string(),
            input.display().to_string(),
            "-t".to_string(),
            format!("{seconds:.3}"),
            "-c:v".to_string(),
            "libx264".to_string(),
            "-preset".to_string(),
            "fast".to_string(),
            "-c:a".to_string(),
            "aac".to_string(),
            output.display().to_string(),
        ],
        "trim",
    )
    .await
}

/// Slow pan/zoom applied to a still image. Effects are cycled across
/// chapters so consecutive stills move differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KenBurnsEffect {
    ZoomIn,
    ZoomOut,
    PanRight,
    PanLeft,
}

impl KenBurnsEffect {
    pub fn for_index(index: usize) -> Self {
        match index % 4 {
            0 => Self::ZoomIn,
            1 => Self::ZoomOut,
            2 => Self::PanRight,
            _ => Self::PanLeft,
        }
    }

    /// zoompan expression for this effect over `frames` output frames.
    fn zoompan(&self, frames: u64) -> String {
        let span = format!("d={frames}:s={FRAME_W}x{FRAME_H}:fps={FPS}");
        match self {
            Self::ZoomIn => format!(
                "zoompan=z='min(zoom+0.0015,1.15)':x='iw/2-(iw/zoom/2)':y='ih/2-(ih/zoom/2)':{span}"
            ),
            Self::ZoomOut => format!(
                "zoompan=z='if(lte(zoom,1.0),1.15,max(1.0,zoom-0.0015))':x='iw/2-(iw/zoom/2)':y='ih/2-(ih/zoom/2)':{span}"
            ),
            Self::PanRight => format!(
                "zoompan=z=1.15:x='(iw-iw/zoom)*on/{frames}':y='ih/2-(ih/zoom/2)':{span}"
            ),
            Self::PanLeft => format!(
                "zoompan=z=1.15:x='(iw-iw/zoom)*(1-on/{frames})':y='ih/2-(ih/zoom/2)':{span}"
            ),
        }
    }
}

/// Render a still image into a moving clip of `seconds` length.
pub async fn ken_burns(
    image: &Path,
    output: &Path,
    seconds: f64,
    effect: KenBurnsEffect,
) -> StageResult<()> {
    let frames = (seconds * FPS as f64).round().max(1.0) as u64;
    let filter = format!(
        "scale=8000:-1,{},format=yuv420p",
        effect.zoompan(frames)
    );
    run_ffmpeg(
        vec![
            "-loop".to_string(),
            "1".to_string(),
            "-i".to_string(),
            image.display().to_string(),
            "-vf".to_string(),
            filter,
            "-t".to_string(),
            format!("{seconds:.3}"),
            "-r".to_string(),
            FPS.to_string(),
            "-c:v".to_string(),
            "libx264".to_string(),
            "-crf".to_string(),
            "20".to_string(),
            "-pix_fmt".to_string(),
            "yuv420p".to_string(),
            output.display().to_string(),
        ],
        "ken_burns",
    )
    .await
}

/// Crossfade offsets for a chain of clips: each transition starts `fade`
/// seconds before the end of the accumulated output so far.
pub fn xfade_offsets(durations: &[f64], fade: f64) -> Vec<f64> {
    let mut offsets = Vec::new();
    let mut total = 0.0;
    for (i, duration) in durations.iter().enumerate() {
        if i + 1 == durations.len() {
            break;
        }
        // Each crossfade shortens the running total by the overlap
        total += duration - if i == 0 { 0.0 } else { fade };
        offsets.push(total - fade);
    }
    offsets
}

/// Filter graph crossfading `n` inputs at the given offsets.
fn xfade_filter(n: usize, offsets: &[f64], fade: f64) -> String {
    let mut parts = Vec::new();
    let mut prev = "[0:v]".to_string();
    for (i, offset) in offsets.iter().enumerate() {
        let label = if i + 2 == n {
            "[vout]".to_string()
        } else {
            format!("[x{i}]")
        };
        parts.push(format!(
            "{prev}[{}:v]xfade=transition=fade:duration={fade}:offset={offset:.3}{label}",
            i + 1
        ));
        prev = label;
    }
    parts.join(";")
}

/// Join clips with crossfade transitions. Single-clip input is copied.
pub async fn xfade_concat(inputs: &[PathBuf], output: &Path) -> StageResult<()> {
    match inputs.len() {
        0 => return Err(StageError::assembly("xfade", "no clips to join")),
        1 => {
            tokio::fs::copy(&inputs[0], output)
                .await
                .map_err(|e| StageError::assembly("xfade", e.to_string()))?;
            return Ok(());
        }
        _ => {}
    }

    let mut durations = Vec::with_capacity(inputs.len());
    for input in inputs {
        durations.push(probe_duration(input).await?);
    }
    let offsets = xfade_offsets(&durations, FADE_SECONDS);
    let filter = xfade_filter(inputs.len(), &offsets, FADE_SECONDS);

    let mut args = Vec::new();
    for input in inputs {
        args.push("-i".to_string());
        args.push(input.display().to_string());
    }
    args.extend([
        "-filter_complex".to_string(),
        filter,
        "-map".to_string(),
        "[vout]".to_string(),
        "-c:v".to_string(),
        "libx264".to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        output.display().to_string(),
    ]);
    run_ffmpeg(args, "xfade").await
}

async fn write_concat_list(inputs: &[PathBuf], list_path: &Path) -> StageResult<()> {
    if inputs.is_empty() {
        return Err(StageError::assembly("concat", "no clips to join"));
    }

    let mut list = String::new();
    for input in inputs {
        // Concat demuxer quoting: single quotes around the path
        list.push_str(&format!("file '{}'\n", input.display()));
    }
    tokio::fs::write(list_path, list)
        .await
        .map_err(|e| StageError::assembly("concat", e.to_string()))
}

/// Fit any input into the output frame: scale down preserving aspect,
/// pad the rest.
fn pad_to_frame_filter() -> String {
    format!(
        "scale={FRAME_W}:{FRAME_H}:force_original_aspect_ratio=decrease,\
         pad={FRAME_W}:{FRAME_H}:(ow-iw)/2:(oh-ih)/2"
    )
}

/// Join clips back to back with the concat demuxer, re-encoding the
/// result. Inputs with differing codec parameters would silently corrupt
/// a stream copy, so everything goes through the encoder.
pub async fn concat_encode(inputs: &[PathBuf], list_path: &Path, output: &Path) -> StageResult<()> {
    write_concat_list(inputs, list_path).await?;

    run_ffmpeg(
        vec![
            "-f".to_string(),
            "concat".to_string(),
            "-safe".to_string(),
            "0".to_string(),
            "-i".to_string(),
            list_path.display().to_string(),
            "-c:v".to_string(),
            "libx264".to_string(),
            "-preset".to_string(),
            "medium".to_string(),
            "-c:a".to_string(),
            "aac".to_string(),
            "-movflags".to_string(),
            "+faststart".to_string(),
            output.display().to_string(),
        ],
        "concat",
    )
    .await
}

/// Join mixed-source footage into one silent track of `seconds` length.
/// Every input is decoded, scaled and padded into the output frame, and
/// re-encoded at a fixed frame rate, so clips of any resolution or codec
/// join cleanly.
pub async fn concat_normalize(
    inputs: &[PathBuf],
    list_path: &Path,
    output: &Path,
    seconds: f64,
) -> StageResult<()> {
    write_concat_list(inputs, list_path).await?;

    run_ffmpeg(
        vec![
            "-f".to_string(),
            "concat".to_string(),
            "-safe".to_string(),
            "0".to_string(),
            "-i".to_string(),
            list_path.display().to_string(),
            "-t".to_string(),
            format!("{seconds:.3}"),
            "-c:v".to_string(),
            "libx264".to_string(),
            "-preset".to_string(),
            "medium".to_string(),
            "-vf".to_string(),
            pad_to_frame_filter(),
            "-r".to_string(),
            FPS.to_string(),
            "-an".to_string(),
            output.display().to_string(),
        ],
        "concat",
    )
    .await
}

/// Mux a video track with a narration track, cutting the result to the
/// narration's length.
pub async fn mux_with_audio(
    video: &Path,
    audio: &Path,
    output: &Path,
    audio_seconds: f64,
) -> StageResult<()> {
    run_ffmpeg(
        vec![
            "-i".to_string(),
            video.display().to_string(),
            "-i".to_string(),
            audio.display().to_string(),
            "-map".to_string(),
            "0:v".to_string(),
            "-map".to_string(),
            "1:a".to_string(),
            "-c:v".to_string(),
            "copy".to_string(),
            "-c:a".to_string(),
            "aac".to_string(),
            "-t".to_string(),
            format!("{audio_seconds:.3}"),
            output.display().to_string(),
        ],
        "mux",
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn test_xfade_offsets_accumulate_minus_fade() {
        // Three 8s clips, 0.5s fade: transitions at 7.5 and 15.0
        let offsets = xfade_offsets(&[8.0, 8.0, 8.0], 0.5);
        assert_eq!(offsets.len(), 2);
        assert!(close(offsets[0], 7.5));
        assert!(close(offsets[1], 15.0));
    }

    #[test]
    fn test_xfade_offsets_uneven_durations() {
        let offsets = xfade_offsets(&[5.0, 3.0, 7.0], 0.5);
        assert!(close(offsets[0], 4.5));
        // 5.0 + (3.0 - 0.5) - 0.5
        assert!(close(offsets[1], 7.0));
    }

    #[test]
    fn test_xfade_offsets_trivial_inputs() {
        assert!(xfade_offsets(&[], 0.5).is_empty());
        assert!(xfade_offsets(&[8.0], 0.5).is_empty());
    }

    #[test]
    fn test_xfade_filter_labels() {
        let filter = xfade_filter(3, &[7.5, 15.0], 0.5);
        assert!(filter.starts_with("[0:v][1:v]xfade="));
        assert!(filter.contains("offset=7.500[x0]"));
        assert!(filter.contains("[x0][2:v]xfade="));
        assert!(filter.ends_with("[vout]"));
    }

    #[test]
    fn test_pad_to_frame_filter_targets_output_frame() {
        let filter = pad_to_frame_filter();
        assert!(filter.contains("scale=1280:720:force_original_aspect_ratio=decrease"));
        assert!(filter.contains("pad=1280:720:(ow-iw)/2:(oh-ih)/2"));
    }

    #[test]
    fn test_ken_burns_effect_cycle() {
        assert_eq!(KenBurnsEffect::for_index(0), KenBurnsEffect::ZoomIn);
        assert_eq!(KenBurnsEffect::for_index(1), KenBurnsEffect::ZoomOut);
        assert_eq!(KenBurnsEffect::for_index(2), KenBurnsEffect::PanRight);
        assert_eq!(KenBurnsEffect::for_index(3), KenBurnsEffect::PanLeft);
        assert_eq!(KenBurnsEffect::for_index(4), KenBurnsEffect::ZoomIn);
    }

    #[test]
    fn test_zoompan_duration_matches_frames() {
        let expr = KenBurnsEffect::ZoomIn.zoompan(150);
        assert!(expr.contains("d=150"));
        assert!(expr.contains("s=1280x720"));
        assert!(expr.contains("fps=30"));
    }
}
