//! Local media processing: ffmpeg invocation and per-mode assembly.

pub mod assembly;
pub mod ffmpeg;

pub use assembly::{allocate_chapter_durations, Assembler, AssemblyEngine, ChapterStill};
pub use ffmpeg::{xfade_offsets, KenBurnsEffect};
