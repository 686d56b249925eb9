//! videoforge - prompt-to-video pipeline
//!
//! Turns a confirmed request (topic or source post plus a variant choice)
//! into a finished, delivered video by coordinating external generation
//! providers and local ffmpeg assembly.
//!
//! # Architecture
//!
//! - `domain`: requests, runs, scenes and chapters
//! - `adapters`: one module per external provider, normalized onto stage
//!   traits
//! - `core`: the orchestrator state machine, the generic job poller,
//!   per-request work areas, and progress reporting
//! - `media`: ffmpeg invocation and the three assembly modes
//! - `cli`: command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Short-form animated video from a topic
//! videoforge animate "a lighthouse keeper and her cat" --scenes 4
//!
//! # Long-form narrated video
//! videoforge narrate "the history of lighthouses" --minutes 10
//!
//! # Check which providers are configured
//! videoforge config
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod error;
pub mod media;

// Re-export main types at crate root for convenience
pub use crate::core::{Orchestrator, Stages};
pub use domain::{PipelineRequest, PipelineRun, PipelineVariant, RunState};
pub use error::{StageError, StageResult};
