//! Data structures shared across the pipeline.

pub mod job;
pub mod request;
pub mod run;
pub mod scene;

pub use job::{GenerationJob, JobStatus};
pub use request::{PipelineRequest, PipelineVariant};
pub use run::{PipelineRun, RunState};
pub use scene::{chapter_count_for_minutes, Chapter, Scene, StructuredScript};
