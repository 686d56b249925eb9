//! Mutable working state of one pipeline request.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::scene::{Chapter, Scene};

/// State machine position of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum RunState {
    Planning,
    AssetGeneration,
    Assembly,
    Delivery,
    Done,
    Failed { error: String },
}

impl RunState {
    /// Stage index for progress reporting (Done/Failed share the last slot).
    pub fn stage_index(&self) -> usize {
        match self {
            Self::Planning => 0,
            Self::AssetGeneration => 1,
            Self::Assembly => 2,
            Self::Delivery => 3,
            Self::Done | Self::Failed { .. } => 4,
        }
    }
}

/// Working state owned exclusively by one orchestrator invocation.
///
/// No two concurrent requests share a work area; the directory is keyed by
/// requester identity and run id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    /// The request this run belongs to
    pub request_id: Uuid,

    /// Current state machine position
    pub state: RunState,

    /// Isolated scratch directory for this run
    pub work_dir: PathBuf,

    /// Ordered scene manifest (animated variants)
    pub scenes: Vec<Scene>,

    /// Ordered chapter manifest (narrated variant)
    pub chapters: Vec<Chapter>,

    /// Master audio track, once speech synthesis completes
    pub audio_path: Option<PathBuf>,

    /// Local asset paths accumulated during assembly (downloads, trims)
    pub asset_paths: Vec<PathBuf>,

    /// The single surviving output artifact
    pub output_path: Option<PathBuf>,

    /// Whether the one-time composition downgrade has been taken
    pub downgraded: bool,
}

impl PipelineRun {
    pub fn new(request_id: Uuid, work_dir: PathBuf) -> Self {
        Self {
            request_id,
            state: RunState::Planning,
            work_dir,
            scenes: Vec::new(),
            chapters: Vec::new(),
            audio_path: None,
            asset_paths: Vec::new(),
            output_path: None,
            downgraded: false,
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.state, RunState::Done | RunState::Failed { .. })
    }
}
