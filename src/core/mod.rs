//! Pipeline core: orchestration, job polling, progress, work areas.

pub mod orchestrator;
pub mod poller;
pub mod progress;
pub mod workdir;

pub use orchestrator::{Orchestrator, Stages};
pub use poller::{JobClient, JobPoller, PollConfig, RemoteStatus};
pub use progress::{LogProgress, NullProgress, ProgressSink};
pub use workdir::WorkArea;
