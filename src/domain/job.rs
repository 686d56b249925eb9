//! Asynchronous provider jobs.
//!
//! A job is created on submit and mutated only by polling. Once resolved
//! it is terminal: re-awaiting returns the cached outcome without another
//! submission. Jobs are never persisted beyond the request lifetime.

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Status of a remote generation job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Succeeded,
    Failed,
    TimedOut,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// A single unit of work submitted to a provider.
#[derive(Debug, Clone)]
pub struct GenerationJob {
    /// Provider-issued submission id
    pub id: String,

    /// Provider name, used in errors and logs
    pub provider: &'static str,

    /// Current status; terminal once resolved
    pub status: JobStatus,

    /// Submission time; the absolute timeout is measured from here, not
    /// from the last poll
    pub submitted_at: Instant,

    /// Raw provider result payload, present once succeeded
    pub result: Option<serde_json::Value>,

    /// Terminal failure message, present once failed/cancelled
    pub error: Option<String>,
}

impl GenerationJob {
    pub fn new(id: String, provider: &'static str) -> Self {
        Self {
            id,
            provider,
            status: JobStatus::Pending,
            submitted_at: Instant::now(),
            result: None,
            error: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(JobStatus::Succeeded.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::TimedOut.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_new_job_is_pending() {
        let job = GenerationJob::new("task-123".to_string(), "fal");
        assert_eq!(job.status, JobStatus::Pending);
        assert!(job.result.is_none());
        assert!(!job.is_terminal());
    }
}
