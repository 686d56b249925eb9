//! Generic submit-and-poll wrapper for asynchronous provider jobs.
//!
//! Providers expose "submit a unit of work, then poll until terminal".
//! The poller runs a fixed-interval loop against an absolute timeout
//! measured from submission time. Transient poll errors are logged and
//! skipped; only the timeout boundary terminates an unresponsive provider.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use crate::domain::{GenerationJob, JobStatus};
use crate::error::{StageError, StageResult};

/// Remote job status as reported by a provider, normalized by its client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteStatus {
    /// Queued or running
    InProgress,

    /// Terminal success; the full result payload is fetched separately
    Succeeded,

    /// Terminal failure. `content_policy` is set when the provider returned
    /// a structured content-policy code.
    Failed {
        message: String,
        content_policy: bool,
    },

    /// Terminal cancellation
    Cancelled { message: String },
}

/// A provider's job API: submit, check status, fetch the result payload.
///
/// Status and result are decoupled because some providers report terminal
/// success before the payload is retrievable from the same endpoint.
#[async_trait]
pub trait JobClient: Send + Sync {
    fn provider(&self) -> &'static str;

    /// Submit the payload, returning the provider's job id. Submission
    /// failure is non-retryable at this layer.
    async fn submit(&self, payload: Value) -> StageResult<String>;

    /// Poll the job's current status.
    async fn status(&self, job_id: &str) -> StageResult<RemoteStatus>;

    /// Fetch the full result payload of a succeeded job.
    async fn result(&self, job_id: &str) -> StageResult<Value>;
}

/// Polling cadence for one job type.
#[derive(Debug, Clone, Copy)]
pub struct PollConfig {
    /// Fixed interval between polls
    pub interval: Duration,

    /// Absolute timeout from submission time
    pub timeout: Duration,

    /// Invoke the progress callback every Nth poll
    pub progress_every: u32,
}

impl PollConfig {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval,
            timeout,
            progress_every: 3,
        }
    }
}

/// Coarse progress callback: (seconds since submission, status label).
pub type PollProgress<'a> = &'a (dyn Fn(u64, &str) + Send + Sync);

/// Fixed-interval poller bound to one cadence.
pub struct JobPoller {
    config: PollConfig,
}

impl JobPoller {
    pub fn new(config: PollConfig) -> Self {
        Self { config }
    }

    /// Submit a payload and return the pending job.
    pub async fn submit(&self, client: &dyn JobClient, payload: Value) -> StageResult<GenerationJob> {
        let id = client.submit(payload).await?;
        debug!(provider = client.provider(), job_id = %id, "Job submitted");
        Ok(GenerationJob::new(id, client.provider()))
    }

    /// Poll the job to a terminal state and return its result payload.
    ///
    /// Re-awaiting a job that already reached a terminal state returns the
    /// same outcome from the cached fields without touching the provider.
    pub async fn wait(
        &self,
        client: &dyn JobClient,
        job: &mut GenerationJob,
        progress: Option<PollProgress<'_>>,
    ) -> StageResult<Value> {
        if job.is_terminal() {
            return self.terminal_outcome(job);
        }

        let mut polls: u32 = 0;

        loop {
            if job.submitted_at.elapsed() >= self.config.timeout {
                job.status = JobStatus::TimedOut;
                return Err(StageError::Timeout {
                    provider: job.provider,
                    seconds: self.config.timeout.as_secs(),
                });
            }

            tokio::time::sleep(self.config.interval).await;
            polls += 1;

            let status = match client.status(&job.id).await {
                Ok(status) => status,
                Err(e) => {
                    // Transient poll failure: no-op poll, keep waiting.
                    warn!(provider = job.provider, job_id = %job.id, error = %e, "Poll failed, will retry");
                    continue;
                }
            };

            match status {
                RemoteStatus::InProgress => {
                    if polls % self.config.progress_every == 0 {
                        if let Some(cb) = progress {
                            cb(job.submitted_at.elapsed().as_secs(), "in_progress");
                        }
                    }
                }
                RemoteStatus::Succeeded => {
                    let result = client.result(&job.id).await?;
                    job.status = JobStatus::Succeeded;
                    job.result = Some(result.clone());
                    debug!(provider = job.provider, job_id = %job.id, "Job succeeded");
                    return Ok(result);
                }
                RemoteStatus::Failed {
                    message,
                    content_policy,
                } => {
                    job.status = JobStatus::Failed;
                    job.error = Some(message.clone());
                    if content_policy {
                        return Err(StageError::ContentPolicy {
                            provider: job.provider,
                        });
                    }
                    return Err(StageError::provider_failed(job.provider, message));
                }
                RemoteStatus::Cancelled { message } => {
                    job.status = JobStatus::Cancelled;
                    job.error = Some(message.clone());
                    return Err(StageError::provider_failed(job.provider, message));
                }
            }
        }
    }

    /// Replay a terminal job's outcome without re-submitting or re-polling.
    fn terminal_outcome(&self, job: &GenerationJob) -> StageResult<Value> {
        match job.status {
            JobStatus::Succeeded => job.result.clone().ok_or_else(|| {
                StageError::provider_failed(job.provider, "terminal job has no cached result")
            }),
            JobStatus::Failed | JobStatus::Cancelled => Err(StageError::provider_failed(
                job.provider,
                job.error.clone().unwrap_or_default(),
            )),
            JobStatus::TimedOut => Err(StageError::Timeout {
                provider: job.provider,
                seconds: self.config.timeout.as_secs(),
            }),
            JobStatus::Pending => unreachable!("terminal_outcome called on pending job"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct ScriptedClient {
        /// Number of InProgress polls before success
        in_progress_polls: u32,
        polls: AtomicU32,
        submits: AtomicU32,
    }

    impl ScriptedClient {
        fn new(in_progress_polls: u32) -> Self {
            Self {
                in_progress_polls,
                polls: AtomicU32::new(0),
                submits: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl JobClient for ScriptedClient {
        fn provider(&self) -> &'static str {
            "scripted"
        }

        async fn submit(&self, _payload: Value) -> StageResult<String> {
            self.submits.fetch_add(1, Ordering::SeqCst);
            Ok("job-1".to_string())
        }

        async fn status(&self, _job_id: &str) -> StageResult<RemoteStatus> {
            let n = self.polls.fetch_add(1, Ordering::SeqCst);
            if n < self.in_progress_polls {
                Ok(RemoteStatus::InProgress)
            } else {
                Ok(RemoteStatus::Succeeded)
            }
        }

        async fn result(&self, _job_id: &str) -> StageResult<Value> {
            Ok(serde_json::json!({"url": "https://cdn.example/out.mp4"}))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_until_success() {
        let client = ScriptedClient::new(2);
        let poller = JobPoller::new(PollConfig::new(
            Duration::from_secs(5),
            Duration::from_secs(120),
        ));

        let mut job = poller.submit(&client, serde_json::json!({})).await.unwrap();
        let result = poller.wait(&client, &mut job, None).await.unwrap();

        assert_eq!(result["url"], "https://cdn.example/out.mp4");
        assert_eq!(job.status, JobStatus::Succeeded);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rewait_returns_cached_result_without_resubmit() {
        let client = ScriptedClient::new(0);
        let poller = JobPoller::new(PollConfig::new(
            Duration::from_secs(5),
            Duration::from_secs(120),
        ));

        let mut job = poller.submit(&client, serde_json::json!({})).await.unwrap();
        let first = poller.wait(&client, &mut job, None).await.unwrap();
        let polls_after_first = client.polls.load(Ordering::SeqCst);

        let second = poller.wait(&client, &mut job, None).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(client.submits.load(Ordering::SeqCst), 1);
        assert_eq!(client.polls.load(Ordering::SeqCst), polls_after_first);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_absolute_from_submission() {
        struct NeverDone;

        #[async_trait]
        impl JobClient for NeverDone {
            fn provider(&self) -> &'static str {
                "neverdone"
            }
            async fn submit(&self, _payload: Value) -> StageResult<String> {
                Ok("job-2".to_string())
            }
            async fn status(&self, _job_id: &str) -> StageResult<RemoteStatus> {
                Ok(RemoteStatus::InProgress)
            }
            async fn result(&self, _job_id: &str) -> StageResult<Value> {
                unreachable!()
            }
        }

        let client = NeverDone;
        let poller = JobPoller::new(PollConfig::new(
            Duration::from_secs(10),
            Duration::from_secs(60),
        ));

        let mut job = poller.submit(&client, serde_json::json!({})).await.unwrap();
        let err = poller.wait(&client, &mut job, None).await.unwrap_err();

        assert!(matches!(err, StageError::Timeout { seconds: 60, .. }));
        assert_eq!(job.status, JobStatus::TimedOut);
    }

    #[tokio::test(start_paused = true)]
    async fn test_content_policy_failure_is_distinguished() {
        struct Flagged;

        #[async_trait]
        impl JobClient for Flagged {
            fn provider(&self) -> &'static str {
                "flagged"
            }
            async fn submit(&self, _payload: Value) -> StageResult<String> {
                Ok("job-3".to_string())
            }
            async fn status(&self, _job_id: &str) -> StageResult<RemoteStatus> {
                Ok(RemoteStatus::Failed {
                    message: "content policy".to_string(),
                    content_policy: true,
                })
            }
            async fn result(&self, _job_id: &str) -> StageResult<Value> {
                unreachable!()
            }
        }

        let poller = JobPoller::new(PollConfig::new(
            Duration::from_secs(5),
            Duration::from_secs(60),
        ));
        let mut job = poller.submit(&Flagged, serde_json::json!({})).await.unwrap();
        let err = poller.wait(&Flagged, &mut job, None).await.unwrap_err();

        assert!(err.is_content_policy());
        assert_eq!(job.status, JobStatus::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_poll_errors_are_skipped() {
        struct Flaky {
            polls: AtomicU32,
        }

        #[async_trait]
        impl JobClient for Flaky {
            fn provider(&self) -> &'static str {
                "flaky"
            }
            async fn submit(&self, _payload: Value) -> StageResult<String> {
                Ok("job-4".to_string())
            }
            async fn status(&self, _job_id: &str) -> StageResult<RemoteStatus> {
                let n = self.polls.fetch_add(1, Ordering::SeqCst);
                if n < 3 {
                    Err(StageError::provider_failed("flaky", "502 bad gateway"))
                } else {
                    Ok(RemoteStatus::Succeeded)
                }
            }
            async fn result(&self, _job_id: &str) -> StageResult<Value> {
                Ok(serde_json::json!({"ok": true}))
            }
        }

        let client = Flaky {
            polls: AtomicU32::new(0),
        };
        let poller = JobPoller::new(PollConfig::new(
            Duration::from_secs(5),
            Duration::from_secs(300),
        ));

        let mut job = poller.submit(&client, serde_json::json!({})).await.unwrap();
        let result = poller.wait(&client, &mut job, None).await.unwrap();
        assert_eq!(result["ok"], true);
    }
}
