//! Progress reporting to the front end.
//!
//! Every state transition and long-running stage emits a coarse update
//! through an injected sink. This is the only coupling between the
//! pipeline core and whatever collects user-visible status.

use async_trait::async_trait;
use tracing::info;

/// Receives coarse progress updates for one request.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    /// `stage` is the 0-based stage index, `total` the number of stages for
    /// this variant, `message` a short human-readable status line.
    async fn update(&self, stage: usize, total: usize, message: &str);
}

/// Default sink that writes progress to the log.
pub struct LogProgress;

#[async_trait]
impl ProgressSink for LogProgress {
    async fn update(&self, stage: usize, total: usize, message: &str) {
        info!("[{}/{}] {}", stage + 1, total, message);
    }
}

/// Sink that drops everything; used where no front end is attached.
pub struct NullProgress;

#[async_trait]
impl ProgressSink for NullProgress {
    async fn update(&self, _stage: usize, _total: usize, _message: &str) {}
}
