//! Error taxonomy for pipeline stages.
//!
//! Every provider call, poll loop, and assembly operation resolves into one
//! of these kinds. The orchestrator makes its fallback and retry decisions
//! on the variant, never on message text.

use thiserror::Error;

/// A failure at some stage of the pipeline.
#[derive(Debug, Error)]
pub enum StageError {
    /// The capability is not configured (missing credential). Checked before
    /// any network call; never retried.
    #[error("{provider} is not configured")]
    Unavailable { provider: &'static str },

    /// The provider rejected the submission itself (bad request, malformed
    /// response at submit time). Not retryable at this layer.
    #[error("submission to {provider} failed: {message}")]
    Submission {
        provider: &'static str,
        message: String,
    },

    /// The job reached a terminal failure state at the provider.
    #[error("{provider} job failed: {message}")]
    ProviderFailed {
        provider: &'static str,
        message: String,
    },

    /// The job never reached a terminal state within its absolute timeout.
    #[error("{provider} job timed out after {seconds}s")]
    Timeout { provider: &'static str, seconds: u64 },

    /// Provider refused the prompt on content-policy grounds. Eligible for
    /// exactly one sanitize-and-retry.
    #[error("{provider} rejected the prompt (content policy)")]
    ContentPolicy { provider: &'static str },

    /// Structured response did not match the expected shape.
    #[error("failed to parse {what}: {message}")]
    Parse { what: &'static str, message: String },

    /// Download, trim, concatenation, or mux failure, with the offending
    /// operation identified.
    #[error("assembly failed during {operation}: {message}")]
    Assembly {
        operation: &'static str,
        message: String,
    },

    /// Handing the finished file to the delivery or publishing sink failed.
    #[error("delivery failed: {message}")]
    Delivery { message: String },
}

impl StageError {
    pub fn submission(provider: &'static str, message: impl Into<String>) -> Self {
        Self::Submission {
            provider,
            message: message.into(),
        }
    }

    pub fn provider_failed(provider: &'static str, message: impl Into<String>) -> Self {
        Self::ProviderFailed {
            provider,
            message: message.into(),
        }
    }

    pub fn parse(what: &'static str, message: impl Into<String>) -> Self {
        Self::Parse {
            what,
            message: message.into(),
        }
    }

    pub fn assembly(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Assembly {
            operation,
            message: message.into(),
        }
    }

    pub fn delivery(message: impl Into<String>) -> Self {
        Self::Delivery {
            message: message.into(),
        }
    }

    /// True for the one error kind the orchestrator answers with a
    /// sanitized prompt retry.
    pub fn is_content_policy(&self) -> bool {
        matches!(self, Self::ContentPolicy { .. })
    }
}

/// Convenience alias used throughout the stage and media layers.
pub type StageResult<T> = Result<T, StageError>;
