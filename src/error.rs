use thiserror::Error;

use crate::models::TaskStatus;

/// Failures from the capability gateway (LLM / Workspace calls)
///
/// Decoded once at the HTTP boundary; downstream code matches on the
/// variant, never on message text.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Quota or rate limit exhausted - retryable by the caller
    #[error("capability quota exceeded: {0}")]
    QuotaExceeded(String),
    /// Model endpoint unreachable or returned a server error - retryable
    #[error("model unavailable: {0}")]
    ModelUnavailable(String),
    /// Response arrived but did not have the expected shape
    #[error("malformed capability response: {0}")]
    MalformedResponse(String),
}

impl GatewayError {
    /// Whether the caller may reasonably retry the same request
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            GatewayError::QuotaExceeded(_) | GatewayError::ModelUnavailable(_)
        )
    }
}

/// Failures from the record store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("record not found: {0}")]
    NotFound(String),
    #[error("invalid record: {0}")]
    InvalidRecord(String),
}

/// Failures from suggested-task operations
#[derive(Debug, Error)]
pub enum TaskError {
    /// Status transition rejected by the transition table
    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition { from: TaskStatus, to: TaskStatus },
    /// action/params present without a service, or similar shape violations
    #[error("invalid task: {0}")]
    InvalidTask(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("task suggestion failed: {0}")]
    Gateway(#[from] GatewayError),
}

/// Failures that abort a session pipeline run
///
/// Enrichment and persistence failures are deliberately absent: the
/// pipeline swallows both (the result has already been broadcast by the
/// time persistence runs).
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("transcription failed: {0}")]
    Transcription(#[source] GatewayError),
    #[error("summarization failed: {0}")]
    Summarization(#[source] GatewayError),
}
