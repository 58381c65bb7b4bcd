//! Step-level error type.

use thiserror::Error;

/// Errors returned by a step's `run` method.
///
/// The engine uses the variant to decide retry behaviour:
/// - `Retryable` — the invocation is re-attempted with exponential back-off.
/// - `Fatal`     — the instance is immediately marked as failed.
#[derive(Debug, Error, Clone)]
pub enum StepError {
    /// Transient failure; the engine should re-try the invocation.
    #[error("retryable step error: {0}")]
    Retryable(String),

    /// Permanent failure; no retry should be attempted.
    #[error("fatal step error: {0}")]
    Fatal(String),
}

impl StepError {
    /// Whether the retry policy may re-attempt after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable(_))
    }
}
