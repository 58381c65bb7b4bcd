//! Engine-level error types.

use thiserror::Error;

/// Errors produced by the workflow engine (validation + execution).
#[derive(Debug, Error)]
pub enum EngineError {
    // ------ Validation errors ------

    /// Two or more steps share the same name.
    #[error("duplicate step name: '{0}'")]
    DuplicateStep(String),

    /// A step declares a predecessor that has not been registered.
    #[error("step '{step}' references unknown predecessor '{predecessor}'")]
    UnknownPredecessor { step: String, predecessor: String },

    /// A label (fallback, router result, persisted frontier) names no step.
    #[error("unknown step label '{0}'")]
    UnknownStep(String),

    /// The static predecessor graph contains an undeclared cycle.
    #[error("workflow graph contains an undeclared cycle")]
    CycleDetected,

    /// No step with zero predecessors — nothing can ever run.
    #[error("workflow graph has no entry step")]
    NoEntryStep,

    /// A router needs a terminal step to force once the revision bound hits.
    #[error("graph '{0}' declares a router but no fallback terminal step")]
    MissingFallback(String),

    // ------ Lookup errors ------

    /// Unknown instance id, or a suspended instance with no response yet.
    #[error("workflow instance not found: {0}")]
    NotFound(String),

    // ------ Execution errors ------

    /// A step failed with a non-retryable error; no retry budget consumed.
    #[error("step '{step}' failed fatally: {message}")]
    FatalStep { step: String, message: String },

    /// A step's retryable failures exhausted the configured bound.
    #[error("step '{step}' exhausted {attempts} attempts: {message}")]
    RetryExhausted {
        step: String,
        attempts: u32,
        message: String,
    },

    /// Checkpoint read/write failure. Never swallowed: the executor aborts
    /// the step transition rather than advancing on an unconfirmed write.
    #[error("persistence error: {0}")]
    Persistence(#[from] store::StoreError),
}

impl EngineError {
    /// Per-step failures the executor records on the instance; everything
    /// else aborts the run as an infrastructure fault.
    pub fn is_step_failure(&self) -> bool {
        matches!(
            self,
            Self::FatalStep { .. } | Self::RetryExhausted { .. }
        )
    }
}
