//! The `StepAction` trait — the contract every step body must fulfil.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::StepError;

/// Verdict carried by an [`InterruptResponse`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approve,
    Reject,
    Revise,
}

/// An external answer to a pause point, consumed exactly once on resume.
///
/// Defined here (in the steps crate) so both the engine and individual step
/// implementations can import it without a circular dependency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterruptResponse {
    /// Instance the response is addressed to.
    pub instance_id: String,
    /// The reviewer's verdict.
    pub decision: Decision,
    /// Free-form feedback attached to the verdict.
    pub payload: String,
}

/// Per-invocation context passed to every step.
#[derive(Debug, Clone)]
pub struct StepContext {
    /// ID of the workflow instance being advanced.
    pub instance_id: String,
    /// Name of the step being executed.
    pub step_name: String,
    /// 1-based attempt number for this invocation (scoped to one retry-policy
    /// call, never shared across invocations or instances).
    pub attempt: u32,
    /// The consumed interrupt response, present only when a pause step is
    /// resumed.
    pub response: Option<InterruptResponse>,
}

/// The core step trait.
///
/// A step receives the current state snapshot's data, mutates a copy, and
/// returns the new data. It must never assume it runs exactly once — a crash
/// before the checkpoint write replays it.
#[async_trait]
pub trait StepAction: Send + Sync {
    /// Execute the step against `state` and return the updated state.
    async fn run(&self, state: Value, ctx: &StepContext) -> Result<Value, StepError>;
}

/// Adapter turning a plain synchronous closure into a [`StepAction`].
///
/// Most steps are pure state transformations; this keeps their definition to
/// one expression at the registration site.
pub struct FnStep<F> {
    f: F,
}

impl<F> FnStep<F>
where
    F: Fn(Value, &StepContext) -> Result<Value, StepError> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F> StepAction for FnStep<F>
where
    F: Fn(Value, &StepContext) -> Result<Value, StepError> + Send + Sync,
{
    async fn run(&self, state: Value, ctx: &StepContext) -> Result<Value, StepError> {
        (self.f)(state, ctx)
    }
}
