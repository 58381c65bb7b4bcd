//! Bounded, classified retry around a single step invocation.

use std::time::Duration;

use serde_json::Value;
use tracing::warn;

use steps::{InterruptResponse, StepAction, StepContext, StepError};

use crate::EngineError;

/// Tuning knobs for step retries.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total invocation budget per policy call (a fatal error consumes one).
    pub max_attempts: u32,
    /// Base delay for exponential back-off between retries.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
        }
    }
}

/// Bookkeeping for one policy invocation. Scoped to that call alone — it is
/// never persisted and never shared, so a resumed step restarts at attempt 1
/// and concurrent instances cannot interfere.
#[derive(Debug, Clone)]
pub struct RetryState {
    pub step_name: String,
    pub attempt: u32,
    pub last_error: Option<StepError>,
    pub next_backoff: Duration,
}

impl RetryPolicy {
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.pow(attempt.saturating_sub(1))
    }

    /// Run `handler` against a copy of `state`, retrying retryable failures
    /// up to `max_attempts` total invocations.
    ///
    /// # Errors
    /// - [`EngineError::FatalStep`] on the first non-retryable failure.
    /// - [`EngineError::RetryExhausted`] when the budget runs out, carrying
    ///   the last error.
    pub async fn run(
        &self,
        instance_id: &str,
        step_name: &str,
        handler: &dyn StepAction,
        state: &Value,
        response: Option<InterruptResponse>,
    ) -> Result<Value, EngineError> {
        let max_attempts = self.max_attempts.max(1);
        let mut retry = RetryState {
            step_name: step_name.to_string(),
            attempt: 1,
            last_error: None,
            next_backoff: self.backoff(1),
        };

        loop {
            let ctx = StepContext {
                instance_id: instance_id.to_string(),
                step_name: step_name.to_string(),
                attempt: retry.attempt,
                response: response.clone(),
            };

            match handler.run(state.clone(), &ctx).await {
                Ok(output) => return Ok(output),

                Err(StepError::Fatal(message)) => {
                    return Err(EngineError::FatalStep {
                        step: retry.step_name,
                        message,
                    });
                }

                Err(err @ StepError::Retryable(_)) => {
                    if retry.attempt >= max_attempts {
                        return Err(EngineError::RetryExhausted {
                            step: retry.step_name,
                            attempts: retry.attempt,
                            message: err.to_string(),
                        });
                    }

                    retry.next_backoff = self.backoff(retry.attempt);
                    warn!(
                        step = %retry.step_name,
                        attempt = retry.attempt,
                        max_attempts,
                        delay = ?retry.next_backoff,
                        %err,
                        "retryable step error, backing off"
                    );
                    retry.last_error = Some(err);

                    tokio::time::sleep(retry.next_backoff).await;
                    retry.attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use steps::mock::MockStep;

    #[tokio::test(start_paused = true)]
    async fn retryable_failure_consumes_exactly_max_attempts() {
        let policy = RetryPolicy::default();
        let step = MockStep::failing_retryable("flaky", "transient failure");

        let err = policy
            .run("inst-1", "flaky", &step, &json!({}), None)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            EngineError::RetryExhausted { attempts: 3, .. }
        ));
        assert_eq!(step.call_count(), 3);
    }

    #[tokio::test]
    async fn fatal_failure_is_invoked_exactly_once() {
        let policy = RetryPolicy::default();
        let step = MockStep::failing_fatal("boom", "bad config");

        let err = policy
            .run("inst-1", "boom", &step, &json!({}), None)
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::FatalStep { .. }));
        assert_eq!(step.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn flaky_step_recovers_within_budget() {
        let policy = RetryPolicy::default();
        let step = MockStep::flaky("flaky", 3, json!({ "done": true }));

        let out = policy
            .run("inst-1", "flaky", &step, &json!({}), None)
            .await
            .expect("third attempt succeeds");

        assert_eq!(out["done"], true);
        assert_eq!(step.call_count(), 3);
    }

    #[test]
    fn backoff_doubles_per_attempt() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(400));
    }

    #[tokio::test(start_paused = true)]
    async fn attempt_counters_are_invocation_scoped() {
        // Two sequential policy calls over the same step each start at
        // attempt 1 — the second call gets a full budget.
        let policy = RetryPolicy::default();
        let step = MockStep::flaky("flaky", 5, json!({ "done": true }));

        assert!(policy
            .run("inst-1", "flaky", &step, &json!({}), None)
            .await
            .is_err());
        // Calls so far: 3. The next invocation succeeds on global call #5,
        // which is attempt 2 of this fresh policy call.
        let out = policy
            .run("inst-1", "flaky", &step, &json!({}), None)
            .await
            .expect("second policy call succeeds within its own budget");
        assert_eq!(out["done"], true);
        assert_eq!(step.call_count(), 5);
    }
}
