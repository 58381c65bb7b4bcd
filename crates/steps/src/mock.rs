//! `MockStep` — a test double for `StepAction`.
//!
//! Useful in unit and integration tests where a real step implementation is
//! either unavailable or irrelevant.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::agent::{AgentDirective, ReasoningEngine};
use crate::{StepAction, StepContext, StepError};

/// Behaviour injected into `MockStep` at construction time.
pub enum MockBehaviour {
    /// Merge a specific JSON object into the state.
    ReturnValue(Value),
    /// Fail with a `Retryable` error.
    FailRetryable(String),
    /// Fail with `Retryable` errors until call number `succeed_on`, then
    /// merge `value` into the state. The counter lives inside this mock —
    /// two mocks never interfere.
    SucceedOn { succeed_on: usize, value: Value },
    /// Fail with a `Fatal` error.
    FailFatal(String),
}

/// A mock step that records every call it receives and returns a
/// programmer-specified result.
pub struct MockStep {
    /// Label used in test assertions; also merged into the state as `"step"`.
    pub name: String,
    /// What the step will do when `run` is called.
    pub behaviour: MockBehaviour,
    /// All inputs seen by this step (in call order).
    pub calls: Arc<Mutex<Vec<Value>>>,
}

impl MockStep {
    /// Create a mock that always succeeds, merging `value` into the state.
    pub fn returning(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            behaviour: MockBehaviour::ReturnValue(value),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a mock that always fails with a `Fatal` error.
    pub fn failing_fatal(name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            behaviour: MockBehaviour::FailFatal(msg.into()),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a mock that always fails with a `Retryable` error.
    pub fn failing_retryable(name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            behaviour: MockBehaviour::FailRetryable(msg.into()),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a flaky mock: retryable failures until call `succeed_on`.
    pub fn flaky(name: impl Into<String>, succeed_on: usize, value: Value) -> Self {
        Self {
            name: name.into(),
            behaviour: MockBehaviour::SucceedOn { succeed_on, value },
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Number of times this step has been executed.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn merge(&self, mut state: Value, value: &Value) -> Value {
        if let (Some(obj), Some(extra)) = (state.as_object_mut(), value.as_object()) {
            obj.insert("step".to_string(), json!(self.name));
            for (k, v) in extra {
                obj.insert(k.clone(), v.clone());
            }
            state
        } else {
            json!({ "step": self.name })
        }
    }
}

#[async_trait]
impl StepAction for MockStep {
    async fn run(&self, state: Value, _ctx: &StepContext) -> Result<Value, StepError> {
        let call_number = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(state.clone());
            calls.len()
        };

        match &self.behaviour {
            MockBehaviour::ReturnValue(v) => Ok(self.merge(state, v)),
            MockBehaviour::FailRetryable(msg) => Err(StepError::Retryable(msg.clone())),
            MockBehaviour::SucceedOn { succeed_on, value } => {
                if call_number < *succeed_on {
                    Err(StepError::Retryable(format!(
                        "simulated transient failure on call #{call_number}"
                    )))
                } else {
                    Ok(self.merge(state, value))
                }
            }
            MockBehaviour::FailFatal(msg) => Err(StepError::Fatal(msg.clone())),
        }
    }
}

/// A scripted reasoning engine: plays back a fixed sequence of directives.
pub struct ScriptedEngine {
    script: Mutex<VecDeque<AgentDirective>>,
    repeat: Option<AgentDirective>,
}

impl ScriptedEngine {
    pub fn new(directives: Vec<AgentDirective>) -> Self {
        Self {
            script: Mutex::new(directives.into()),
            repeat: None,
        }
    }

    /// An engine that returns the same directive forever.
    pub fn repeating(directive: AgentDirective) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            repeat: Some(directive),
        }
    }
}

#[async_trait]
impl ReasoningEngine for ScriptedEngine {
    async fn decide(
        &self,
        _task: &str,
        _observations: &[Value],
    ) -> Result<AgentDirective, StepError> {
        if let Some(next) = self.script.lock().unwrap().pop_front() {
            return Ok(next);
        }
        self.repeat
            .clone()
            .ok_or_else(|| StepError::Fatal("scripted engine ran out of directives".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> StepContext {
        StepContext {
            instance_id: "inst-1".into(),
            step_name: "mock".into(),
            attempt: 1,
            response: None,
        }
    }

    #[tokio::test]
    async fn flaky_step_succeeds_on_configured_call() {
        let step = MockStep::flaky("flaky", 3, json!({ "done": true }));

        assert!(step.run(json!({}), &ctx()).await.is_err());
        assert!(step.run(json!({}), &ctx()).await.is_err());
        let out = step.run(json!({}), &ctx()).await.expect("third call succeeds");
        assert_eq!(out["done"], true);
        assert_eq!(step.call_count(), 3);
    }

    #[tokio::test]
    async fn returning_step_merges_into_state() {
        let step = MockStep::returning("collect", json!({ "records": 100 }));
        let out = step
            .run(json!({ "origin": "kickoff" }), &ctx())
            .await
            .unwrap();
        assert_eq!(out["records"], 100);
        assert_eq!(out["origin"], "kickoff");
        assert_eq!(out["step"], "collect");
    }
}
