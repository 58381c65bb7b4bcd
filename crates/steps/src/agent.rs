//! The `ReasoningEngine` collaborator — a black box that, given a task,
//! returns either a final answer or a request to invoke a named tool.
//!
//! The engine crate never constrains what happens inside a reasoning engine;
//! [`AgentStep`] only drives the directive loop and feeds tool observations
//! back in.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::tool::Tool;
use crate::{StepAction, StepContext, StepError};

/// What a reasoning engine wants to happen next.
#[derive(Debug, Clone)]
pub enum AgentDirective {
    /// The task is done; record this answer.
    FinalAnswer(String),
    /// Invoke the named tool with the given arguments and report back.
    InvokeTool { name: String, args: Value },
}

/// Opaque decision-maker. Implementations may call an LLM, a rules table, or
/// a script — the core does not care.
#[async_trait]
pub trait ReasoningEngine: Send + Sync {
    /// Decide the next directive for `task`, given the tool observations
    /// collected so far (in invocation order).
    async fn decide(
        &self,
        task: &str,
        observations: &[Value],
    ) -> Result<AgentDirective, StepError>;
}

/// Adapts a reasoning engine plus a tool set into a step.
///
/// Reads the task description from `task_key`, loops directives up to
/// `max_turns`, and writes the final answer to `answer_key`.
pub struct AgentStep {
    engine: Arc<dyn ReasoningEngine>,
    tools: HashMap<String, Arc<dyn Tool>>,
    task_key: String,
    answer_key: String,
    max_turns: u32,
}

impl AgentStep {
    pub fn new(
        engine: Arc<dyn ReasoningEngine>,
        tools: Vec<Arc<dyn Tool>>,
        task_key: impl Into<String>,
        answer_key: impl Into<String>,
    ) -> Self {
        let tools = tools
            .into_iter()
            .map(|t| (t.name().to_string(), t))
            .collect();
        Self {
            engine,
            tools,
            task_key: task_key.into(),
            answer_key: answer_key.into(),
            max_turns: 8,
        }
    }

    pub fn with_max_turns(mut self, max_turns: u32) -> Self {
        self.max_turns = max_turns;
        self
    }
}

#[async_trait]
impl StepAction for AgentStep {
    async fn run(&self, mut state: Value, _ctx: &StepContext) -> Result<Value, StepError> {
        let task = state[&self.task_key]
            .as_str()
            .ok_or_else(|| {
                StepError::Fatal(format!("state field '{}' is not a string", self.task_key))
            })?
            .to_string();

        let mut observations: Vec<Value> = Vec::new();

        for turn in 0..self.max_turns {
            match self.engine.decide(&task, &observations).await? {
                AgentDirective::FinalAnswer(answer) => {
                    debug!(turn, "agent produced final answer");
                    let obj = state.as_object_mut().ok_or_else(|| {
                        StepError::Fatal("agent step requires an object-shaped state".to_string())
                    })?;
                    obj.insert(self.answer_key.clone(), Value::String(answer));
                    return Ok(state);
                }
                AgentDirective::InvokeTool { name, args } => {
                    let tool = self.tools.get(&name).ok_or_else(|| {
                        StepError::Fatal(format!("agent requested unknown tool '{name}'"))
                    })?;
                    debug!(turn, tool = %name, "agent invoking tool");
                    let observation = tool.run(args).await?;
                    observations.push(observation);
                }
            }
        }

        Err(StepError::Fatal(format!(
            "agent exceeded {} turns without a final answer",
            self.max_turns
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::ScriptedEngine;
    use crate::tool::Calculator;
    use serde_json::json;

    fn ctx() -> StepContext {
        StepContext {
            instance_id: "inst-1".into(),
            step_name: "agent".into(),
            attempt: 1,
            response: None,
        }
    }

    #[tokio::test]
    async fn agent_invokes_tool_then_answers() {
        let engine = ScriptedEngine::new(vec![
            AgentDirective::InvokeTool {
                name: "calculator".into(),
                args: json!({ "operation": "add", "a": 2.0, "b": 3.0 }),
            },
            AgentDirective::FinalAnswer("the sum is 5".into()),
        ]);
        let step = AgentStep::new(
            Arc::new(engine),
            vec![Arc::new(Calculator)],
            "task",
            "answer",
        );

        let out = step
            .run(json!({ "task": "add 2 and 3" }), &ctx())
            .await
            .expect("agent should finish");
        assert_eq!(out["answer"], "the sum is 5");
    }

    #[tokio::test]
    async fn unknown_tool_request_is_fatal() {
        let engine = ScriptedEngine::new(vec![AgentDirective::InvokeTool {
            name: "teleporter".into(),
            args: json!({}),
        }]);
        let step = AgentStep::new(Arc::new(engine), vec![], "task", "answer");

        let err = step
            .run(json!({ "task": "go somewhere" }), &ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, StepError::Fatal(_)));
    }

    #[tokio::test]
    async fn turn_budget_is_enforced() {
        // An engine that keeps asking for tools never terminates on its own.
        let engine = ScriptedEngine::repeating(AgentDirective::InvokeTool {
            name: "calculator".into(),
            args: json!({ "operation": "add", "a": 1.0, "b": 1.0 }),
        });
        let step = AgentStep::new(
            Arc::new(engine),
            vec![Arc::new(Calculator)],
            "task",
            "answer",
        )
        .with_max_turns(3);

        let err = step
            .run(json!({ "task": "loop forever" }), &ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, StepError::Fatal(_)));
    }
}
