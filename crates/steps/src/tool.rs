//! The `Tool` collaborator trait plus the canned demo tools.
//!
//! A tool is an opaque, potentially failing function. The engine never calls
//! one directly — a [`ToolStep`] adapts a tool into a [`StepAction`] so the
//! retry policy applies to it like to any other step.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::{StepAction, StepContext, StepError};

/// An external capability a step may invoke.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Stable name used to address the tool from an agent directive.
    fn name(&self) -> &str;

    /// Invoke the tool with a JSON argument object.
    async fn run(&self, input: Value) -> Result<Value, StepError>;
}

/// Adapts a [`Tool`] into a step: reads the tool input from one state field,
/// writes the tool output to another.
pub struct ToolStep {
    tool: Arc<dyn Tool>,
    input_key: String,
    output_key: String,
}

impl ToolStep {
    pub fn new(
        tool: Arc<dyn Tool>,
        input_key: impl Into<String>,
        output_key: impl Into<String>,
    ) -> Self {
        Self {
            tool,
            input_key: input_key.into(),
            output_key: output_key.into(),
        }
    }
}

#[async_trait]
impl StepAction for ToolStep {
    async fn run(&self, mut state: Value, _ctx: &StepContext) -> Result<Value, StepError> {
        let input = state
            .get(&self.input_key)
            .cloned()
            .unwrap_or(Value::Null);

        debug!(tool = self.tool.name(), "invoking tool");
        let output = self.tool.run(input).await?;

        let obj = state.as_object_mut().ok_or_else(|| {
            StepError::Fatal("tool step requires an object-shaped state".to_string())
        })?;
        obj.insert(self.output_key.clone(), output);
        Ok(state)
    }
}

// ---------------------------------------------------------------------------
// Canned demo tools
// ---------------------------------------------------------------------------

/// Four-function arithmetic on `{operation, a, b}`.
pub struct Calculator;

#[async_trait]
impl Tool for Calculator {
    fn name(&self) -> &str {
        "calculator"
    }

    async fn run(&self, input: Value) -> Result<Value, StepError> {
        let op = input["operation"].as_str().unwrap_or("add");
        let a = input["a"].as_f64().unwrap_or(0.0);
        let b = input["b"].as_f64().unwrap_or(0.0);

        let result = match op {
            "add" => a + b,
            "subtract" => a - b,
            "multiply" => a * b,
            "divide" => {
                if b == 0.0 {
                    return Err(StepError::Fatal("division by zero".to_string()));
                }
                a / b
            }
            other => {
                return Err(StepError::Fatal(format!("unknown operation '{other}'")));
            }
        };

        Ok(json!({ "operation": op, "a": a, "b": b, "result": result }))
    }
}

/// Canned weather conditions keyed by city.
pub struct WeatherLookup;

#[async_trait]
impl Tool for WeatherLookup {
    fn name(&self) -> &str {
        "weather_lookup"
    }

    async fn run(&self, input: Value) -> Result<Value, StepError> {
        let city = input["city"].as_str().unwrap_or("Tokyo");
        let (temp_c, condition) = match city {
            "Tokyo" => (22.0, "sunny"),
            "London" => (14.0, "rainy"),
            "New York" => (18.0, "cloudy"),
            _ => (20.0, "clear"),
        };
        Ok(json!({ "city": city, "temp_c": temp_c, "condition": condition }))
    }
}

/// Canned row sets keyed by table name; unknown tables are a fatal error.
pub struct DatasetQuery;

#[async_trait]
impl Tool for DatasetQuery {
    fn name(&self) -> &str {
        "dataset_query"
    }

    async fn run(&self, input: Value) -> Result<Value, StepError> {
        let table = input["table"].as_str().unwrap_or("");
        let limit = input["limit"].as_u64().unwrap_or(10) as usize;

        let rows = match table {
            "users" => vec![
                json!({ "id": 1, "name": "alice" }),
                json!({ "id": 2, "name": "bob" }),
            ],
            "orders" => vec![
                json!({ "id": 100, "total": 42.5 }),
                json!({ "id": 101, "total": 17.0 }),
            ],
            other => {
                return Err(StepError::Fatal(format!("table '{other}' not found")));
            }
        };

        let rows: Vec<Value> = rows.into_iter().take(limit).collect();
        Ok(json!({ "table": table, "rows": rows }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> StepContext {
        StepContext {
            instance_id: "inst-1".into(),
            step_name: "tool".into(),
            attempt: 1,
            response: None,
        }
    }

    #[tokio::test]
    async fn calculator_divide_by_zero_is_fatal() {
        let err = Calculator
            .run(json!({ "operation": "divide", "a": 1.0, "b": 0.0 }))
            .await
            .unwrap_err();
        assert!(matches!(err, StepError::Fatal(_)));
    }

    #[tokio::test]
    async fn tool_step_reads_and_writes_state_keys() {
        let step = ToolStep::new(Arc::new(Calculator), "calc_input", "calc_output");
        let state = json!({
            "calc_input": { "operation": "multiply", "a": 6.0, "b": 7.0 }
        });

        let out = step.run(state, &ctx()).await.expect("tool should succeed");
        assert_eq!(out["calc_output"]["result"], 42.0);
        // The input field is left untouched.
        assert_eq!(out["calc_input"]["operation"], "multiply");
    }

    #[tokio::test]
    async fn dataset_query_unknown_table_is_fatal() {
        let err = DatasetQuery
            .run(json!({ "table": "ghost" }))
            .await
            .unwrap_err();
        assert!(matches!(err, StepError::Fatal(_)));
    }
}
