//! Demo workflow definitions shipped with the binary.
//!
//! Three flows, selectable with `--flow`:
//! - `pipeline`  — a six-stage data pipeline, no routers.
//! - `proposal`  — draft/review with a human pause and a bounded revision
//!   loop.
//! - `toolbox`   — a pipeline that drives the canned tools.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{bail, Result};
use serde_json::json;

use engine::{NextStep, PauseSpec, StepGraph};
use steps::tool::{Calculator, ToolStep, WeatherLookup};
use steps::{Decision, FnStep, StepError};

pub fn definition(flow: &str) -> Result<StepGraph> {
    match flow {
        "pipeline" => Ok(pipeline()),
        "proposal" => Ok(proposal()),
        "toolbox" => Ok(toolbox()),
        other => bail!("unknown flow '{other}' (expected pipeline, proposal, or toolbox)"),
    }
}

/// Every demo definition, keyed by name, for the API server.
pub fn all() -> HashMap<String, Arc<StepGraph>> {
    [pipeline(), proposal(), toolbox()]
        .into_iter()
        .map(|graph| (graph.name().to_string(), Arc::new(graph)))
        .collect()
}

fn pipeline() -> StepGraph {
    let mut graph = StepGraph::new("pipeline");

    graph
        .register(
            "init",
            &[],
            Arc::new(FnStep::new(|mut state, ctx| {
                state["workflow_id"] = json!(ctx.instance_id);
                Ok(state)
            })),
        )
        .expect("static demo graph");
    graph
        .register(
            "collect",
            &["init"],
            Arc::new(FnStep::new(|mut state, _ctx| {
                state["data"] = json!({
                    "source": "api",
                    "records": 100,
                    "quality_score": 0.95,
                });
                Ok(state)
            })),
        )
        .expect("static demo graph");
    graph
        .register(
            "validate",
            &["collect"],
            Arc::new(FnStep::new(|mut state, _ctx| {
                let records = state["data"]["records"].as_u64().unwrap_or(0);
                if records == 0 {
                    return Err(StepError::Fatal("no records to process".into()));
                }
                state["validated"] = json!(true);
                Ok(state)
            })),
        )
        .expect("static demo graph");
    graph
        .register(
            "process",
            &["validate"],
            Arc::new(FnStep::new(|mut state, _ctx| {
                state["analysis"] = json!({
                    "mean": 42.5,
                    "median": 40.0,
                    "std_dev": 5.2,
                });
                Ok(state)
            })),
        )
        .expect("static demo graph");
    graph
        .register(
            "aggregate",
            &["process"],
            Arc::new(FnStep::new(|mut state, _ctx| {
                let records = state["data"]["records"].as_u64().unwrap_or(0);
                let mean = state["analysis"]["mean"].as_f64().unwrap_or(0.0);
                state["summary"] = json!(format!("{records} records, mean {mean}"));
                Ok(state)
            })),
        )
        .expect("static demo graph");
    graph
        .register(
            "finalize",
            &["aggregate"],
            Arc::new(FnStep::new(|mut state, _ctx| {
                state["report"] = json!(format!(
                    "Workflow Report\n===============\n{}",
                    state["summary"].as_str().unwrap_or("no summary")
                ));
                Ok(state)
            })),
        )
        .expect("static demo graph");

    graph
}

fn proposal() -> StepGraph {
    let mut graph = StepGraph::new("proposal");

    graph
        .register(
            "draft",
            &[],
            Arc::new(FnStep::new(|mut state, _ctx| {
                let topic = state["topic"]
                    .as_str()
                    .unwrap_or("Workflow Engine Adoption")
                    .to_string();
                state["topic"] = json!(topic);
                state["draft"] = json!(format!("Proposal: {topic} (revision 0)"));
                Ok(state)
            })),
        )
        .expect("static demo graph");
    graph
        .register(
            "revise",
            &["draft"],
            Arc::new(FnStep::new(|mut state, _ctx| {
                let revision = state["revision"].as_u64().unwrap_or(0);
                // First pass keeps revision 0; each loop rewrites the draft.
                if let Some(feedback) = state["feedback"].as_str() {
                    let topic = state["topic"].as_str().unwrap_or("").to_string();
                    state["draft"] = json!(format!(
                        "Proposal: {topic} (revision {}, incorporating: {feedback})",
                        revision + 1
                    ));
                    state["revision"] = json!(revision + 1);
                }
                Ok(state)
            })),
        )
        .expect("static demo graph");
    graph
        .register_pause(
            "await_review",
            &["revise"],
            PauseSpec::new("Review the draft: approve, reject, or request a revision."),
            Arc::new(FnStep::new(|mut state, ctx| {
                let response = ctx
                    .response
                    .as_ref()
                    .ok_or_else(|| StepError::Fatal("resumed without a response".into()))?;
                state["review_status"] = json!(match response.decision {
                    Decision::Approve => "approved",
                    Decision::Reject => "rejected",
                    Decision::Revise => "needs_revision",
                });
                state["feedback"] = json!(response.payload);
                Ok(state)
            })),
        )
        .expect("static demo graph");
    graph
        .register_router("review", &["await_review"], |state| {
            match state.data["review_status"].as_str() {
                Some("approved") => Ok(NextStep::single("finalize")),
                Some("rejected") => Ok(NextStep::single("handle_rejection")),
                _ => Ok(NextStep::single("revise")),
            }
        })
        .expect("static demo graph");
    graph
        .register(
            "finalize",
            &["review"],
            Arc::new(FnStep::new(|mut state, _ctx| {
                state["status"] = json!("finalized");
                Ok(state)
            })),
        )
        .expect("static demo graph");
    graph
        .register(
            "handle_rejection",
            &["review"],
            Arc::new(FnStep::new(|mut state, _ctx| {
                state["status"] = json!("rejected");
                Ok(state)
            })),
        )
        .expect("static demo graph");

    graph.set_max_revisions(3).set_fallback("finalize");
    graph
}

fn toolbox() -> StepGraph {
    let mut graph = StepGraph::new("toolbox");

    graph
        .register(
            "plan",
            &[],
            Arc::new(FnStep::new(|mut state, _ctx| {
                state["weather_input"] = json!({ "city": "Tokyo" });
                state["calc_input"] =
                    json!({ "operation": "multiply", "a": 6.0, "b": 7.0 });
                Ok(state)
            })),
        )
        .expect("static demo graph");
    graph
        .register(
            "lookup",
            &["plan"],
            Arc::new(ToolStep::new(
                Arc::new(WeatherLookup),
                "weather_input",
                "weather",
            )),
        )
        .expect("static demo graph");
    graph
        .register(
            "compute",
            &["lookup"],
            Arc::new(ToolStep::new(Arc::new(Calculator), "calc_input", "calc")),
        )
        .expect("static demo graph");
    graph
        .register(
            "report",
            &["compute"],
            Arc::new(FnStep::new(|mut state, _ctx| {
                state["report"] = json!(format!(
                    "{} in {}; the answer is {}",
                    state["weather"]["condition"].as_str().unwrap_or("?"),
                    state["weather"]["city"].as_str().unwrap_or("?"),
                    state["calc"]["result"].as_f64().unwrap_or(f64::NAN),
                ));
                Ok(state)
            })),
        )
        .expect("static demo graph");

    graph
}
