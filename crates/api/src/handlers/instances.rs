use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::Value;

use engine::{KickoffInputs, RunReport, WorkflowInstance};

use super::{status_for, AppState};

#[derive(serde::Deserialize)]
pub struct KickoffDto {
    /// Name of a registered workflow definition.
    pub workflow: String,
    /// Present: resume this instance. Absent: create a new one.
    #[serde(default)]
    pub instance_id: Option<String>,
    #[serde(default)]
    pub input: Value,
}

#[derive(serde::Deserialize)]
pub struct ResumeDto {
    pub workflow: String,
}

pub async fn kickoff(
    State(state): State<AppState>,
    Json(payload): Json<KickoffDto>,
) -> Result<(StatusCode, Json<RunReport>), StatusCode> {
    let graph = state.definition(&payload.workflow)?.clone();
    let inputs = KickoffInputs {
        instance_id: payload.instance_id,
        state: payload.input,
    };

    match state.executor.kickoff(&graph, inputs).await {
        Ok(report) => Ok((StatusCode::CREATED, Json(report))),
        Err(err) => Err(status_for(&err)),
    }
}

pub async fn resume(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(payload): Json<ResumeDto>,
) -> Result<Json<RunReport>, StatusCode> {
    let graph = state.definition(&payload.workflow)?.clone();

    match state.executor.resume(&graph, &id).await {
        Ok(report) => Ok(Json(report)),
        Err(err) => Err(status_for(&err)),
    }
}

pub async fn status(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<WorkflowInstance>, StatusCode> {
    match state.executor.status(&id).await {
        Ok(instance) => Ok(Json(instance)),
        Err(err) => Err(status_for(&err)),
    }
}

pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<String>>, StatusCode> {
    match state.store.list().await {
        Ok(ids) => Ok(Json(ids)),
        Err(_) => Err(StatusCode::INTERNAL_SERVER_ERROR),
    }
}

/// Garbage-collect an instance's checkpoint. The executor never deletes;
/// this is the only way an instance record goes away.
pub async fn delete(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<StatusCode, StatusCode> {
    match state.store.delete(&id).await {
        Ok(()) => Ok(StatusCode::NO_CONTENT),
        Err(store::StoreError::NotFound(_)) => Err(StatusCode::NOT_FOUND),
        Err(_) => Err(StatusCode::INTERNAL_SERVER_ERROR),
    }
}
