use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use engine::InterruptRequest;
use steps::{Decision, InterruptResponse};

use super::AppState;

#[derive(serde::Deserialize)]
pub struct InterruptResponseDto {
    pub decision: Decision,
    #[serde(default)]
    pub payload: String,
}

/// The open pause request for this instance, if any.
pub async fn pending(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<InterruptRequest>, StatusCode> {
    state
        .executor
        .interrupts()
        .pending_request(&id)
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

/// Answer an open pause. The caller still resumes the instance afterwards
/// (or lets the next kickoff-with-id do it).
pub async fn submit(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(payload): Json<InterruptResponseDto>,
) -> Result<StatusCode, StatusCode> {
    // Only instances the store knows about can be answered.
    if state.store.load(&id).await.is_err() {
        return Err(StatusCode::NOT_FOUND);
    }

    state.executor.interrupts().submit_response(InterruptResponse {
        instance_id: id,
        decision: payload.decision,
        payload: payload.payload,
    });

    Ok(StatusCode::ACCEPTED)
}
