//! Handler modules plus the shared application state.

pub mod instances;
pub mod interrupts;

use std::collections::HashMap;
use std::sync::Arc;

use axum::http::StatusCode;

use engine::{EngineError, Executor, StepGraph};
use store::CheckpointStore;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub executor: Arc<Executor>,
    pub store: Arc<dyn CheckpointStore>,
    /// Definitions addressable by name in kickoff/resume requests.
    pub definitions: Arc<HashMap<String, Arc<StepGraph>>>,
}

impl AppState {
    pub(crate) fn definition(&self, name: &str) -> Result<&Arc<StepGraph>, StatusCode> {
        self.definitions.get(name).ok_or(StatusCode::NOT_FOUND)
    }
}

/// Map engine errors onto HTTP statuses: lookup misses are 404, definition
/// problems are 422, the rest is a 500.
pub(crate) fn status_for(err: &EngineError) -> StatusCode {
    match err {
        EngineError::NotFound(_) => StatusCode::NOT_FOUND,
        EngineError::DuplicateStep(_)
        | EngineError::UnknownPredecessor { .. }
        | EngineError::UnknownStep(_)
        | EngineError::CycleDetected
        | EngineError::NoEntryStep
        | EngineError::MissingFallback(_) => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
