//! `api` crate — HTTP surface over the engine.
//!
//! Exposes:
//!   POST   /api/v1/instances                 kickoff (start, or resume by id)
//!   GET    /api/v1/instances                 list known instance ids
//!   GET    /api/v1/instances/{id}            latest checkpoint, read-only
//!   DELETE /api/v1/instances/{id}            garbage-collect the checkpoint
//!   POST   /api/v1/instances/{id}/resume     continue from the checkpoint
//!   GET    /api/v1/instances/{id}/interrupt  the open pause request, if any
//!   POST   /api/v1/instances/{id}/interrupt  answer the pause
//!
//! This is one interrupt channel among several — the CLI's `respond`
//! subcommand is another; the engine does not care which one answered.

pub mod handlers;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

pub use handlers::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/v1/instances",
            post(handlers::instances::kickoff).get(handlers::instances::list),
        )
        .route(
            "/api/v1/instances/:id",
            get(handlers::instances::status).delete(handlers::instances::delete),
        )
        .route(
            "/api/v1/instances/:id/resume",
            post(handlers::instances::resume),
        )
        .route(
            "/api/v1/instances/:id/interrupt",
            get(handlers::interrupts::pending).post(handlers::interrupts::submit),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind and serve until the process is stopped.
pub async fn serve(bind: &str, state: AppState) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("API listening on {bind}");
    axum::serve(listener, router(state)).await
}
