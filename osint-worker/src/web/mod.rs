//! Web API module.
//!
//! A thin HTTP front end over the queues:
//! - `POST /investigate` enqueues a job and returns `202`
//! - `POST /scrape` and `POST /analyze` wait on a worker RPC
//! - `GET /health` answers without touching the broker

pub mod handlers;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

pub use handlers::{
    analyze, health, investigate, scrape, ApiError, AppState, EnqueuedResponse, ErrorResponse,
    HealthResponse, InvestigateBody,
};

/// Build the API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/investigate", post(investigate))
        .route("/scrape", post(scrape))
        .route("/analyze", post(analyze))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
