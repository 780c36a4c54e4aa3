//! HTTP endpoint handlers.
//!
//! `/investigate` only enqueues and returns immediately. `/scrape` and
//! `/analyze` are synchronous RPCs answered by a worker.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::analysis::TextAnalysisResult;
use crate::html::ScrapedPage;
use crate::queue::{
    AnalyzeRequest, InvestigateJob, Queue, QueueError, QueueOptions, ScrapeRequest, Transport,
    ANALYZE_QUEUE, INVESTIGATE_QUEUE, SCRAPE_QUEUE,
};
use crate::worker::{AnalyzeRpc, ScrapeRpc};
use crate::Config;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub investigate: Arc<Queue<InvestigateJob>>,
    pub scrape: Arc<ScrapeRpc>,
    pub analyze: Arc<AnalyzeRpc>,
    /// Cancelled on shutdown to release callers waiting on an RPC
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Open the queues the API publishes to.
    pub async fn open(transport: Arc<dyn Transport>, config: Config) -> Result<Self, QueueError> {
        let options = QueueOptions::from_config(&config);

        let investigate =
            Queue::open(Arc::clone(&transport), INVESTIGATE_QUEUE, options.clone()).await?;
        let scrape = ScrapeRpc::open(Arc::clone(&transport), SCRAPE_QUEUE, options.clone()).await?;
        let analyze = AnalyzeRpc::open(transport, ANALYZE_QUEUE, options).await?;

        Ok(Self {
            config: Arc::new(config),
            investigate: Arc::new(investigate),
            scrape: Arc::new(scrape),
            analyze: Arc::new(analyze),
            shutdown: CancellationToken::new(),
        })
    }

    fn rpc_timeout(&self) -> Duration {
        self.config.rpc_timeout()
    }
}

// =============================================================================
// Health Check
// =============================================================================

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

// =============================================================================
// Error Mapping
// =============================================================================

/// Error body returned by every endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub status: String,
    pub error: String,
}

/// Why an endpoint did not produce a result.
///
/// Invalid requests map to `400`. RPC timeouts map to `504`, remote handler
/// errors to `502`, everything else to `500`.
#[derive(Debug)]
pub enum ApiError {
    InvalidRequest(&'static str),
    Rpc(QueueError),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Rpc(QueueError::Timeout) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Rpc(QueueError::Remote(_)) => StatusCode::BAD_GATEWAY,
            ApiError::Rpc(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status_code = self.status_code();
        let body = match self {
            ApiError::InvalidRequest(message) => ErrorResponse {
                status: "invalid_request".to_string(),
                error: message.to_string(),
            },
            ApiError::Rpc(e) => ErrorResponse {
                status: "error".to_string(),
                error: e.to_string(),
            },
        };

        (status_code, Json(body)).into_response()
    }
}

// =============================================================================
// Investigate
// =============================================================================

/// Body of `POST /investigate`.
#[derive(Debug, Deserialize)]
pub struct InvestigateBody {
    pub url: String,
}

/// Response of `POST /investigate`.
#[derive(Debug, Serialize, Deserialize)]
pub struct EnqueuedResponse {
    pub status: String,
    pub url: String,
}

/// Enqueue an investigation and return `202` right away.
pub async fn investigate(
    State(state): State<AppState>,
    Json(body): Json<InvestigateBody>,
) -> Response {
    let url = body.url.trim().to_string();
    if url.is_empty() {
        warn!("investigate_missing_url");
        return ApiError::InvalidRequest("url is required").into_response();
    }

    if let Err(e) = state.investigate.publish(&InvestigateJob { url: url.clone() }).await {
        error!(url = %url, error = %e, "investigate_publish_failed");
        return ApiError::Rpc(e).into_response();
    }

    info!(url = %url, "investigate_enqueued");

    (
        StatusCode::ACCEPTED,
        Json(EnqueuedResponse {
            status: "enqueued".to_string(),
            url,
        }),
    )
        .into_response()
}

// =============================================================================
// Scrape
// =============================================================================

/// Scrape a page through a worker.
pub async fn scrape(
    State(state): State<AppState>,
    Json(request): Json<ScrapeRequest>,
) -> Result<Json<ScrapedPage>, ApiError> {
    if request.url.trim().is_empty() {
        return Err(ApiError::InvalidRequest("url is required"));
    }

    info!(url = %request.url, "scrape_requested");

    state
        .scrape
        .send_and_wait(&state.shutdown, &request, state.rpc_timeout())
        .await
        .map(Json)
        .map_err(|e| {
            warn!(url = %request.url, error = %e, "scrape_rpc_failed");
            ApiError::Rpc(e)
        })
}

// =============================================================================
// Analyze
// =============================================================================

/// Analyze text through a worker.
pub async fn analyze(
    State(state): State<AppState>,
    Json(request): Json<AnalyzeRequest>,
) -> Result<Json<TextAnalysisResult>, ApiError> {
    info!(text_length = request.text.len(), "analyze_requested");

    state
        .analyze
        .send_and_wait(&state.shutdown, &request, state.rpc_timeout())
        .await
        .map(Json)
        .map_err(|e| {
            warn!(error = %e, "analyze_rpc_failed");
            ApiError::Rpc(e)
        })
}
