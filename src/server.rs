//! JSON HTTP server.
//!
//! Exposes table discovery and assessment over HTTP so notebooks and agents
//! can call the harness without shelling out to `dqh`.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | `/sources` | Registered sources and their health |
//! | `POST` | `/search` | Rank indexed tables for a query |
//! | `POST` | `/assess` | Run checks against one dataset |
//! | `POST` | `/render` | Render an assessment as markdown, html or json |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `internal` (500).
//!
//! A search against an index that was never built is not an error: the
//! response has no hits and carries a `diagnostic`.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::assessment::Assessment;
use crate::config::Config;
use crate::error::QualityError;
use crate::harness::Harness;
use crate::ranker::SearchResponse;
use crate::report::ReportFormat;
use crate::sources::SourceStatus;

/// Shared application state passed to all handlers.
#[derive(Clone)]
struct AppState {
    harness: Arc<Harness>,
}

/// Start the HTTP server on `[server].bind` and serve until the process exits.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let harness = Harness::open(config.clone()).await?;
    let app = router(Arc::new(harness));

    tracing::info!(bind = %bind_addr, "server listening");
    println!("dqh server listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Build the router over an already opened harness.
pub fn router(harness: Arc<Harness>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/sources", get(handle_sources))
        .route("/search", post(handle_search))
        .route("/assess", post(handle_assess))
        .route("/render", post(handle_render))
        .layer(cors)
        .with_state(AppState { harness })
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    /// Machine-readable error code (e.g., `"bad_request"`, `"not_found"`).
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
#[derive(Debug)]
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

impl From<QualityError> for AppError {
    fn from(err: QualityError) -> Self {
        match &err {
            QualityError::UnknownSource(_) => not_found(err.to_string()),
            QualityError::UnsupportedFormat(_) | QualityError::Config(_) => {
                bad_request(err.to_string())
            }
            _ => {
                tracing::error!(error = %err, "request failed");
                internal(err.to_string())
            }
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    /// Always `"ok"` when the server is running.
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ GET /sources ============

#[derive(Serialize)]
struct SourcesResponse {
    sources: Vec<SourceStatus>,
}

async fn handle_sources(State(state): State<AppState>) -> Json<SourcesResponse> {
    Json(SourcesResponse {
        sources: state.harness.sources().await,
    })
}

// ============ POST /search ============

#[derive(Debug, Deserialize)]
struct SearchRequest {
    query: String,
    #[serde(default)]
    limit: Option<usize>,
    #[serde(default)]
    min_relevance: Option<f64>,
    /// Preferred connector; wins over anything inferred from the query.
    #[serde(default)]
    connector: Option<String>,
}

async fn handle_search(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, AppError> {
    if req.query.trim().is_empty() {
        return Err(bad_request("query must not be empty"));
    }
    if let Some(limit) = req.limit {
        if limit == 0 {
            return Err(bad_request("limit must be >= 1"));
        }
    }
    if let Some(min) = req.min_relevance {
        if !(0.0..=1.0).contains(&min) {
            return Err(bad_request("min_relevance must be in [0.0, 1.0]"));
        }
    }

    let response = state
        .harness
        .search_tables(
            &req.query,
            req.limit,
            req.min_relevance,
            req.connector.as_deref(),
        )
        .await?;
    Ok(Json(response))
}

// ============ POST /assess ============

#[derive(Debug, Deserialize)]
struct AssessRequest {
    dataset_id: String,
    /// Source name or alias; inferred from the dataset id when absent.
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    checks: Vec<String>,
}

async fn handle_assess(
    State(state): State<AppState>,
    Json(req): Json<AssessRequest>,
) -> Result<Json<Assessment>, AppError> {
    if req.dataset_id.trim().is_empty() {
        return Err(bad_request("dataset_id must not be empty"));
    }
    let source = req
        .source
        .or_else(|| state.harness.infer_source(&req.dataset_id))
        .ok_or_else(|| bad_request("source is required for this dataset_id"))?;
    if state.harness.registry().resolve(&source).is_none() {
        return Err(not_found(format!("no source registered with name: {}", source)));
    }

    let assessment = state
        .harness
        .run_assessment(&req.dataset_id, &source, &req.checks)
        .await;
    Ok(Json(assessment))
}

// ============ POST /render ============

#[derive(Debug, Deserialize)]
struct RenderRequest {
    assessment: Assessment,
    format: String,
}

#[derive(Serialize)]
struct RenderResponse {
    format: ReportFormat,
    content: String,
}

async fn handle_render(
    State(state): State<AppState>,
    Json(req): Json<RenderRequest>,
) -> Result<Json<RenderResponse>, AppError> {
    let format: ReportFormat = req.format.parse()?;
    let content = state.harness.render(&req.assessment, format)?;
    Ok(Json(RenderResponse { format, content }))
}
