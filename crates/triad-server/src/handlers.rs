//! HTTP handlers: run submission over SSE plus the run archive.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use tokio_stream::Stream;
use tracing::{error, info};

use triad_core::ids::RunId;
use triad_store::{MessageRow, SessionRow, StoreError};

use crate::event_bridge;
use crate::orchestrator::SubmitError;
use crate::server::AppState;

/// Default page size for `GET /runs`.
pub const DEFAULT_RUN_LIMIT: u32 = 20;
pub const MAX_RUN_LIMIT: u32 = 200;

#[derive(Debug, Default, Deserialize)]
pub struct RunQuery {
    #[serde(default)]
    pub problem: String,
}

#[derive(Debug, Deserialize)]
pub struct RunBody {
    pub problem: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub limit: Option<u32>,
}

/// Error surfaced to HTTP clients as `{"error": "..."}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("internal error")]
    Internal(String),
}

impl From<SubmitError> for ApiError {
    fn from(e: SubmitError) -> Self {
        match e {
            SubmitError::EmptyProblem => ApiError::BadRequest(e.to_string()),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(what) => ApiError::NotFound(format!("{what} not found")),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(detail) => {
                error!(error = %detail, "request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

async fn open_run(
    state: AppState,
    problem: String,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>> + Send + 'static>, ApiError> {
    let submission = state.orchestrator.submit(&problem).await?;
    info!(run_id = %submission.run_id, dormant = submission.dormant, "streaming run");

    let stream = event_bridge::sse_stream(submission.events);
    let keep_alive = KeepAlive::new()
        .interval(Duration::from_secs(state.keep_alive_secs))
        .text("keep-alive");
    Ok(Sse::new(stream).keep_alive(keep_alive))
}

/// `GET /run?problem=...`
pub async fn run_get(
    State(state): State<AppState>,
    Query(query): Query<RunQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>> + Send + 'static>, ApiError> {
    open_run(state, query.problem).await
}

/// `POST /runs` with `{"problem": "..."}`.
pub async fn run_post(
    State(state): State<AppState>,
    Json(body): Json<RunBody>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>> + Send + 'static>, ApiError> {
    open_run(state, body.problem).await
}

/// `GET /runs?limit=N`, newest first.
pub async fn list_runs(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<SessionRow>>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_RUN_LIMIT).clamp(1, MAX_RUN_LIMIT);
    Ok(Json(state.archive.recent_sessions(limit)?))
}

/// `GET /runs/{run_id}/messages`
pub async fn run_messages(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Result<Json<Vec<MessageRow>>, ApiError> {
    let run_id = RunId::from_raw(run_id);
    Ok(Json(state.archive.session_messages(&run_id)?))
}

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "healthy" }))
}
