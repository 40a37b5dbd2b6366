use std::sync::Arc;

use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use mailbrief_core::{Mode, RunWindow};
use mailbrief_gmail::validate_window;

use crate::executions::ExecutionRegistry;
use crate::runner::{DigestRunner, TriggerError};

/// Hard cap on `/history?limit=`.
const HISTORY_LIMIT_MAX: usize = 20;

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub runner: Arc<DigestRunner>,
    pub executions: Arc<ExecutionRegistry>,
}

/// Build the Axum router with all API routes.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/run-now", post(run_now))
        .route("/historical", post(historical))
        .route("/execution/{id}", get(get_execution))
        .route("/history", get(history))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateRange {
    pub start: Option<String>,
    pub end: Option<String>,
}

/// `POST /run-now` request body.
///
/// `cleanup: true` is a deprecated alias for `mode = "cleanup"`; the enum
/// wins when both are present.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunNowRequest {
    pub cleanup: Option<bool>,
    pub mode: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    #[serde(default)]
    pub date_range: Option<DateRange>,
    pub triggered_by: Option<String>,
}

/// `POST /historical` request body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoricalRequest {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    /// Accepted for compatibility; sub-batch sizing is configured
    /// server-side.
    #[serde(default)]
    #[allow(dead_code)]
    pub batch_size: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AcceptedResponse {
    success: bool,
    message: String,
    mode: Mode,
    execution_id: String,
    timestamp: String,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    success: bool,
    message: String,
    error: String,
}

fn error_response(status: StatusCode, error: &str, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            success: false,
            message: message.into(),
            error: error.to_owned(),
        }),
    )
        .into_response()
}

fn parse_date(raw: &str, field: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y/%m/%d"))
        .map_err(|_| format!("{field} is not a valid date: {raw}"))
}

/// Resolve the request body into a canonical `(mode, window)` pair.
fn resolve_run_request(req: &RunNowRequest) -> Result<(Mode, Option<RunWindow>), String> {
    let mode = match (&req.mode, req.cleanup) {
        (Some(mode), _) => mode.parse::<Mode>().map_err(|e| e.to_string())?,
        (None, Some(true)) => Mode::Cleanup,
        _ => Mode::Weekly,
    };

    if mode != Mode::Historical {
        return Ok((mode, None));
    }

    let start_raw = req
        .start_date
        .clone()
        .or_else(|| req.date_range.as_ref().and_then(|r| r.start.clone()))
        .ok_or("historical mode requires startDate")?;
    let end_raw = req
        .end_date
        .clone()
        .or_else(|| req.date_range.as_ref().and_then(|r| r.end.clone()))
        .ok_or("historical mode requires endDate")?;

    let window = RunWindow::new(
        parse_date(&start_raw, "startDate")?,
        parse_date(&end_raw, "endDate")?,
    );
    validate_window(&window, Utc::now().date_naive()).map_err(|e| e.to_string())?;
    Ok((mode, Some(window)))
}

fn accept(state: &AppState, mode: Mode, window: Option<RunWindow>, by: Option<String>) -> Response {
    match state.runner.trigger(mode, window, by) {
        Ok(execution_id) => (
            StatusCode::ACCEPTED,
            Json(AcceptedResponse {
                success: true,
                message: format!("{mode} digest run started"),
                mode,
                execution_id,
                timestamp: Utc::now().to_rfc3339(),
            }),
        )
            .into_response(),
        Err(e @ TriggerError::AlreadyRunning) => {
            error_response(StatusCode::CONFLICT, "already_running", e.to_string())
        }
    }
}

async fn run_now(State(state): State<AppState>, Json(req): Json<RunNowRequest>) -> Response {
    match resolve_run_request(&req) {
        Ok((mode, window)) => accept(&state, mode, window, req.triggered_by),
        Err(message) => error_response(StatusCode::BAD_REQUEST, "validation", message),
    }
}

async fn historical(
    State(state): State<AppState>,
    Json(req): Json<HistoricalRequest>,
) -> Response {
    let run_request = RunNowRequest {
        mode: Some("historical".to_owned()),
        start_date: req.start_date,
        end_date: req.end_date,
        ..RunNowRequest::default()
    };
    match resolve_run_request(&run_request) {
        Ok((mode, window)) => accept(&state, mode, window, None),
        Err(message) => error_response(StatusCode::BAD_REQUEST, "validation", message),
    }
}

async fn get_execution(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.executions.get(&id) {
        Some(record) => Json(record).into_response(),
        None => error_response(
            StatusCode::NOT_FOUND,
            "not_found",
            format!("no execution with id {id}"),
        ),
    }
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    limit: Option<usize>,
}

async fn history(State(state): State<AppState>, Query(query): Query<HistoryQuery>) -> Response {
    let limit = query.limit.unwrap_or(10).min(HISTORY_LIMIT_MAX);
    Json(state.executions.recent(limit)).into_response()
}

async fn health(State(state): State<AppState>) -> Response {
    Json(serde_json::json!({
        "status": "healthy",
        "running": state.runner.is_running(),
        "timestamp": Utc::now().to_rfc3339(),
    }))
    .into_response()
}
