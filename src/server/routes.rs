//! API route handlers
//!
//! - `GET /health`: liveness probe
//! - `POST /api/query`: one JSON envelope per question
//! - `POST /api/query/stream`: Server-Sent Events `sources`, `metadata`,
//!   `chunk`, then `done` or `error`
//! - `GET /api/stats`: pipeline counters

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures_util::StreamExt;
use serde_json::{json, Value};
use std::convert::Infallible;

use crate::server::AppState;
use crate::types::{Query, QueryResponse, StreamEvent};

/// Request-level failures detected before the pipeline runs
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Missing required field: question")]
    MissingQuestion,

    #[error("Invalid request body: {0}")]
    BadRequest(String),

    #[error("Endpoint not found")]
    NotFound,
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::MissingQuestion | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound => StatusCode::NOT_FOUND,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "success": false,
            "error": self.to_string(),
        }));

        (self.status_code(), body).into_response()
    }
}

/// Liveness probe
pub async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "service": "ragquery",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

/// Pipeline counters since startup
pub async fn stats(State(state): State<AppState>) -> impl IntoResponse {
    let telemetry = state.pipeline.telemetry();

    Json(json!({
        "stats": telemetry.stats(),
        "success_rate": telemetry.success_rate(),
        "uptime_seconds": telemetry.uptime().as_secs(),
        "model": state.pipeline.model_id(),
        "reranker_available": state.pipeline.reranker_available(),
    }))
}

/// Synchronous query
pub async fn query(State(state): State<AppState>, body: Bytes) -> Response {
    let query = match parse_query(&body) {
        Ok(query) => query,
        Err(err) => return err.into_response(),
    };

    envelope(state.pipeline.execute_query(query).await)
}

/// Streamed query
///
/// Failures before the first event come back as a plain JSON envelope.
pub async fn query_stream(State(state): State<AppState>, body: Bytes) -> Response {
    let query = match parse_query(&body) {
        Ok(query) => query,
        Err(err) => return err.into_response(),
    };

    match state.pipeline.execute_query_stream(query).await {
        Ok(events) => {
            let events = events.map(|event| Ok::<_, Infallible>(sse_event(&event)));
            Sse::new(events)
                .keep_alive(KeepAlive::default())
                .into_response()
        }
        Err(response) => envelope(response),
    }
}

/// 404 handler
pub async fn not_found() -> ApiError {
    ApiError::NotFound
}

fn parse_query(body: &[u8]) -> Result<Query, ApiError> {
    if body.iter().all(|b| b.is_ascii_whitespace()) {
        return Err(ApiError::MissingQuestion);
    }

    let value: Value =
        serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(e.to_string()))?;

    if value.get("question").map_or(true, Value::is_null) {
        return Err(ApiError::MissingQuestion);
    }

    serde_json::from_value(value).map_err(|e| ApiError::BadRequest(e.to_string()))
}

fn envelope(response: QueryResponse) -> Response {
    let status = if response.success {
        StatusCode::OK
    } else {
        match response.error_kind.as_deref() {
            Some("validation_error") | Some("input_error") => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    };

    (status, Json(response)).into_response()
}

fn sse_event(event: &StreamEvent) -> Event {
    let data = match event.data() {
        Ok(value) => value.to_string(),
        Err(err) => {
            tracing::error!(event = event.name(), error = %err, "failed to encode stream event");
            json!({ "error": "internal_error" }).to_string()
        }
    };

    Event::default().event(event.name()).data(data)
}
