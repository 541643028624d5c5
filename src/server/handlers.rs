//! Request handlers
//!
//! Under the structured policy every response is HTTP 200 and callers branch on `ok`.

use crate::config::StatusPolicy;
use crate::server::AppState;
use crate::worker::{BatchReport, JobResult};
use axum::extract::{RawQuery, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use url::form_urlencoded;
use subtle::ConstantTimeEq;
use tracing::{error, info, warn};

/// Header carrying the shared secret
pub const AGENT_TOKEN_HEADER: &str = "x-agent-token";

#[derive(Debug, Serialize)]
pub struct BatchResponse {
    pub ok: bool,
    pub processed: usize,
    pub results: Vec<JobResult>,
}

impl From<BatchReport> for BatchResponse {
    fn from(report: BatchReport) -> Self {
        Self {
            ok: true,
            processed: report.processed,
            results: report.results,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub ok: bool,
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub pending: i64,
}

/// Build an `{ ok: false, error }` response. `strict_status` is only used under the strict policy.
fn error_response(
    policy: StatusPolicy,
    strict_status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> Response {
    let status = match policy {
        StatusPolicy::Structured => StatusCode::OK,
        StatusPolicy::Strict => strict_status,
    };
    let body = ErrorResponse {
        ok: false,
        error: ErrorDetail {
            code,
            message: message.into(),
        },
    };
    (status, Json(body)).into_response()
}

/// Constant-time comparison of the presented token against the configured secret
pub fn token_matches(expected: &str, presented: Option<&str>) -> bool {
    match presented {
        Some(presented) if !expected.is_empty() => {
            bool::from(expected.as_bytes().ct_eq(presented.as_bytes()))
        }
        _ => false,
    }
}

/// First `n` parameter of a raw query string. Repeated or undecodable pairs never reject the request.
pub fn batch_size_param(query: Option<&str>) -> Option<String> {
    form_urlencoded::parse(query?.as_bytes())
        .find(|(key, _)| key == "n")
        .map(|(_, value)| value.into_owned())
}

/// Requested batch size; missing or unparsable values fall back to `default`.
/// Clamping happens in the runner.
pub fn requested_batch_size(raw: Option<&str>, default: usize) -> i64 {
    let raw = match raw.map(str::trim) {
        Some(raw) if !raw.is_empty() => raw,
        _ => return default as i64,
    };

    if let Ok(n) = raw.parse::<i64>() {
        return n;
    }
    match raw.parse::<f64>() {
        Ok(n) if n.is_finite() => n.trunc() as i64,
        _ => default as i64,
    }
}

/// `POST /` - claim and process up to `n` jobs
pub async fn run_batch(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> Response {
    let presented = headers
        .get(AGENT_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok());
    if !token_matches(&state.agent_token, presented) {
        warn!("Rejected batch request with missing or wrong agent token");
        return error_response(
            state.status_policy,
            StatusCode::UNAUTHORIZED,
            "unauthorized",
            "missing or invalid X-Agent-Token",
        );
    }

    let n = batch_size_param(query.as_deref());
    let requested = requested_batch_size(n.as_deref(), state.runner.config().batch_size);

    match state.runner.run_batch(requested).await {
        Ok(report) => {
            info!(processed = report.processed, "Batch finished");
            (StatusCode::OK, Json(BatchResponse::from(report))).into_response()
        }
        Err(e) => {
            error!("Batch aborted before any job was claimed: {}", e);
            error_response(
                state.status_policy,
                StatusCode::SERVICE_UNAVAILABLE,
                "claim_failed",
                e.to_string(),
            )
        }
    }
}

/// Any method other than POST on `/`
pub async fn method_not_allowed(State(state): State<AppState>) -> Response {
    let mut response = error_response(
        state.status_policy,
        StatusCode::METHOD_NOT_ALLOWED,
        "method_not_allowed",
        "use POST",
    );
    response
        .headers_mut()
        .insert(header::ALLOW, HeaderValue::from_static("POST"));
    response
}

/// `GET /health` - pending queue depth
pub async fn health(State(state): State<AppState>) -> Response {
    match state.runner.store().count_pending().await {
        Ok(pending) => Json(HealthResponse { ok: true, pending }).into_response(),
        Err(e) => {
            error!("Health check failed: {}", e);
            error_response(
                state.status_policy,
                StatusCode::SERVICE_UNAVAILABLE,
                "database_error",
                e.to_string(),
            )
        }
    }
}
