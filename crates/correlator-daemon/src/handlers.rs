//! Public and protected diagnostic handlers: `/ping`, `/health`, `/ready`,
//! the data-consistency endpoint, and the catch-all 404.

use crate::correlation::CorrelationId;
use crate::problem::problem_response;
use axum::extract::{Request, State};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use correlator_error::ErrorCode;
use correlator_store::LineageStore;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Crate version, echoed on the `/health` body and `X-Correlator-Version`
/// header.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
const SERVICE_NAME: &str = "correlator";
const READY_PROBE_DEADLINE: Duration = Duration::from_secs(2);

/// State the diagnostic handlers need.
#[derive(Clone)]
pub struct DiagnosticsState {
    /// Backing lineage store, for the readiness probe and consistency check.
    pub store: Arc<dyn LineageStore>,
    /// Process start time, for the `/health` `uptime` field.
    pub started_at: Instant,
}

fn with_version_header(mut resp: Response) -> Response {
    if let Ok(value) = HeaderValue::from_str(VERSION) {
        resp.headers_mut().insert("x-correlator-version", value);
    }
    resp
}

/// `GET /ping` — the shallowest liveness probe, no downstream checks.
pub async fn ping() -> Response {
    with_version_header("pong".into_response())
}

#[derive(Debug, Serialize)]
struct HealthBody {
    status: &'static str,
    #[serde(rename = "serviceName")]
    service_name: &'static str,
    version: &'static str,
    uptime: u64,
}

/// `GET /health` — static process health, no downstream dependency.
pub async fn health(State(state): State<DiagnosticsState>) -> Response {
    let body = HealthBody {
        status: "ok",
        service_name: SERVICE_NAME,
        version: VERSION,
        uptime: state.started_at.elapsed().as_secs(),
    };
    with_version_header(Json(body).into_response())
}

/// `GET /ready` — liveness plus a storage health check under a 2-second
/// deadline.
pub async fn ready(State(state): State<DiagnosticsState>) -> Response {
    let probe = tokio::time::timeout(READY_PROBE_DEADLINE, state.store.health_check()).await;
    match probe {
        Ok(Ok(())) => (StatusCode::OK, "ready").into_response(),
        _ => (StatusCode::SERVICE_UNAVAILABLE, "storage unavailable").into_response(),
    }
}

/// `GET /api/v1/health/data-consistency` — operator-facing row-count
/// diagnostic. Protected: requires auth and counts against the rate limit.
pub async fn data_consistency(req: Request, State(state): State<DiagnosticsState>) -> Response {
    let path = req.uri().path().to_string();
    let correlation_id = req
        .extensions()
        .get::<CorrelationId>()
        .map(|id| id.as_str().to_string())
        .unwrap_or_default();

    match state.store.counts().await {
        Ok(counts) => Json(counts).into_response(),
        Err(_) => problem_response(ErrorCode::StorageUnavailable.problem(path, correlation_id)),
    }
}

/// Catch-all for any route not registered: `404 application/problem+json`.
pub async fn not_found(req: Request) -> Response {
    let path = req.uri().path().to_string();
    let correlation_id = req
        .extensions()
        .get::<CorrelationId>()
        .map(|id| id.as_str().to_string())
        .unwrap_or_default();
    problem_response(ErrorCode::NotFound.problem(path, correlation_id))
}
