//! `RateLimit` middleware: consults the three-tier limiter using the
//! authenticated plugin ID (empty for unauthenticated callers), bypassing
//! public endpoints entirely.

use crate::auth::PluginContext;
use crate::correlation::CorrelationId;
use crate::problem::problem_response;
use crate::public::PublicEndpoints;
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use correlator_error::ErrorCode;
use correlator_ratelimit::RateLimiter;
use std::sync::Arc;

/// State the rate-limit middleware needs.
#[derive(Clone)]
pub struct RateLimitState {
    /// The three-tier limiter.
    pub limiter: Arc<RateLimiter>,
    /// Paths that bypass rate-limiting entirely.
    pub public_endpoints: PublicEndpoints,
}

/// Axum middleware enforcing §4.4's `RateLimit` step.
pub async fn rate_limit_middleware(State(state): State<RateLimitState>, req: Request, next: Next) -> Response {
    let path = req.uri().path().to_string();
    if state.public_endpoints.contains(&path).await {
        return next.run(req).await;
    }

    let plugin_id = req
        .extensions()
        .get::<PluginContext>()
        .map(|ctx| ctx.plugin_id.clone())
        .unwrap_or_default();

    if state.limiter.allow(&plugin_id).await {
        next.run(req).await
    } else {
        let correlation_id = req
            .extensions()
            .get::<CorrelationId>()
            .map(|id| id.as_str().to_string())
            .unwrap_or_default();
        problem_response(ErrorCode::RateLimited.problem(path, correlation_id))
    }
}
