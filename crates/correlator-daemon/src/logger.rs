//! `RequestLogger` middleware: logs request start and completion at INFO
//! with correlation ID, method, path, status, and duration as structured
//! `tracing` fields rather than an interpolated string.

use crate::correlation::CorrelationId;
use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;
use std::time::Instant;

/// Axum middleware implementing §4.4's `RequestLogger` step.
pub async fn request_logger_middleware(req: Request, next: Next) -> Response {
    let correlation_id = req
        .extensions()
        .get::<CorrelationId>()
        .map(|id| id.as_str().to_string())
        .unwrap_or_default();
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    tracing::info!(
        correlation_id = %correlation_id,
        http.method = %method,
        http.path = %path,
        "request started"
    );

    let start = Instant::now();
    let resp = next.run(req).await;
    let duration = start.elapsed();

    tracing::info!(
        correlation_id = %correlation_id,
        http.method = %method,
        http.path = %path,
        http.status = resp.status().as_u16(),
        http.duration_ms = duration.as_millis() as u64,
        "request completed"
    );

    resp
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request as HttpRequest;
    use axum::http::StatusCode;
    use axum::middleware::from_fn;
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    #[tokio::test]
    async fn request_passes_through_unmodified() {
        let app = Router::new()
            .route("/ok", get(|| async { "ok" }))
            .layer(from_fn(request_logger_middleware));

        let resp = app
            .oneshot(HttpRequest::builder().uri("/ok").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
