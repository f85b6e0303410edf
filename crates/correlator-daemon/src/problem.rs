//! Converts a [`ProblemDetails`] into an `application/problem+json` Axum
//! response, shared by every middleware layer and the ingest handler so the
//! envelope is byte-identical regardless of where it was produced.

use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use correlator_error::ProblemDetails;

/// Builds the HTTP response for a problem-detail body: the status encoded
/// in `problem.status`, `Content-Type: application/problem+json`, and the
/// JSON-serialized body.
pub fn problem_response(problem: ProblemDetails) -> Response {
    let status =
        StatusCode::from_u16(problem.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut resp = (status, Json(problem)).into_response();
    resp.headers_mut().insert(
        axum::http::header::CONTENT_TYPE,
        HeaderValue::from_static("application/problem+json"),
    );
    resp
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[tokio::test]
    async fn sets_problem_json_content_type_and_status() {
        let problem = ProblemDetails::new(429, "rate limit exceeded", "/api/v1/lineage/events", "abc123");
        let resp = problem_response(problem);
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            resp.headers().get("content-type").unwrap(),
            "application/problem+json"
        );
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["correlation_id"], "abc123");
    }
}
