// SPDX-License-Identifier: MIT OR Apache-2.0
//! RFC 7807 problem-detail construction, shared by every HTTP-facing crate
//! in the correlator so the error envelope is byte-identical regardless of
//! which middleware layer or handler produced it.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use serde::{Deserialize, Serialize};
use std::fmt;

/// A [RFC 7807](https://www.rfc-editor.org/rfc/rfc7807) problem-detail body,
/// with the `correlation_id` extension member the correlator always
/// includes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProblemDetails {
    /// A URI identifying the problem type, e.g. `https://correlator.io/problems/401`.
    #[serde(rename = "type")]
    pub problem_type: String,
    /// Short, human-readable summary of the problem type.
    pub title: String,
    /// The HTTP status code.
    pub status: u16,
    /// Human-readable explanation specific to this occurrence.
    pub detail: String,
    /// The request path that produced this problem.
    pub instance: String,
    /// The correlation ID of the request that produced this problem.
    pub correlation_id: String,
}

impl ProblemDetails {
    /// Build a problem-detail body for `status`, using the fixed
    /// status→title mapping from the correlator's error envelope contract.
    pub fn new(
        status: u16,
        detail: impl Into<String>,
        instance: impl Into<String>,
        correlation_id: impl Into<String>,
    ) -> Self {
        Self {
            problem_type: format!("https://correlator.io/problems/{status}"),
            title: title_for_status(status).to_string(),
            status,
            detail: detail.into(),
            instance: instance.into(),
            correlation_id: correlation_id.into(),
        }
    }
}

/// Fixed status→title mapping used by every problem-detail body.
fn title_for_status(status: u16) -> &'static str {
    match status {
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        413 => "Payload Too Large",
        415 => "Unsupported Media Type",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Error",
    }
}

/// Broad family an [`ErrorCode`] belongs to, for metrics and log grouping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Malformed, oversized, or wrong-content-type requests.
    RequestShape,
    /// Authentication/authorization failures.
    Auth,
    /// Rate-limit denials.
    RateLimit,
    /// Per-event validation failures inside a batch.
    Validation,
    /// Transient storage failures.
    Storage,
    /// Canonicalization failures (malformed namespace/URN/job-run-id).
    Canonicalization,
    /// Catch-all for unexpected internal errors.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::RequestShape => "request_shape",
            Self::Auth => "auth",
            Self::RateLimit => "rate_limit",
            Self::Validation => "validation",
            Self::Storage => "storage",
            Self::Canonicalization => "canonicalization",
            Self::Internal => "internal",
        };
        f.write_str(s)
    }
}

/// Machine-readable, stable error code used in structured log fields.
///
/// Each variant serializes to a `SCREAMING_SNAKE_CASE` string guaranteed not
/// to change across patch releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Request body was not valid JSON.
    #[error("malformed JSON body")]
    MalformedJson,
    /// `Content-Type` did not begin with `application/json`.
    #[error("unsupported content type")]
    UnsupportedContentType,
    /// Request body exceeded `MaxRequestSize`.
    #[error("request body too large")]
    PayloadTooLarge,
    /// No API key was supplied.
    #[error("Missing API key")]
    MissingApiKey,
    /// The key was malformed, unknown, or paired with the wrong secret.
    /// Deliberately generic — it must never disclose *why* the key was
    /// rejected, to prevent key enumeration.
    #[error("Invalid API key")]
    InvalidApiKey,
    /// The key has expired. Disclosure is intentional here, unlike
    /// [`Self::InvalidApiKey`] — an expired key is not an enumeration risk.
    #[error("API key expired")]
    ApiKeyExpired,
    /// The key was soft-deleted. Disclosure is intentional, as above.
    #[error("API key inactive")]
    ApiKeyInactive,
    /// The caller exceeded its rate-limit tier.
    #[error("rate limit exceeded")]
    RateLimited,
    /// The storage backend is unreachable.
    #[error("storage unavailable")]
    StorageUnavailable,
    /// The requested route does not exist.
    #[error("not found")]
    NotFound,
    /// Catch-all for unexpected internal errors (including recovered panics).
    #[error("internal error")]
    Internal,
}

impl ErrorCode {
    /// Returns the broad [`ErrorCategory`] this code belongs to.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::MalformedJson | Self::UnsupportedContentType | Self::PayloadTooLarge => {
                ErrorCategory::RequestShape
            }
            Self::MissingApiKey
            | Self::InvalidApiKey
            | Self::ApiKeyExpired
            | Self::ApiKeyInactive => ErrorCategory::Auth,
            Self::RateLimited => ErrorCategory::RateLimit,
            Self::StorageUnavailable => ErrorCategory::Storage,
            Self::NotFound => ErrorCategory::RequestShape,
            Self::Internal => ErrorCategory::Internal,
        }
    }

    /// The HTTP status this code maps to.
    pub fn status(&self) -> u16 {
        match self {
            Self::MalformedJson => 400,
            Self::UnsupportedContentType => 415,
            Self::PayloadTooLarge => 413,
            Self::MissingApiKey | Self::InvalidApiKey | Self::ApiKeyExpired => 401,
            Self::ApiKeyInactive => 403,
            Self::RateLimited => 429,
            Self::StorageUnavailable => 503,
            Self::NotFound => 404,
            Self::Internal => 500,
        }
    }

    /// Build a [`ProblemDetails`] for this code with the given `instance`
    /// path and `correlation_id`.
    pub fn problem(&self, instance: impl Into<String>, correlation_id: impl Into<String>) -> ProblemDetails {
        ProblemDetails::new(self.status(), self.to_string(), instance, correlation_id)
    }
}
