//! Correlation-ID middleware: the outermost layer in the chain so every
//! response, including one produced by a panic three layers down, carries
//! an `X-Correlation-ID` header.

use axum::extract::Request;
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::Response;
use rand::rngs::OsRng;
use rand::RngCore;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static FALLBACK_COUNTER: AtomicU64 = AtomicU64::new(0);

/// The correlation ID attached to a request's extensions, available to every
/// handler and middleware layer below this one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelationId(pub String);

impl CorrelationId {
    /// Borrows the 16-hex-char string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

const HEADER_NAME: &str = "x-correlation-id";

/// Reads `X-Correlation-ID` if present, else generates 16 hex chars from a
/// CSPRNG. Attaches the result to the request's extensions and echoes it on
/// the response, whatever that response turns out to be.
pub async fn correlation_id_middleware(mut req: Request, next: Next) -> Response {
    let id = match req.headers().get(HEADER_NAME) {
        Some(value) => value
            .to_str()
            .ok()
            .map(|s| CorrelationId(s.to_string()))
            .unwrap_or_else(generate),
        None => generate(),
    };

    req.extensions_mut().insert(id.clone());

    let mut resp = next.run(req).await;
    if let Ok(header_value) = HeaderValue::from_str(&id.0) {
        resp.headers_mut().insert("x-correlation-id", header_value);
    }
    resp
}

/// Generates a fresh 16-hex-char correlation ID. Tries a CSPRNG first;
/// falls back to a timestamp+address entropy source (still hex-encoded and
/// padded to 16 chars) if the CSPRNG is unavailable, so correlation-ID
/// generation can never fail a request.
fn generate() -> CorrelationId {
    let mut bytes = [0u8; 8];
    match OsRng.try_fill_bytes(&mut bytes) {
        Ok(()) => CorrelationId(hex::encode(bytes)),
        Err(_) => CorrelationId(fallback_id()),
    }
}

fn fallback_id() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    // Process-local counter stands in for address entropy: varies between
    // calls even if the clock hasn't ticked, with no unsafe pointer games.
    let salt = FALLBACK_COUNTER.fetch_add(1, Ordering::Relaxed);

    let raw = format!("{nanos:016x}{salt:016x}");
    raw.chars().take(16).collect()
}
