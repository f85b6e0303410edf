//! `AuthenticatePlugin` middleware: API-key extraction, format validation,
//! store lookup, and active/expiry checks, with a dummy bcrypt comparison
//! on every failure path to equalize timing across failure reasons.

use crate::correlation::CorrelationId;
use crate::problem::problem_response;
use crate::public::PublicEndpoints;
use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use chrono::{DateTime, Utc};
use correlator_error::ErrorCode;
use correlator_keystore::{parse_api_key, ApiKey, KeyStore};
use std::collections::BTreeSet;
use std::sync::{Arc, OnceLock};

/// Per-request identity attached to the request's extensions after a
/// successful auth check. Lives only for the request.
#[derive(Debug, Clone)]
pub struct PluginContext {
    /// Identity of the plugin this key authenticates.
    pub plugin_id: String,
    /// Human-readable label for the key that authenticated this request.
    pub name: String,
    /// Scopes granted to this key.
    pub permissions: BTreeSet<String>,
    /// Opaque identifier of the key that authenticated this request.
    pub key_id: String,
    /// When this request was authenticated.
    pub auth_time: DateTime<Utc>,
}

/// State the auth middleware needs: the key store and the public-endpoint
/// bypass set.
#[derive(Clone)]
pub struct AuthState {
    /// Backing key store.
    pub keys: Arc<dyn KeyStore>,
    /// Paths that skip authentication entirely.
    pub public_endpoints: PublicEndpoints,
}

const HEADER_API_KEY: &str = "x-api-key";
const HEADER_AUTHORIZATION: &str = "authorization";
const BEARER_PREFIX: &str = "Bearer ";

/// Axum middleware enforcing §4.4's `AuthenticatePlugin` step. Skipped
/// entirely for paths in `state.public_endpoints`.
pub async fn authenticate_plugin_middleware(
    State(state): State<AuthState>,
    mut req: Request,
    next: Next,
) -> Response {
    let path = req.uri().path().to_string();
    if state.public_endpoints.contains(&path).await {
        return next.run(req).await;
    }

    let correlation_id = req
        .extensions()
        .get::<CorrelationId>()
        .map(|id| id.as_str().to_string())
        .unwrap_or_default();

    match authenticate(&state.keys, req.headers()).await {
        Ok(context) => {
            req.extensions_mut().insert(context);
            next.run(req).await
        }
        Err(code) => {
            dummy_compare().await;
            problem_response(code.problem(path, correlation_id))
        }
    }
}

async fn authenticate(keys: &Arc<dyn KeyStore>, headers: &HeaderMap) -> Result<PluginContext, ErrorCode> {
    let token = extract_candidate_key(headers).ok_or(ErrorCode::MissingApiKey)?;

    parse_api_key(&token).map_err(|_| ErrorCode::InvalidApiKey)?;

    let key = keys
        .find_by_key(&token)
        .await
        .map_err(|_| ErrorCode::StorageUnavailable)?
        .ok_or(ErrorCode::InvalidApiKey)?;

    check_active_and_expiry(&key, Utc::now())?;

    Ok(PluginContext {
        plugin_id: key.plugin_id,
        name: key.name,
        permissions: key.permissions,
        key_id: key.id,
        auth_time: Utc::now(),
    })
}

/// Revocation is checked before expiry: a soft-deleted key is a permanent,
/// operator-driven fact about the key, while expiry is merely a clock
/// comparison, so a key that is both inactive and expired reports as
/// inactive.
fn check_active_and_expiry(key: &ApiKey, now: DateTime<Utc>) -> Result<(), ErrorCode> {
    if !key.active {
        return Err(ErrorCode::ApiKeyInactive);
    }
    if let Some(expires_at) = key.expires_at {
        if expires_at <= now {
            return Err(ErrorCode::ApiKeyExpired);
        }
    }
    Ok(())
}

/// Extracts the candidate token: `X-Api-Key` takes precedence over
/// `Authorization: Bearer`; a key containing CR or LF is rejected outright;
/// leading/trailing whitespace is trimmed.
fn extract_candidate_key(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers.get(HEADER_API_KEY) {
        return sanitize(value.as_bytes());
    }

    if let Some(value) = headers.get(HEADER_AUTHORIZATION) {
        let bytes = value.as_bytes();
        if bytes.starts_with(BEARER_PREFIX.as_bytes()) {
            return sanitize(&bytes[BEARER_PREFIX.len()..]);
        }
    }

    None
}

fn sanitize(raw: &[u8]) -> Option<String> {
    if raw.contains(&b'\r') || raw.contains(&b'\n') {
        return None;
    }
    let text = std::str::from_utf8(raw).ok()?;
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// The two fixed strings compared on every auth failure so a wrong-format,
/// not-found, and wrong-secret failure all pay the same bcrypt cost.
/// Removing this comparison would leak which failure occurred via timing.
const DUMMY_CANDIDATE: &str = "correlator-dummy-candidate";
static DUMMY_HASH: OnceLock<String> = OnceLock::new();

async fn dummy_compare() {
    let hash = dummy_hash().to_string();
    let _ = tokio::task::spawn_blocking(move || bcrypt::verify(DUMMY_CANDIDATE, &hash)).await;
}

fn dummy_hash() -> &'static str {
    DUMMY_HASH.get_or_init(|| {
        bcrypt::hash(DUMMY_CANDIDATE, bcrypt::DEFAULT_COST)
            .unwrap_or_else(|_| DUMMY_CANDIDATE.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample_key() -> ApiKey {
        ApiKey {
            id: "k1".to_string(),
            key_hash: correlator_keystore::hash_key("irrelevant"),
            plugin_id: "dbt-plugin".to_string(),
            name: "dbt".to_string(),
            permissions: BTreeSet::from(["lineage:write".to_string()]),
            created_at: Utc::now(),
            expires_at: None,
            active: true,
        }
    }

    #[test]
    fn api_key_header_takes_precedence_over_bearer() {
        let mut headers = HeaderMap::new();
        headers.insert(HEADER_API_KEY, "from-api-key-header".parse().unwrap());
        headers.insert(HEADER_AUTHORIZATION, "Bearer from-bearer".parse().unwrap());
        assert_eq!(extract_candidate_key(&headers).as_deref(), Some("from-api-key-header"));
    }

    #[test]
    fn falls_back_to_bearer_when_no_api_key_header() {
        let mut headers = HeaderMap::new();
        headers.insert(HEADER_AUTHORIZATION, "Bearer only-bearer".parse().unwrap());
        assert_eq!(extract_candidate_key(&headers).as_deref(), Some("only-bearer"));
    }

    #[test]
    fn whitespace_is_trimmed() {
        let mut headers = HeaderMap::new();
        headers.insert(HEADER_API_KEY, "  padded  ".parse().unwrap());
        assert_eq!(extract_candidate_key(&headers).as_deref(), Some("padded"));
    }

    #[test]
    fn no_headers_yields_none() {
        let headers = HeaderMap::new();
        assert_eq!(extract_candidate_key(&headers), None);
    }

    #[test]
    fn inactive_key_reports_inactive_even_if_also_expired() {
        let key = ApiKey {
            active: false,
            expires_at: Some(Utc::now() - Duration::seconds(1)),
            ..sample_key()
        };
        assert_eq!(check_active_and_expiry(&key, Utc::now()), Err(ErrorCode::ApiKeyInactive));
    }

    #[test]
    fn expired_active_key_reports_expired() {
        let key = ApiKey {
            expires_at: Some(Utc::now() - Duration::seconds(1)),
            ..sample_key()
        };
        assert_eq!(check_active_and_expiry(&key, Utc::now()), Err(ErrorCode::ApiKeyExpired));
    }

    #[test]
    fn active_unexpired_key_passes() {
        let key = sample_key();
        assert!(check_active_and_expiry(&key, Utc::now()).is_ok());
    }

    #[tokio::test]
    async fn dummy_compare_completes_without_panicking() {
        dummy_compare().await;
    }
}
