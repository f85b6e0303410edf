// SPDX-License-Identifier: MIT OR Apache-2.0
//! HTTP ingestion daemon for the correlator: the middleware chain, the
//! ingest and diagnostic handlers, and the server lifecycle that wires them
//! together behind a single [`axum::Router`].
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod auth;
mod cors;
mod correlation;
mod handlers;
mod ingest;
mod logger;
mod problem;
mod public;
mod rate_limit;
mod recovery;
pub mod server;

pub use auth::{AuthState, PluginContext};
pub use cors::CorsSettings;
pub use correlation::CorrelationId;
pub use handlers::{data_consistency, health, not_found, ping, ready, DiagnosticsState};
pub use ingest::{ingest_events, IngestState, MAX_REQUEST_SIZE_BYTES};
pub use public::PublicEndpoints;
pub use rate_limit::RateLimitState;
pub use recovery::install_panic_hook;

use axum::extract::FromRef;
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use axum::Router;
use correlator_config::CorrelatorConfig;
use correlator_keystore::KeyStore;
use correlator_ratelimit::RateLimiter;
use correlator_store::LineageStore;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

/// Every long-lived dependency the router needs, constructed once at
/// startup and cloned (cheaply, via `Arc`) into each middleware layer's
/// own state type.
#[derive(Clone)]
pub struct AppState {
    /// Backing lineage store.
    pub store: Arc<dyn LineageStore>,
    /// Backing API-key store.
    pub keys: Arc<dyn KeyStore>,
    /// Three-tier rate limiter.
    pub limiter: Arc<RateLimiter>,
    /// Paths that bypass auth and rate-limiting.
    pub public_endpoints: PublicEndpoints,
    /// Resolved runtime configuration.
    pub config: CorrelatorConfig,
    /// Process start time, for `/health`'s uptime field.
    pub started_at: Instant,
    /// Operator-supplied namespace aliases loaded from `config.config_path`,
    /// if any. See [`ingest::IngestState::namespace_aliases`].
    pub namespace_aliases: Arc<BTreeMap<String, String>>,
}

impl FromRef<AppState> for DiagnosticsState {
    fn from_ref(state: &AppState) -> Self {
        DiagnosticsState { store: state.store.clone(), started_at: state.started_at }
    }
}

impl FromRef<AppState> for IngestState {
    fn from_ref(state: &AppState) -> Self {
        IngestState {
            store: state.store.clone(),
            namespace_aliases: state.namespace_aliases.clone(),
        }
    }
}

/// Registers `/ping`, `/health`, and `/ready` in `public_endpoints` so the
/// auth and rate-limit middleware bypass them. Route registration and
/// bypass registration must stay in lockstep, so this is the only place
/// either happens.
async fn register_public_endpoints(public_endpoints: &PublicEndpoints) {
    public_endpoints.register("/ping").await;
    public_endpoints.register("/health").await;
    public_endpoints.register("/ready").await;
}

/// Builds the full Axum [`Router`]: routes first, then middleware layered
/// on one at a time from innermost to outermost — in Axum, each `.layer()`
/// call wraps everything added before it, so the *last* call in this chain
/// ends up running first on a request and last on its response. Request
/// order, outermost to innermost: CORS, correlation ID, panic recovery,
/// authentication, rate limiting, request logging, handler. CORS sits
/// outside auth and rate-limiting specifically so a 401 or 429 still
/// carries CORS headers; logging sits innermost so its fields can carry
/// the plugin identity auth attached.
///
/// Authentication is omitted from the chain entirely when
/// `config.auth_enabled` is `false`, matching §4.4's note that an
/// auth-disabled deployment (e.g. local development) must not pay even the
/// public-endpoint-bypass check on every request.
pub async fn build_router(state: AppState) -> Router {
    register_public_endpoints(&state.public_endpoints).await;

    let auth_state = AuthState {
        keys: state.keys.clone(),
        public_endpoints: state.public_endpoints.clone(),
    };
    let rate_limit_state = RateLimitState {
        limiter: state.limiter.clone(),
        public_endpoints: state.public_endpoints.clone(),
    };
    let auth_enabled = state.config.auth_enabled;

    let router = Router::new()
        .route("/ping", get(ping))
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/api/v1/health/data-consistency", get(data_consistency))
        .route("/api/v1/lineage/events", post(ingest_events))
        .fallback(not_found)
        .with_state(state);

    let mut router = router
        .layer(axum::middleware::from_fn(logger::request_logger_middleware))
        .layer(from_fn_with_state(rate_limit_state, rate_limit::rate_limit_middleware));

    if auth_enabled {
        router = router.layer(from_fn_with_state(auth_state, auth::authenticate_plugin_middleware));
    }

    router
        .layer(axum::middleware::from_fn(recovery::recovery_middleware))
        .layer(axum::middleware::from_fn(correlation::correlation_id_middleware))
        .layer(CorsSettings::default().to_layer())
}
