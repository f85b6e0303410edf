// SPDX-License-Identifier: MIT OR Apache-2.0
//! End-to-end coverage of the daemon's documented request/response contract:
//! the ping probe, missing-key rejection, first-time ingest with dataset URN
//! collision, idempotent re-ingest, a partially-invalid batch, and rate
//! limiting.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use correlator_config::{CorrelatorConfig, RateLimitTierConfig, RateLimiterConfig};
use correlator_daemon::{build_router, AppState, PublicEndpoints};
use correlator_keystore::{hash_key, ApiKey, InMemoryKeyStore, KeyStore};
use correlator_ratelimit::RateLimiter;
use correlator_store::InMemoryLineageStore;
use http_body_util::BodyExt;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

const VALID_KEY: &str = "correlator_ak_0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

fn generous_rate_limit() -> RateLimiterConfig {
    RateLimiterConfig {
        global: RateLimitTierConfig { rate: 1000, burst: 1000 },
        plugin: RateLimitTierConfig { rate: 1000, burst: 1000 },
        unauthenticated: RateLimitTierConfig { rate: 1000, burst: 1000 },
        cleanup_interval: Duration::from_secs(300),
        idle_timeout: Duration::from_secs(3600),
        max_plugins: 100,
    }
}

async fn state_with(rate_limit: RateLimiterConfig, auth_enabled: bool, keys: InMemoryKeyStore) -> AppState {
    if auth_enabled {
        keys.add(ApiKey {
            id: "key-1".to_string(),
            key_hash: hash_key(VALID_KEY),
            plugin_id: "dbt-plugin".to_string(),
            name: "dbt integration".to_string(),
            permissions: BTreeSet::from(["lineage:write".to_string()]),
            created_at: chrono::Utc::now(),
            expires_at: None,
            active: true,
        })
        .await
        .unwrap();
    }

    let config = CorrelatorConfig {
        port: 0,
        auth_enabled,
        rate_limit: rate_limit.clone(),
        log_level: "info".to_string(),
        config_path: std::path::PathBuf::from(".correlator.yaml"),
    };

    AppState {
        store: Arc::new(InMemoryLineageStore::new()),
        keys: Arc::new(keys),
        limiter: Arc::new(RateLimiter::new(rate_limit)),
        public_endpoints: PublicEndpoints::new(),
        config,
        started_at: Instant::now(),
        namespace_aliases: Arc::new(std::collections::BTreeMap::new()),
    }
}

fn single_event_body() -> &'static str {
    r#"{
        "eventTime":"2025-10-22T10:00:00.000000000Z",
        "eventType":"COMPLETE",
        "producer":"https://github.com/dbt-labs/dbt-core/tree/1.5.0",
        "run":{"runId":"550e8400-e29b-41d4-a716-446655440000"},
        "job":{"namespace":"dbt://analytics","name":"transform_orders"},
        "inputs":[{"namespace":"postgres://prod-db:5432","name":"raw.orders"}],
        "outputs":[{"namespace":"postgresql://prod-db","name":"analytics.orders"}]
    }"#
}

fn ingest_request(body: &'static str, key: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/v1/lineage/events")
        .header("content-type", "application/json");
    if let Some(key) = key {
        builder = builder.header("x-api-key", key);
    }
    builder.body(Body::from(body)).unwrap()
}

#[tokio::test]
async fn scenario_1_ping_with_no_key_returns_pong_and_correlation_header() {
    let state = state_with(generous_rate_limit(), true, InMemoryKeyStore::new()).await;
    let router = build_router(state).await;

    let resp = router
        .oneshot_request(Request::builder().uri("/ping").body(Body::empty()).unwrap())
        .await;

    assert_eq!(resp.status(), StatusCode::OK);
    let header = resp.headers().get("x-correlation-id").unwrap().to_str().unwrap();
    assert_eq!(header.len(), 16);
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], b"pong");
}

#[tokio::test]
async fn scenario_2_ingest_with_no_key_is_unauthorized() {
    let state = state_with(generous_rate_limit(), true, InMemoryKeyStore::new()).await;
    let router = build_router(state).await;

    let resp = router
        .oneshot_request(ingest_request(single_event_body(), None))
        .await;

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], 401);
    assert_eq!(json["detail"], "Missing API key");
    assert_eq!(json["instance"], "/api/v1/lineage/events");
    assert_eq!(json["correlation_id"].as_str().unwrap().len(), 16);
}

#[tokio::test]
async fn scenario_3_valid_single_event_collides_namespaces() {
    let state = state_with(generous_rate_limit(), true, InMemoryKeyStore::new()).await;
    let store = state.store.clone();
    let router = build_router(state).await;

    let resp = router
        .oneshot_request(ingest_request(single_event_body(), Some(VALID_KEY)))
        .await;

    assert_eq!(resp.status(), StatusCode::OK);
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["summary"]["received"], 1);
    assert_eq!(json["summary"]["successful"], 1);
    assert_eq!(json["summary"]["failed"], 0);

    let counts = store.counts().await.unwrap();
    assert_eq!(counts.datasets, 2, "input and output namespaces collide but remain distinct dataset URNs");
}

#[tokio::test]
async fn scenario_4_repeat_ingest_is_idempotent() {
    let state = state_with(generous_rate_limit(), true, InMemoryKeyStore::new()).await;
    let store = state.store.clone();
    let router = build_router(state).await;

    let first = router
        .clone()
        .oneshot_request(ingest_request(single_event_body(), Some(VALID_KEY)))
        .await;
    assert_eq!(first.status(), StatusCode::OK);

    let second = router
        .oneshot_request(ingest_request(single_event_body(), Some(VALID_KEY)))
        .await;
    assert_eq!(second.status(), StatusCode::OK);
    let body = second.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["summary"]["received"], 1);
    assert_eq!(json["summary"]["successful"], 1);

    let counts = store.counts().await.unwrap();
    assert_eq!(counts.events, 1, "duplicate event must not add a second row");
}

#[tokio::test]
async fn scenario_5_batch_with_one_invalid_event_type_is_partial_success() {
    let state = state_with(generous_rate_limit(), true, InMemoryKeyStore::new()).await;
    let router = build_router(state).await;

    let batch = r#"[
        {"eventTime":"2025-10-22T10:00:00.000000000Z","eventType":"START",
         "producer":"p","run":{"runId":"run-a"},"job":{"namespace":"dbt://x","name":"job-a"}},
        {"eventTime":"2025-10-22T10:00:01.000000000Z","eventType":"INVALID",
         "producer":"p","run":{"runId":"run-b"},"job":{"namespace":"dbt://x","name":"job-b"}},
        {"eventTime":"2025-10-22T10:00:02.000000000Z","eventType":"COMPLETE",
         "producer":"p","run":{"runId":"run-c"},"job":{"namespace":"dbt://x","name":"job-c"}}
    ]"#;

    let resp = router.oneshot_request(ingest_request(batch, Some(VALID_KEY))).await;
    assert_eq!(resp.status(), StatusCode::from_u16(207).unwrap());

    let body = resp.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["summary"]["received"], 3);
    assert_eq!(json["summary"]["successful"], 2);
    assert_eq!(json["summary"]["failed"], 1);

    let failed = json["failed_events"].as_array().unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0]["index"], 1);
    assert_eq!(failed[0]["reason"], "invalid eventType");
    assert_eq!(failed[0]["retriable"], false);
}

#[tokio::test]
async fn scenario_6_plugin_burst_then_recovery() {
    let tight = RateLimiterConfig {
        global: RateLimitTierConfig { rate: 1000, burst: 1000 },
        plugin: RateLimitTierConfig { rate: 2, burst: 2 },
        unauthenticated: RateLimitTierConfig { rate: 1000, burst: 1000 },
        cleanup_interval: Duration::from_secs(300),
        idle_timeout: Duration::from_secs(3600),
        max_plugins: 100,
    };
    let state = state_with(tight, true, InMemoryKeyStore::new()).await;
    let router = build_router(state).await;

    // /ping is a public endpoint and bypasses the limiter entirely, so the
    // burst itself is exercised against a protected route.
    let mut protected_statuses = Vec::new();
    for _ in 0..10 {
        let resp = router
            .clone()
            .oneshot_request(ingest_request(single_event_body(), Some(VALID_KEY)))
            .await;
        protected_statuses.push(resp.status());
    }

    let accepted = protected_statuses.iter().filter(|s| **s != StatusCode::TOO_MANY_REQUESTS).count();
    let rejected = protected_statuses.iter().filter(|s| **s == StatusCode::TOO_MANY_REQUESTS).count();
    assert_eq!(accepted, 2, "burst of 2 should let exactly two requests through");
    assert_eq!(rejected, 8);

    tokio::time::sleep(Duration::from_secs(1)).await;

    let resp = router
        .oneshot_request(ingest_request(single_event_body(), Some(VALID_KEY)))
        .await;
    assert_ne!(resp.status(), StatusCode::TOO_MANY_REQUESTS, "bucket should have refilled after 1s");
}

/// Thin `oneshot` wrapper so call sites read `router.oneshot_request(req)`
/// without importing `tower::ServiceExt` at every call site.
trait OneshotExt {
    async fn oneshot_request(self, req: Request<Body>) -> axum::response::Response;
}

impl OneshotExt for axum::Router {
    async fn oneshot_request(self, req: Request<Body>) -> axum::response::Response {
        use tower::ServiceExt;
        self.oneshot(req).await.unwrap()
    }
}
