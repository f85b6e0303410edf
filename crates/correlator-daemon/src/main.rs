// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]

use anyhow::{Context, Result};
use clap::Parser;
use correlator_config::CorrelatorConfig;
use correlator_daemon::{install_panic_hook, server, AppState, PublicEndpoints};
use correlator_keystore::{InMemoryKeyStore, KeyStore, SqlxKeyStore};
use correlator_ratelimit::{spawn_cleanup_task, RateLimiter};
use correlator_store::{InMemoryLineageStore, LineageStore, SqlxLineageStore};
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::Arc;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "correlator-daemon", version, about = "OpenLineage incident-correlation ingestion daemon")]
struct Args {
    /// Overrides `CORRELATOR_PORT`.
    #[arg(long)]
    port: Option<u16>,

    /// `sqlite://path/to/file.db`. Falls back to an in-memory, non-durable
    /// store when unset — fine for local development, a degraded mode in
    /// production.
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = CorrelatorConfig::from_env().context("loading configuration from environment")?;
    let port = args.port.unwrap_or(config.port);

    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    install_panic_hook();

    let (lineage_store, key_store): (Arc<dyn LineageStore>, Arc<dyn KeyStore>) = match &args.database_url {
        Some(url) => {
            tracing::info!("connecting to persistent store");
            let pool = SqlitePoolOptions::new()
                .max_connections(10)
                .connect(url)
                .await
                .with_context(|| format!("connecting to {url}"))?;

            let store = SqlxLineageStore::new(pool.clone());
            store.ensure_schema().await.context("creating lineage schema")?;

            let keys = SqlxKeyStore::new(pool);
            keys.ensure_schema().await.context("creating api_keys schema")?;

            (Arc::new(store), Arc::new(keys))
        }
        None => {
            tracing::warn!("DATABASE_URL not set; running with an in-memory, non-durable store");
            (Arc::new(InMemoryLineageStore::new()), Arc::new(InMemoryKeyStore::new()))
        }
    };

    let limiter = Arc::new(RateLimiter::new(config.rate_limit.clone()));
    let cleanup = spawn_cleanup_task(limiter.clone());

    let namespace_aliases = match config.load_namespace_aliases() {
        Ok((overlay, warnings)) => {
            for warning in warnings {
                tracing::info!(%warning, "namespace alias overlay");
            }
            overlay.aliases
        }
        Err(err) => {
            tracing::warn!(error = %err, "failed to load namespace alias overlay, proceeding without it");
            Default::default()
        }
    };

    let state = AppState {
        store: lineage_store,
        keys: key_store,
        limiter,
        public_endpoints: PublicEndpoints::new(),
        config,
        started_at: Instant::now(),
        namespace_aliases: Arc::new(namespace_aliases),
    };

    let result = server::serve(state, port, server::shutdown_signal()).await;

    cleanup.stop().await;
    result
}
