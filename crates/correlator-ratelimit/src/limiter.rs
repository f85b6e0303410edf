//! The three-tier limiter the middleware chain calls through `allow`.

use crate::bucket::TokenBucket;
use correlator_config::RateLimiterConfig;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, RwLock};

/// Three-tier token-bucket rate limiter: one global bucket, one shared
/// unauthenticated bucket, and a lazily-created bucket per plugin.
///
/// The chain interacts only with [`Self::allow`]; the cleanup ticker and the
/// plugin map are private so a distributed implementation can substitute at
/// construction time with no change to callers.
pub struct RateLimiter {
    global: Mutex<TokenBucket>,
    unauthenticated: Mutex<TokenBucket>,
    plugins: RwLock<HashMap<String, Arc<Mutex<TokenBucket>>>>,
    plugin_rate: u32,
    plugin_burst: u32,
    config: RateLimiterConfig,
}

impl RateLimiter {
    /// Builds a limiter from a fully-resolved [`RateLimiterConfig`].
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            global: Mutex::new(TokenBucket::new(config.global.rate, config.global.burst)),
            unauthenticated: Mutex::new(TokenBucket::new(
                config.unauthenticated.rate,
                config.unauthenticated.burst,
            )),
            plugins: RwLock::new(HashMap::new()),
            plugin_rate: config.plugin.rate,
            plugin_burst: config.plugin.burst,
            config,
        }
    }

    /// Evaluates whether a request identified by `plugin_id` (empty for
    /// unauthenticated callers) may proceed.
    ///
    /// Order: the global tier is checked first and fails fast; an empty
    /// `plugin_id` then falls to the shared unauthenticated bucket;
    /// otherwise the caller's own bucket is consulted, created lazily under
    /// a write lock with double-checked locking if this is its first use.
    pub async fn allow(&self, plugin_id: &str) -> bool {
        if !self.global.lock().await.try_consume() {
            return false;
        }

        if plugin_id.is_empty() {
            return self.unauthenticated.lock().await.try_consume();
        }

        let bucket = self.plugin_bucket(plugin_id).await;
        bucket.lock().await.try_consume()
    }

    async fn plugin_bucket(&self, plugin_id: &str) -> Arc<Mutex<TokenBucket>> {
        if let Some(existing) = self.plugins.read().await.get(plugin_id) {
            return existing.clone();
        }

        let mut plugins = self.plugins.write().await;
        if let Some(existing) = plugins.get(plugin_id) {
            return existing.clone();
        }

        let bucket = Arc::new(Mutex::new(TokenBucket::new(self.plugin_rate, self.plugin_burst)));
        plugins.insert(plugin_id.to_string(), bucket.clone());

        let live = plugins.len();
        let max_plugins = self.config.max_plugins;
        drop(plugins);

        if max_plugins > 0 && live as f64 >= 0.8 * max_plugins as f64 {
            tracing::warn!(
                live_plugins = live,
                max_plugins,
                "rate limiter plugin bucket count crossed 80% of the advisory ceiling"
            );
        }

        bucket
    }

    /// Removes plugin buckets idle longer than `idle_timeout`. Called by
    /// the background cleanup task started by [`crate::spawn_cleanup_task`];
    /// exposed for direct invocation in tests.
    pub async fn evict_idle(&self) {
        let now = Instant::now();
        let idle_timeout = self.config.idle_timeout;

        let mut idle_ids = Vec::new();
        for (id, bucket) in self.plugins.read().await.iter() {
            if bucket.lock().await.idle_for(now) > idle_timeout {
                idle_ids.push(id.clone());
            }
        }

        if idle_ids.is_empty() {
            return;
        }

        let mut plugins = self.plugins.write().await;
        for id in &idle_ids {
            plugins.remove(id);
        }
        tracing::debug!(evicted = idle_ids.len(), "evicted idle rate-limiter buckets");
    }

    /// Current number of live per-plugin buckets. For tests and diagnostics.
    pub async fn live_plugin_count(&self) -> usize {
        self.plugins.read().await.len()
    }

    /// How often [`Self::evict_idle`] should be invoked by the background task.
    pub fn cleanup_interval(&self) -> std::time::Duration {
        self.config.cleanup_interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use correlator_config::RateLimitTierConfig;
    use std::time::Duration;

    fn config(global: u32, plugin: u32, unauth: u32) -> RateLimiterConfig {
        RateLimiterConfig {
            global: RateLimitTierConfig { rate: global, burst: global },
            plugin: RateLimitTierConfig { rate: plugin, burst: plugin },
            unauthenticated: RateLimitTierConfig { rate: unauth, burst: unauth },
            cleanup_interval: Duration::from_secs(300),
            idle_timeout: Duration::from_secs(3600),
            max_plugins: 10_000,
        }
    }

    #[tokio::test]
    async fn global_tier_fails_fast_before_touching_plugin_bucket() {
        let limiter = RateLimiter::new(config(0, 100, 100));
        assert!(!limiter.allow("dbt-plugin").await);
        assert_eq!(limiter.live_plugin_count().await, 0);
    }

    #[tokio::test]
    async fn empty_plugin_id_uses_shared_unauthenticated_bucket() {
        let limiter = RateLimiter::new(config(100, 100, 1));
        assert!(limiter.allow("").await);
        assert!(!limiter.allow("").await);
    }

    #[tokio::test]
    async fn distinct_plugins_get_independent_buckets() {
        let limiter = RateLimiter::new(config(100, 1, 100));
        assert!(limiter.allow("dbt").await);
        assert!(!limiter.allow("dbt").await);
        assert!(limiter.allow("airflow").await);
    }

    #[tokio::test]
    async fn plugin_bucket_is_created_lazily() {
        let limiter = RateLimiter::new(config(100, 5, 100));
        assert_eq!(limiter.live_plugin_count().await, 0);
        limiter.allow("dbt").await;
        assert_eq!(limiter.live_plugin_count().await, 1);
    }

    #[tokio::test]
    async fn burst_then_rate_over_time_matches_spec_scenario() {
        // CORRELATOR_PLUGIN_RPS=2, BURST=2: first 2 succeed, rest denied.
        let limiter = RateLimiter::new(config(1000, 2, 1000));
        let mut accepted = 0;
        for _ in 0..10 {
            if limiter.allow("dbt").await {
                accepted += 1;
            }
        }
        assert_eq!(accepted, 2);
    }

    #[tokio::test]
    async fn evict_idle_removes_only_stale_buckets() {
        let mut cfg = config(100, 100, 100);
        cfg.idle_timeout = Duration::from_secs(60);
        let limiter = RateLimiter::new(cfg);
        limiter.allow("stale").await;
        limiter.allow("fresh").await;

        {
            let plugins = limiter.plugins.write().await;
            let stale = plugins.get("stale").unwrap().clone();
            drop(plugins);
            stale.lock().await.backdate_last_access(Duration::from_secs(120));
        }

        limiter.evict_idle().await;
        assert_eq!(limiter.live_plugin_count().await, 1);
        assert!(limiter.plugins.read().await.contains_key("fresh"));
    }
}
