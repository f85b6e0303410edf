//! The public-endpoint bypass set: paths that skip both authentication and
//! rate limiting. Process-wide state, written only during route setup.
//!
//! Deliberately exposes only [`PublicEndpoints::register`] — there is no
//! run-time deregister, so a business endpoint can never be accidentally
//! opened to the world after startup.

use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;

/// The set of request paths that bypass auth and rate-limiting.
#[derive(Debug, Clone, Default)]
pub struct PublicEndpoints {
    paths: Arc<RwLock<HashSet<String>>>,
}

impl PublicEndpoints {
    /// Creates an empty bypass set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `path` to the bypass set. Intended to be called only while
    /// routes are being registered.
    pub async fn register(&self, path: impl Into<String>) {
        self.paths.write().await.insert(path.into());
    }

    /// Whether `path` is in the bypass set.
    pub async fn contains(&self, path: &str) -> bool {
        self.paths.read().await.contains(path)
    }
}
