//! Background idle-eviction task for the per-plugin bucket map.

use crate::RateLimiter;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Handle to the running cleanup task. Dropping it does not stop the task —
/// call [`Self::stop`] during shutdown so the limiter's buckets are released
/// deterministically.
pub struct CleanupHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl CleanupHandle {
    /// Signals the cleanup task to exit and waits for it to finish.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }
}

/// Starts the background task that wakes every `cleanup_interval` and
/// evicts plugin buckets idle longer than `idle_timeout`.
pub fn spawn_cleanup_task(limiter: Arc<RateLimiter>) -> CleanupHandle {
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let interval = limiter.cleanup_interval();

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await; // first tick fires immediately; skip it
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    limiter.evict_idle().await;
                }
                _ = shutdown_rx.changed() => {
                    break;
                }
            }
        }
    });

    CleanupHandle { shutdown: shutdown_tx, task }
}
