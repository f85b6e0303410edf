//! Server lifecycle: binds the listener, serves the router, and drains
//! in-flight requests on shutdown instead of dropping them mid-response.

use crate::AppState;
use axum::Router;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;

/// How long [`serve`] waits for in-flight requests to finish once a
/// shutdown signal arrives before the listener is torn down regardless.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Binds `port` on all interfaces, builds the router from `state`, and
/// serves until `shutdown` resolves. Blocks the calling task for the
/// lifetime of the server.
pub async fn serve(
    state: AppState,
    port: u16,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "listening");

    let router: Router = crate::build_router(state).await;

    let (fired_tx, fired_rx) = tokio::sync::oneshot::channel::<()>();
    let on_signal = async move {
        shutdown.await;
        tracing::info!("shutdown signal received, draining in-flight requests");
        let _ = fired_tx.send(());
    };

    let serving = axum::serve(listener, router).with_graceful_shutdown(on_signal);

    // Races the drain against a deadline that only starts once the signal
    // fires: a busy connection past that deadline gets dropped rather than
    // holding the process open indefinitely.
    tokio::select! {
        result = serving => result.map_err(Into::into),
        _ = deadline_after(fired_rx) => {
            tracing::warn!(timeout_secs = SHUTDOWN_TIMEOUT.as_secs(), "graceful shutdown timed out, forcing exit");
            Ok(())
        }
    }
}

async fn deadline_after(fired: tokio::sync::oneshot::Receiver<()>) {
    let _ = fired.await;
    tokio::time::sleep(SHUTDOWN_TIMEOUT).await;
}

/// Resolves on `Ctrl+C`, or on `SIGTERM` on Unix. Used as the `shutdown`
/// future passed to [`serve`] from `main`.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
