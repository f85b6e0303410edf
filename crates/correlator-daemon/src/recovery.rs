//! Panic-recovery middleware: wraps everything below it in a panic guard so
//! a programming error surfaces as a 500 RFC 7807 body instead of a dropped
//! connection.

use crate::correlation::CorrelationId;
use crate::problem::problem_response;
use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;
use correlator_error::ErrorCode;
use futures::FutureExt;
use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::panic::AssertUnwindSafe;

thread_local! {
    static LAST_PANIC_BACKTRACE: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// Installs a panic hook that stashes a captured backtrace in a thread-local
/// before unwinding, so [`recovery_middleware`] can attach it to the ERROR
/// log line it emits on recover. Call once at startup.
pub fn install_panic_hook() {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let backtrace = Backtrace::force_capture().to_string();
        LAST_PANIC_BACKTRACE.with(|cell| *cell.borrow_mut() = Some(backtrace));
        previous(info);
    }));
}

/// Catches a panic anywhere below this layer, logs it at ERROR with the
/// correlation ID, method, path, and captured stack trace, and responds
/// with a 500 RFC 7807 body instead of letting the panic unwind past Axum.
pub async fn recovery_middleware(req: Request, next: Next) -> Response {
    let correlation_id = req
        .extensions()
        .get::<CorrelationId>()
        .map(|id| id.as_str().to_string())
        .unwrap_or_default();
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    match AssertUnwindSafe(next.run(req)).catch_unwind().await {
        Ok(response) => response,
        Err(panic) => {
            let message = panic_message(&panic);
            let backtrace = LAST_PANIC_BACKTRACE.with(|cell| cell.borrow_mut().take());

            tracing::error!(
                correlation_id = %correlation_id,
                http.method = %method,
                http.path = %path,
                panic.message = %message,
                panic.backtrace = backtrace.as_deref().unwrap_or("<unavailable>"),
                "recovered from panic"
            );

            problem_response(ErrorCode::Internal.problem(path, correlation_id))
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
