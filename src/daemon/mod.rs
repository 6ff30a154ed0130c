pub mod lifecycle;
pub mod workspace;

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::error::AppError;
use crate::state::AppState;

/// Rejects new non-health requests with `SHUTTING_DOWN` once the daemon has
/// begun draining. `/health` bypasses this (checked by the caller wiring
/// this middleware only onto the API/WS sub-router, not onto `/health`).
pub async fn reject_during_shutdown(
    State(state): State<AppState>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    if state.is_shutting_down() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "code": "SHUTTING_DOWN", "message": "daemon is draining", "retry_after_secs": 1 })),
        )
            .into_response();
    }
    next.run(req).await
}

/// Rewrites `tower_governor`'s plain-text 429 response into this crate's
/// `{code, message, details}` shape, so `AppError::RateLimited` is the code a
/// client actually observes rather than just existing in the error taxonomy.
pub async fn normalize_rate_limit_response(req: Request<Body>, next: Next) -> Response {
    let response = next.run(req).await;
    if response.status() != StatusCode::TOO_MANY_REQUESTS {
        return response;
    }

    let retry_after_secs = response
        .headers()
        .get(header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(1);

    let mut out = AppError::RateLimited { retry_after_secs }.into_response();
    if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
        out.headers_mut().insert(header::RETRY_AFTER, value);
    }
    out
}

/// Rejects request bodies over the configured message-body limit with
/// `AppError::PayloadTooLarge` before the body is read, for requests that
/// send a `Content-Length` header. Requests without one (chunked transfer)
/// still fall through to axum's `DefaultBodyLimit`, which aborts the read
/// but cannot carry this crate's error shape.
pub async fn enforce_body_limit(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let too_large = req
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<u64>().ok())
        .is_some_and(|len| len > state.limits.message_body_bytes as u64);

    if too_large {
        return AppError::PayloadTooLarge.into_response();
    }
    next.run(req).await
}

/// Wait for a shutdown signal (Ctrl-C, or SIGTERM on unix), flip
/// `AppState::begin_shutdown`, and return once the bounded drain window has
/// elapsed so callers can proceed to close the listener.
pub async fn wait_for_shutdown_signal(state: AppState, drain: std::time::Duration) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl-C handler");
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

    tracing::info!("shutdown signal received, draining");
    state.begin_shutdown();
    tokio::time::sleep(drain).await;
}
