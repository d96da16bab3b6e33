//! Request logging middleware.

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};

use crate::state::AppState;

/// Log method, path, status and duration of every request.
///
/// The level follows the status class: server errors at `error`, client errors
/// at `warn`, everything else at `info`.
pub async fn request_logging_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !state.config.request_logging {
        return next.run(request).await;
    }

    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let start = std::time::Instant::now();

    let response = next.run(request).await;

    let duration_ms = start.elapsed().as_millis() as u64;
    let status = response.status().as_u16();

    if response.status().is_server_error() {
        tracing::error!(%method, %path, status, duration_ms, "Request completed with server error");
    } else if response.status().is_client_error() {
        tracing::warn!(%method, %path, status, duration_ms, "Request completed with client error");
    } else {
        tracing::info!(%method, %path, status, duration_ms, "Request completed");
    }

    response
}
