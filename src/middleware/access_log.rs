use axum::{
    extract::{MatchedPath, Request, State},
    middleware::Next,
    response::Response,
};
use std::time::Instant;

use crate::middleware::auth::Viewer;
use crate::modules::http_api::AppState;
use crate::modules::log_ids::viewer_tag;

/// One line per handled request, keyed by route template rather than raw
/// path so request ids stay out of the aggregate. Toggled at runtime through
/// `AppState::access_log_enabled`.
pub async fn access_log_middleware(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let enabled = { *state.access_log_enabled.read().await };
    if !enabled {
        return next.run(request).await;
    }

    let start = Instant::now();
    let method = request.method().clone();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());
    let viewer = viewer_tag(Viewer::from_headers(request.headers()).id());

    let response = next.run(request).await;
    let status = response.status();
    let duration_ms = start.elapsed().as_millis() as u64;

    if status.is_server_error() {
        tracing::warn!("[Access] {} {} {} {}ms viewer={}", method, route, status.as_u16(), duration_ms, viewer);
    } else {
        tracing::info!("[Access] {} {} {} {}ms viewer={}", method, route, status.as_u16(), duration_ms, viewer);
    }
    response
}
