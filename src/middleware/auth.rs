// API Key 认证中间件 + 访问者身份
use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::errors::{AppError, AppResult};
use crate::modules::config::{AuthMode, SecurityConfig};
use crate::modules::log_ids::viewer_tag;

/// Header carrying the viewer identity asserted by the upstream login layer.
pub const VIEWER_HEADER: &str = "x-user-id";

/// Identity of whoever is looking at the data. `None` for anonymous callers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Viewer {
    pub id: Option<String>,
}

impl Viewer {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let id = headers
            .get(VIEWER_HEADER)
            .and_then(|h| h.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        Self { id }
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// The viewer id, or `Unauthenticated` for anonymous callers.
    pub fn require(&self) -> AppResult<&str> {
        self.id().ok_or(AppError::Unauthenticated)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Viewer
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<Viewer>()
            .cloned()
            .unwrap_or_else(|| Viewer::from_headers(&parts.headers)))
    }
}

fn extract_api_key(request: &Request) -> Option<&str> {
    let header_key = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer ").or(Some(s)));

    if header_key.is_some() {
        return header_key;
    }

    request
        .headers()
        .get("x-api-key")
        .and_then(|h| h.to_str().ok())
}

/// API Key 认证中间件
pub async fn auth_middleware(
    State(security): State<Arc<RwLock<SecurityConfig>>>,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let viewer = Viewer::from_headers(request.headers());

    // 过滤健康检查请求,避免日志噪音
    if path != "/health" {
        tracing::info!("Request: {} {} viewer={}", method, path, viewer_tag(viewer.id()));
    } else {
        tracing::trace!("Heartbeat: {} {}", method, path);
    }

    request.extensions_mut().insert(viewer);

    // Allow CORS preflight regardless of auth policy.
    if method == axum::http::Method::OPTIONS {
        return Ok(next.run(request).await);
    }

    let security = security.read().await.clone();
    let effective_mode = security.effective_auth_mode();

    if matches!(effective_mode, AuthMode::Off) {
        return Ok(next.run(request).await);
    }

    if matches!(effective_mode, AuthMode::AllExceptHealth) && path == "/health" {
        return Ok(next.run(request).await);
    }

    let api_key = extract_api_key(&request);

    if security.api_key.is_empty() {
        tracing::error!("API auth is enabled but api_key is empty; denying request");
        return Err(StatusCode::UNAUTHORIZED);
    }

    let authorized = api_key.map(|k| k == security.api_key).unwrap_or(false);

    if authorized {
        Ok(next.run(request).await)
    } else {
        Err(StatusCode::UNAUTHORIZED)
    }
}
