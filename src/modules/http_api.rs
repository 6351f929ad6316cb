//! HTTP API 模块
//! JSON API over the relief store. Every read goes through the disclosure
//! resolver, so callers only ever see the tier they are entitled to.
//!
//! 端点：
//! - GET   /health                        健康检查
//! - POST  /requests                      create a help request
//! - GET   /requests                      list requests (`status`, `urgency` filters)
//! - GET   /requests/mine                 the viewer's own requests
//! - GET   /requests/:id                  request detail
//! - PATCH /requests/:id/status           owner moves the request forward
//! - POST  /requests/:id/volunteer        commit as a volunteer
//! - GET   /volunteer/commitments         the viewer's commitments
//! - PATCH /volunteer/commitments/:id     volunteer updates their response

use axum::{
    extract::{FromRequest, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::errors::{AppError, AppResult};
use crate::middleware::{access_log_middleware, auth_middleware, Viewer};
use crate::modules::config::{AppConfig, SecurityConfig};
use crate::modules::logger;
use crate::modules::relief_db::{ReliefDb, RequestFilter};
use crate::modules::log_ids::short_id;
use crate::privacy::models::{
    NewHelpRequest, RequestStatus, ResponseStatus, UnknownVariant, Urgency,
};
use crate::privacy::resolver::{
    resolve_commitment, resolve_listing, resolve_request, ResolvedCommitment, ResolvedRequest,
};

/// 服务器状态
#[derive(Clone)]
pub struct AppState {
    pub db: ReliefDb,
    pub security: Arc<RwLock<SecurityConfig>>,
    pub access_log_enabled: Arc<RwLock<bool>>,
}

impl AppState {
    pub fn new(db: ReliefDb, config: &AppConfig) -> Self {
        Self {
            db,
            security: Arc::new(RwLock::new(config.security())),
            access_log_enabled: Arc::new(RwLock::new(config.access_log_enabled)),
        }
    }
}

// ============================================================================
// Response Types
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

#[derive(Serialize)]
struct RequestListResponse {
    total: usize,
    requests: Vec<ResolvedRequest>,
}

#[derive(Serialize)]
struct CommitmentListResponse {
    total: usize,
    commitments: Vec<ResolvedCommitment>,
}

// ============================================================================
// Request Types
// ============================================================================

#[derive(Deserialize)]
struct ListQuery {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    urgency: Option<String>,
}

#[derive(Deserialize)]
struct StatusUpdateRequest {
    status: String,
}

/// `Json` whose rejections go through `AppError`, so malformed bodies get the
/// same error envelope as every other 400.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
struct AppJson<T>(T);

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn parse_query_value<T>(value: Option<&str>) -> AppResult<Option<T>>
where
    T: std::str::FromStr<Err = UnknownVariant>,
{
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(v) => Ok(Some(v.parse()?)),
        None => Ok(None),
    }
}

fn is_valid_email(email: &str) -> bool {
    let mut parts = email.split('@');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(local), Some(domain), None) => {
            !local.trim().is_empty() && !domain.trim().is_empty() && !email.contains(char::is_whitespace)
        }
        _ => false,
    }
}

/// Required-field checks for a new submission. Masking itself never fails,
/// so this is the only place a submission can be turned away.
pub fn validate_new_request(draft: &NewHelpRequest) -> AppResult<()> {
    let required = [
        ("name", draft.contact.name.as_str()),
        ("address", draft.contact.address.as_str()),
        ("phone", draft.contact.phone.as_str()),
        ("helpType", draft.help_type.as_str()),
        ("description", draft.description.as_str()),
    ];
    let missing: Vec<&str> = required
        .iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(field, _)| *field)
        .collect();

    if !missing.is_empty() {
        return Err(AppError::Validation(format!(
            "missing required fields: {}",
            missing.join(", ")
        )));
    }

    if !draft.contact.email.is_empty() && !is_valid_email(&draft.contact.email) {
        return Err(AppError::Validation("email address is malformed".to_string()));
    }

    Ok(())
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /health - 健康检查
async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// POST /requests
async fn create_request(
    State(state): State<AppState>,
    viewer: Viewer,
    AppJson(draft): AppJson<NewHelpRequest>,
) -> AppResult<(StatusCode, Json<ResolvedRequest>)> {
    let owner_id = viewer.require()?;
    validate_new_request(&draft)?;

    let request = state.db.create_request(owner_id, draft, now_millis())?;
    logger::log_info(&format!(
        "[HTTP API] Help request created: id={}, owner={}, urgency={}",
        request.id,
        short_id(owner_id),
        request.urgency
    ));

    Ok((
        StatusCode::CREATED,
        Json(resolve_request(Some(owner_id), &request, None)),
    ))
}

/// GET /requests
async fn list_requests(
    State(state): State<AppState>,
    viewer: Viewer,
    Query(params): Query<ListQuery>,
) -> AppResult<Json<RequestListResponse>> {
    let filter = RequestFilter {
        status: parse_query_value::<RequestStatus>(params.status.as_deref())?,
        urgency: parse_query_value::<Urgency>(params.urgency.as_deref())?,
    };

    let viewer_id = viewer.id.clone();
    let (requests, responses) = state
        .db
        .run_blocking(move |db| {
            let requests = db.list_requests(filter)?;
            let responses = viewer_id
                .as_deref()
                .map(|id| db.volunteered_request_ids(id))
                .transpose()?;
            Ok((requests, responses))
        })
        .await?;

    let requests = resolve_listing(viewer.id(), requests, responses.as_ref());
    Ok(Json(RequestListResponse {
        total: requests.len(),
        requests,
    }))
}

/// GET /requests/mine
async fn list_my_requests(
    State(state): State<AppState>,
    viewer: Viewer,
) -> AppResult<Json<RequestListResponse>> {
    let owner_id = viewer.require()?;
    let owner = owner_id.to_string();
    let requests = state
        .db
        .run_blocking(move |db| db.list_requests_by_owner(&owner))
        .await?;

    let requests = resolve_listing(Some(owner_id), requests, None);
    Ok(Json(RequestListResponse {
        total: requests.len(),
        requests,
    }))
}

/// GET /requests/:id
async fn get_request(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(request_id): Path<String>,
) -> AppResult<Json<ResolvedRequest>> {
    let request = state.db.get_request(&request_id)?;
    let responses = viewer
        .id()
        .map(|id| state.db.volunteered_request_ids(id))
        .transpose()?;

    Ok(Json(resolve_request(viewer.id(), &request, responses.as_ref())))
}

/// PATCH /requests/:id/status
async fn update_request_status(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(request_id): Path<String>,
    AppJson(payload): AppJson<StatusUpdateRequest>,
) -> AppResult<Json<ResolvedRequest>> {
    let actor_id = viewer.require()?;
    let next: RequestStatus = payload.status.parse()?;

    let request = state.db.update_request_status(&request_id, actor_id, next)?;
    logger::log_info(&format!(
        "[HTTP API] Help request {} moved to {}",
        request.id, request.status
    ));

    Ok(Json(resolve_request(Some(actor_id), &request, None)))
}

/// POST /requests/:id/volunteer
async fn volunteer(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(request_id): Path<String>,
) -> AppResult<(StatusCode, Json<ResolvedCommitment>)> {
    let volunteer_id = viewer.require()?;

    let response = match state.db.commit_volunteer(&request_id, volunteer_id, now_millis()) {
        Ok(response) => response,
        Err(e) => {
            logger::log_warn(&format!(
                "[HTTP API] Volunteer commit rejected: request={}, volunteer={}, reason={}",
                request_id,
                short_id(volunteer_id),
                e
            ));
            return Err(e);
        }
    };
    logger::log_info(&format!(
        "[HTTP API] Volunteer committed: request={}, volunteer={}",
        request_id,
        short_id(volunteer_id)
    ));

    let request = state.db.get_request(&request_id)?;
    Ok((
        StatusCode::CREATED,
        Json(resolve_commitment(response, &request)),
    ))
}

/// GET /volunteer/commitments
async fn list_commitments(
    State(state): State<AppState>,
    viewer: Viewer,
) -> AppResult<Json<CommitmentListResponse>> {
    let volunteer_id = viewer.require()?;

    let volunteer = volunteer_id.to_string();
    let commitments: Vec<ResolvedCommitment> = state
        .db
        .run_blocking(move |db| db.list_commitments(&volunteer))
        .await?
        .into_iter()
        .map(|(response, request)| resolve_commitment(response, &request))
        .collect();

    Ok(Json(CommitmentListResponse {
        total: commitments.len(),
        commitments,
    }))
}

/// PATCH /volunteer/commitments/:id
async fn update_commitment(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(response_id): Path<String>,
    AppJson(payload): AppJson<StatusUpdateRequest>,
) -> AppResult<Json<ResolvedCommitment>> {
    let volunteer_id = viewer.require()?;
    let next: ResponseStatus = payload.status.parse()?;

    let response = state
        .db
        .update_response_status(&response_id, volunteer_id, next)?;
    let request = state.db.get_request(&response.request_id)?;

    Ok(Json(resolve_commitment(response, &request)))
}

// ============================================================================
// Server
// ============================================================================

pub fn build_router(state: AppState) -> Router {
    // CORS 配置
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/requests", post(create_request).get(list_requests))
        .route("/requests/mine", get(list_my_requests))
        .route("/requests/:id", get(get_request))
        .route("/requests/:id/status", patch(update_request_status))
        .route("/requests/:id/volunteer", post(volunteer))
        .route("/volunteer/commitments", get(list_commitments))
        .route("/volunteer/commitments/:id", patch(update_commitment))
        .layer(axum::middleware::from_fn_with_state(
            state.security.clone(),
            auth_middleware,
        ))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            access_log_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        logger::log_error(&format!("[HTTP API] Failed to listen for shutdown signal: {}", e));
    }
}

/// 启动 HTTP API 服务器
pub async fn start_server(config: &AppConfig) -> AppResult<()> {
    let db_path = config.resolved_database_path()?;
    let db = ReliefDb::open(&db_path)?;
    logger::log_info(&format!("[HTTP API] Database ready: {}", db_path.display()));

    let app = build_router(AppState::new(db, config));

    let addr = config.bind_address();
    logger::log_info(&format!("[HTTP API] 启动服务器: http://{}", addr));

    let listener = tokio::net::TcpListener::bind(&addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    logger::log_info("[HTTP API] Server stopped");
    Ok(())
}
