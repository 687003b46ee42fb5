//! HTTP API endpoints.
//!
//! Thin mapping from REST requests onto registry calls. Registry errors
//! become `{ error, reason }` bodies with a matching status code.

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::auth;
use crate::command;
use crate::error::{ErrorBody, RegistryError};
use crate::state::export::QueueExport;
use crate::state::AppState;
use crate::types::{Assignment, Identity, QueueStats, Slot};
use crate::ws;

/// Failure of a REST call
#[derive(Debug)]
pub enum ApiError {
    Registry(RegistryError),
    RateLimited,
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        ApiError::Registry(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Registry(err) => err.into_response(),
            ApiError::RateLimited => {
                let body = ErrorBody {
                    error: "RateLimited".to_string(),
                    reason: "Rate limit exceeded. Please slow down.".to_string(),
                };
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    [(header::RETRY_AFTER, "10")],
                    Json(body),
                )
                    .into_response()
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IdentityRequest {
    pub identity: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotResponse {
    pub identity: Identity,
    pub slot: Option<Slot>,
    /// 1-based rank in the queue view
    pub position: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaveResponse {
    pub identity: Identity,
    pub released_slot: Option<Slot>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueResponse {
    pub queue: Vec<Assignment>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReassignRequest {
    pub slot: Slot,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClearResponse {
    pub removed: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetRequest {
    /// Next chain hit, ms since epoch. `null` clears it.
    pub timestamp: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetResponse {
    pub target: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommandRequest {
    /// Chat handle of the message author
    pub user: String,
    /// Raw message text
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResponse {
    /// Text to post back, or null if the message was not a command
    pub reply: Option<String>,
}

/// Build the full application router
pub fn router(state: Arc<AppState>) -> Router {
    let admin_routes = Router::new()
        .route("/api/admin/queue", delete(clear_queue))
        .route(
            "/api/admin/queue/{identity}",
            put(reassign_slot).delete(remove_participant),
        )
        .route("/api/admin/target", put(set_target))
        .layer(middleware::from_fn_with_state(
            state.auth.clone(),
            auth::admin_auth_middleware,
        ));

    let ws_routes = Router::new()
        .route("/ws", get(ws::ws_handler))
        .layer(middleware::from_fn_with_state(
            state.auth.clone(),
            auth::admin_ws_auth_middleware,
        ));

    Router::new()
        .route("/api/status", get(status))
        .route("/api/stats", get(stats))
        .route("/api/queue", get(list_queue))
        .route("/api/queue/join", post(join_queue))
        .route("/api/queue/leave", post(leave_queue))
        .route("/api/queue/{identity}", get(lookup_slot))
        .route("/api/command", post(run_command))
        .route("/api/state/export", get(export_state))
        .merge(admin_routes)
        .merge(ws_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn check_rate_limit(state: &AppState, action: &str, identity: &str) -> Result<(), ApiError> {
    if let Some(ref limiter) = state.rate_limiter {
        if !limiter.check_identity(action, identity).await {
            tracing::warn!(action, identity, "Rate limited");
            return Err(ApiError::RateLimited);
        }
    }
    Ok(())
}

/// Health check.
///
/// GET /api/status
pub async fn status() -> Json<StatusResponse> {
    Json(StatusResponse {
        message: "Chain queue is running.".to_string(),
    })
}

/// GET /api/stats
pub async fn stats(State(state): State<Arc<AppState>>) -> Json<QueueStats> {
    Json(state.registry.stats().await)
}

/// All assignments, ascending by slot.
///
/// GET /api/queue
pub async fn list_queue(State(state): State<Arc<AppState>>) -> Json<QueueResponse> {
    Json(QueueResponse {
        queue: state.registry.list().await,
    })
}

/// POST /api/queue/join
pub async fn join_queue(
    State(state): State<Arc<AppState>>,
    Json(req): Json<IdentityRequest>,
) -> Result<Json<SlotResponse>, ApiError> {
    check_rate_limit(&state, "join", &req.identity).await?;

    let identity = Identity::parse(&req.identity)?;
    let slot = state.registry.join(identity.as_str()).await?;
    let position = state.registry.position(identity.as_str()).await?;

    Ok(Json(SlotResponse {
        identity,
        slot: Some(slot),
        position,
    }))
}

/// POST /api/queue/leave
pub async fn leave_queue(
    State(state): State<Arc<AppState>>,
    Json(req): Json<IdentityRequest>,
) -> Result<Json<LeaveResponse>, ApiError> {
    check_rate_limit(&state, "leave", &req.identity).await?;

    let identity = Identity::parse(&req.identity)?;
    let released_slot = state.registry.leave(identity.as_str()).await?;

    Ok(Json(LeaveResponse {
        identity,
        released_slot,
    }))
}

/// GET /api/queue/{identity}
pub async fn lookup_slot(
    State(state): State<Arc<AppState>>,
    Path(identity): Path<String>,
) -> Result<Json<SlotResponse>, ApiError> {
    let parsed = Identity::parse(&identity)?;
    let (slot, position) = state.registry.lookup_with_position(&identity).await?;

    Ok(Json(SlotResponse {
        identity: parsed,
        slot,
        position,
    }))
}

/// Forward one chat message to the command adapter.
///
/// POST /api/command
pub async fn run_command(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CommandRequest>,
) -> Result<Json<CommandResponse>, ApiError> {
    if command::ChatCommand::parse(&req.content).is_some() {
        check_rate_limit(&state, "command", &req.user).await?;
    }

    let reply = command::handle_chat_message(&state.registry, &req.user, &req.content).await;
    Ok(Json(CommandResponse { reply }))
}

/// Admin override onto an explicit slot.
///
/// PUT /api/admin/queue/{identity}
pub async fn reassign_slot(
    State(state): State<Arc<AppState>>,
    Path(identity): Path<String>,
    Json(req): Json<ReassignRequest>,
) -> Result<Json<SlotResponse>, ApiError> {
    let parsed = Identity::parse(&identity)?;
    let slot = state.registry.reassign(&identity, req.slot).await?;
    let position = state.registry.position(&identity).await?;

    Ok(Json(SlotResponse {
        identity: parsed,
        slot: Some(slot),
        position,
    }))
}

/// Kick one participant.
///
/// DELETE /api/admin/queue/{identity}
pub async fn remove_participant(
    State(state): State<Arc<AppState>>,
    Path(identity): Path<String>,
) -> Result<Json<LeaveResponse>, ApiError> {
    let parsed = Identity::parse(&identity)?;
    match state.registry.remove(&identity).await? {
        Some(slot) => Ok(Json(LeaveResponse {
            identity: parsed,
            released_slot: Some(slot),
        })),
        None => Err(RegistryError::NotFound(parsed).into()),
    }
}

/// DELETE /api/admin/queue
pub async fn clear_queue(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ClearResponse>, ApiError> {
    let removed = state.registry.clear().await?;
    Ok(Json(ClearResponse { removed }))
}

/// PUT /api/admin/target
pub async fn set_target(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TargetRequest>,
) -> Result<Json<TargetResponse>, ApiError> {
    if matches!(req.timestamp, Some(ts) if ts < 0) {
        return Err(RegistryError::InvalidInput("timestamp must not be negative".to_string()).into());
    }
    let target = state.set_target(req.timestamp).await;
    Ok(Json(TargetResponse { target }))
}

/// Export the current queue in the persisted layout.
///
/// GET /api/state/export
pub async fn export_state(State(state): State<Arc<AppState>>) -> Json<QueueExport> {
    Json(state.registry.export().await)
}
