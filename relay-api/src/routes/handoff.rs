//! Handoff REST API Routes
//!
//! Explicit handoff, request-for-assistance, and the target's decision.

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use relay_agents::{AssistanceRequest, HandoffRequest};
use relay_core::TaskHandoff;
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult},
    extractors::{ApiJson, ApiPath},
    state::{ApiCoordinator, AppState},
    types::{
        AcceptHandoffRequest, HandoffTaskRequest, RejectHandoffRequest, RequestAssistanceRequest,
    },
};

// ============================================================================
// ROUTE HANDLERS
// ============================================================================

/// POST /api/v1/tasks/{id}/handoff - Hand a task to a named agent
#[utoipa::path(
    post,
    path = "/api/v1/tasks/{id}/handoff",
    tag = "Handoffs",
    params(
        ("id" = Uuid, Path, description = "Task ID")
    ),
    request_body = HandoffTaskRequest,
    responses(
        (status = 201, description = "Handoff created", body = TaskHandoff),
        (status = 400, description = "Precondition failed", body = ApiError),
        (status = 404, description = "Task or agent not found", body = ApiError),
        (status = 429, description = "Target agent at capacity", body = ApiError),
    ),
)]
pub async fn handoff_task(
    State(handoffs): State<Arc<ApiCoordinator>>,
    ApiPath(task_id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<HandoffTaskRequest>,
) -> ApiResult<impl IntoResponse> {
    let handoff = handoffs.handoff_task(HandoffRequest {
        task_id,
        from_agent_id: req.from_agent_id,
        to_agent_id: req.to_agent_id,
        reason: req.reason,
        context_transfer: req.context_transfer,
    })?;
    Ok((StatusCode::CREATED, Json(handoff)))
}

/// POST /api/v1/tasks/{id}/assistance - Hand a task to the best eligible agent
#[utoipa::path(
    post,
    path = "/api/v1/tasks/{id}/assistance",
    tag = "Handoffs",
    params(
        ("id" = Uuid, Path, description = "Task ID")
    ),
    request_body = RequestAssistanceRequest,
    responses(
        (status = 201, description = "Handoff created", body = TaskHandoff),
        (status = 400, description = "Precondition failed", body = ApiError),
        (status = 404, description = "Task not found", body = ApiError),
        (status = 429, description = "No eligible agent with capacity", body = ApiError),
    ),
)]
pub async fn request_assistance(
    State(handoffs): State<Arc<ApiCoordinator>>,
    ApiPath(task_id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<RequestAssistanceRequest>,
) -> ApiResult<impl IntoResponse> {
    let handoff = handoffs.request_assistance(AssistanceRequest {
        task_id,
        reason: req.reason,
        required_skills: req.required_skills,
    })?;
    Ok((StatusCode::CREATED, Json(handoff)))
}

/// GET /api/v1/handoffs/{id} - Get handoff by ID
#[utoipa::path(
    get,
    path = "/api/v1/handoffs/{id}",
    tag = "Handoffs",
    params(
        ("id" = Uuid, Path, description = "Handoff ID")
    ),
    responses(
        (status = 200, description = "Handoff details", body = TaskHandoff),
        (status = 404, description = "Handoff not found", body = ApiError),
    ),
)]
pub async fn get_handoff(
    State(handoffs): State<Arc<ApiCoordinator>>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(handoffs.get_handoff(id)?))
}

/// POST /api/v1/handoffs/{id}/accept - Accept a pending handoff
#[utoipa::path(
    post,
    path = "/api/v1/handoffs/{id}/accept",
    tag = "Handoffs",
    params(
        ("id" = Uuid, Path, description = "Handoff ID")
    ),
    request_body = AcceptHandoffRequest,
    responses(
        (status = 200, description = "Handoff accepted", body = TaskHandoff),
        (status = 400, description = "Not the target, or not pending", body = ApiError),
        (status = 404, description = "Handoff not found", body = ApiError),
        (status = 409, description = "Task changed since the handoff", body = ApiError),
    ),
)]
pub async fn accept_handoff(
    State(handoffs): State<Arc<ApiCoordinator>>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<AcceptHandoffRequest>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(handoffs.accept_handoff(id, req.agent_id)?))
}

/// POST /api/v1/handoffs/{id}/reject - Reject a pending handoff
#[utoipa::path(
    post,
    path = "/api/v1/handoffs/{id}/reject",
    tag = "Handoffs",
    params(
        ("id" = Uuid, Path, description = "Handoff ID")
    ),
    request_body = RejectHandoffRequest,
    responses(
        (status = 200, description = "Handoff rejected", body = TaskHandoff),
        (status = 400, description = "Not the target, or not pending", body = ApiError),
        (status = 404, description = "Handoff not found", body = ApiError),
        (status = 409, description = "Task changed since the handoff", body = ApiError),
    ),
)]
pub async fn reject_handoff(
    State(handoffs): State<Arc<ApiCoordinator>>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<RejectHandoffRequest>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(handoffs.reject_handoff(id, req.agent_id, req.reason)?))
}

// ============================================================================
// ROUTER SETUP
// ============================================================================

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/:id", get(get_handoff))
        .route("/:id/accept", post(accept_handoff))
        .route("/:id/reject", post(reject_handoff))
}
