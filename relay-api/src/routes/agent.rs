//! Agent REST API Routes
//!
//! Registration and lookup are backed by the in-process registry. Workload
//! and history are read from the task store.

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use relay_agents::WorkloadView;
use relay_core::{Agent, TaskHistoryEntry};
use relay_storage::{AgentRegistry, InMemoryAgentRegistry};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult},
    extractors::{ApiJson, ApiPath, ApiQuery},
    state::{ApiCoordinator, ApiTaskStore, AppState},
    types::{HistoryQuery, RegisterAgentRequest},
};

// ============================================================================
// ROUTE HANDLERS
// ============================================================================

/// POST /api/v1/agents - Register an agent
#[utoipa::path(
    post,
    path = "/api/v1/agents",
    tag = "Agents",
    request_body = RegisterAgentRequest,
    responses(
        (status = 201, description = "Agent registered", body = Agent),
        (status = 400, description = "Invalid request", body = ApiError),
    ),
)]
pub async fn register_agent(
    State(registry): State<Arc<InMemoryAgentRegistry>>,
    ApiJson(req): ApiJson<RegisterAgentRequest>,
) -> ApiResult<impl IntoResponse> {
    let mut agent = Agent::new(req.name, req.max_concurrent_tasks, Utc::now());
    agent.skills = req.skills;
    if let Some(status) = req.status {
        agent.status = status;
    }

    let agent = registry.register(agent)?;
    tracing::info!(
        agent_id = %agent.agent_id,
        max_concurrent_tasks = agent.max_concurrent_tasks,
        "Agent registered"
    );
    Ok((StatusCode::CREATED, Json(agent)))
}

/// GET /api/v1/agents - List agents
#[utoipa::path(
    get,
    path = "/api/v1/agents",
    tag = "Agents",
    responses(
        (status = 200, description = "Agents ordered by id", body = Vec<Agent>),
    ),
)]
pub async fn list_agents(
    State(registry): State<Arc<InMemoryAgentRegistry>>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(registry.agent_list()?))
}

/// GET /api/v1/agents/{id} - Get agent by ID
#[utoipa::path(
    get,
    path = "/api/v1/agents/{id}",
    tag = "Agents",
    params(
        ("id" = Uuid, Path, description = "Agent ID")
    ),
    responses(
        (status = 200, description = "Agent details", body = Agent),
        (status = 404, description = "Agent not found", body = ApiError),
    ),
)]
pub async fn get_agent(
    State(registry): State<Arc<InMemoryAgentRegistry>>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(registry.agent_require(id)?))
}

/// GET /api/v1/agents/{id}/workload - Current load of an agent
#[utoipa::path(
    get,
    path = "/api/v1/agents/{id}/workload",
    tag = "Agents",
    params(
        ("id" = Uuid, Path, description = "Agent ID")
    ),
    responses(
        (status = 200, description = "Workload view", body = WorkloadView),
        (status = 404, description = "Agent not found", body = ApiError),
    ),
)]
pub async fn get_agent_workload(
    State(handoffs): State<Arc<ApiCoordinator>>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(handoffs.agent_workload(id)?))
}

/// GET /api/v1/agents/{id}/history - History attributed to an agent, newest first
#[utoipa::path(
    get,
    path = "/api/v1/agents/{id}/history",
    tag = "Agents",
    params(
        ("id" = Uuid, Path, description = "Agent ID"),
        HistoryQuery,
    ),
    responses(
        (status = 200, description = "History entries", body = Vec<TaskHistoryEntry>),
        (status = 404, description = "Agent not found", body = ApiError),
    ),
)]
pub async fn get_agent_history(
    State(tasks): State<Arc<ApiTaskStore>>,
    ApiPath(id): ApiPath<Uuid>,
    ApiQuery(query): ApiQuery<HistoryQuery>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(tasks.agent_history(id, query.limit)?))
}

// ============================================================================
// ROUTER SETUP
// ============================================================================

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/", post(register_agent).get(list_agents))
        .route("/:id", get(get_agent))
        .route("/:id/workload", get(get_agent_workload))
        .route("/:id/history", get(get_agent_history))
}
