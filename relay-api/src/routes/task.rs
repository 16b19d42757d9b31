//! Task REST API Routes
//!
//! Handlers for task creation, update, lookup, listing and history.

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use relay_agents::{NewTask, TaskUpdate};
use relay_core::{Task, TaskHandoff, TaskHistoryEntry};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult},
    extractors::{ApiJson, ApiPath, ApiQuery},
    routes::handoff,
    state::{ApiCoordinator, ApiTaskStore, AppState},
    types::ListTasksQuery,
};

// ============================================================================
// ROUTE HANDLERS
// ============================================================================

/// POST /api/v1/tasks - Create a task
#[utoipa::path(
    post,
    path = "/api/v1/tasks",
    tag = "Tasks",
    request_body = NewTask,
    responses(
        (status = 201, description = "Task created", body = Task),
        (status = 400, description = "Invalid request", body = ApiError),
        (status = 404, description = "Assignee or parent task not found", body = ApiError),
        (status = 429, description = "Assignee at capacity", body = ApiError),
    ),
)]
pub async fn create_task(
    State(tasks): State<Arc<ApiTaskStore>>,
    ApiJson(req): ApiJson<NewTask>,
) -> ApiResult<impl IntoResponse> {
    let task = tasks.create(req)?;
    Ok((StatusCode::CREATED, Json(task)))
}

/// GET /api/v1/tasks - List tasks
#[utoipa::path(
    get,
    path = "/api/v1/tasks",
    tag = "Tasks",
    params(ListTasksQuery),
    responses(
        (status = 200, description = "Tasks ordered by creation time", body = Vec<Task>),
        (status = 400, description = "Invalid query", body = ApiError),
    ),
)]
pub async fn list_tasks(
    State(tasks): State<Arc<ApiTaskStore>>,
    ApiQuery(query): ApiQuery<ListTasksQuery>,
) -> ApiResult<impl IntoResponse> {
    let listed = tasks.list(query.into())?;
    Ok(Json(listed))
}

/// GET /api/v1/tasks/{id} - Get task by ID
#[utoipa::path(
    get,
    path = "/api/v1/tasks/{id}",
    tag = "Tasks",
    params(
        ("id" = Uuid, Path, description = "Task ID")
    ),
    responses(
        (status = 200, description = "Task details", body = Task),
        (status = 404, description = "Task not found", body = ApiError),
    ),
)]
pub async fn get_task(
    State(tasks): State<Arc<ApiTaskStore>>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(tasks.get(id)?))
}

/// PATCH /api/v1/tasks/{id} - Update a task
#[utoipa::path(
    patch,
    path = "/api/v1/tasks/{id}",
    tag = "Tasks",
    params(
        ("id" = Uuid, Path, description = "Task ID")
    ),
    request_body = TaskUpdate,
    responses(
        (status = 200, description = "Task updated", body = Task),
        (status = 400, description = "Invalid update or transition", body = ApiError),
        (status = 404, description = "Task or agent not found", body = ApiError),
        (status = 409, description = "Version conflict", body = ApiError),
        (status = 429, description = "New assignee at capacity", body = ApiError),
    ),
)]
pub async fn update_task(
    State(tasks): State<Arc<ApiTaskStore>>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<TaskUpdate>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(tasks.update(id, req)?))
}

/// GET /api/v1/tasks/{id}/history - Task history in append order
#[utoipa::path(
    get,
    path = "/api/v1/tasks/{id}/history",
    tag = "Tasks",
    params(
        ("id" = Uuid, Path, description = "Task ID")
    ),
    responses(
        (status = 200, description = "History entries", body = Vec<TaskHistoryEntry>),
        (status = 404, description = "Task not found", body = ApiError),
    ),
)]
pub async fn get_task_history(
    State(tasks): State<Arc<ApiTaskStore>>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(tasks.history(id)?))
}

/// GET /api/v1/tasks/{id}/handoffs - Handoffs of a task
#[utoipa::path(
    get,
    path = "/api/v1/tasks/{id}/handoffs",
    tag = "Tasks",
    params(
        ("id" = Uuid, Path, description = "Task ID")
    ),
    responses(
        (status = 200, description = "Handoffs, oldest first", body = Vec<TaskHandoff>),
        (status = 404, description = "Task not found", body = ApiError),
    ),
)]
pub async fn list_task_handoffs(
    State(handoffs): State<Arc<ApiCoordinator>>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(handoffs.list_task_handoffs(id)?))
}

// ============================================================================
// ROUTER SETUP
// ============================================================================

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_task).get(list_tasks))
        .route("/:id", get(get_task).patch(update_task))
        .route("/:id/history", get(get_task_history))
        .route("/:id/handoffs", get(list_task_handoffs))
        .route("/:id/handoff", post(handoff::handoff_task))
        .route("/:id/assistance", post(handoff::request_assistance))
}
