//! OpenAPI Specification for the RELAY API
//!
//! Generated by utoipa from the route annotations and the schema derives on
//! the core types.

use utoipa::OpenApi;

use crate::error::{ApiError, ErrorCode};
use crate::routes::{agent, handoff, health, task};
use crate::types::{
    AcceptHandoffRequest, HandoffTaskRequest, RegisterAgentRequest, RejectHandoffRequest,
    RequestAssistanceRequest,
};

use relay_agents::{NewTask, TaskUpdate, WorkloadView};
use relay_core::{
    Agent, AgentStatus, FieldChange, HandoffStatus, HistoryAction, ProficiencyLevel, Task,
    TaskContext, TaskContextPatch, TaskHandoff, TaskHistoryEntry, TaskPriority, TaskStatus,
};

/// OpenAPI document for the RELAY API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "RELAY API",
        description = "Task assignment and capacity-checked handoff between agents",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers(
        (url = "http://localhost:3000", description = "Local Development")
    ),
    tags(
        (name = "Tasks", description = "Task lifecycle, listing and history"),
        (name = "Handoffs", description = "Explicit handoff, request for assistance, accept and reject"),
        (name = "Agents", description = "Agent registration, workload and history"),
        (name = "Health", description = "Liveness and readiness probes"),
        (name = "Observability", description = "Prometheus metrics")
    ),
    paths(
        task::create_task,
        task::list_tasks,
        task::get_task,
        task::update_task,
        task::get_task_history,
        task::list_task_handoffs,
        handoff::handoff_task,
        handoff::request_assistance,
        handoff::get_handoff,
        handoff::accept_handoff,
        handoff::reject_handoff,
        agent::register_agent,
        agent::list_agents,
        agent::get_agent,
        agent::get_agent_workload,
        agent::get_agent_history,
        health::liveness,
        health::ping,
        health::readiness,
        crate::telemetry::metrics::metrics_handler,
    ),
    components(schemas(
        ApiError,
        ErrorCode,
        Task,
        TaskStatus,
        TaskPriority,
        TaskContext,
        TaskContextPatch,
        TaskHandoff,
        HandoffStatus,
        TaskHistoryEntry,
        HistoryAction,
        FieldChange,
        Agent,
        AgentStatus,
        ProficiencyLevel,
        NewTask,
        TaskUpdate,
        WorkloadView,
        RegisterAgentRequest,
        HandoffTaskRequest,
        RequestAssistanceRequest,
        AcceptHandoffRequest,
        RejectHandoffRequest,
        health::HealthResponse,
        health::HealthStatus,
        health::HealthDetails,
    ))
)]
pub struct ApiDoc;
