//! Request and query bodies of the HTTP surface.
//!
//! Bodies that already exist in the core (`NewTask`, `TaskUpdate`) are used
//! as-is; the types here cover ids that arrive in the path instead of the body.

use std::collections::BTreeMap;

use relay_core::{AgentStatus, ProficiencyLevel, TaskContext, TaskPriority, TaskStatus};
use relay_storage::TaskFilter;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

// ============================================================================
// AGENTS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RegisterAgentRequest {
    pub name: String,
    pub max_concurrent_tasks: i32,
    #[serde(default)]
    pub skills: BTreeMap<String, ProficiencyLevel>,
    #[serde(default)]
    pub status: Option<AgentStatus>,
}

// ============================================================================
// HANDOFFS
// ============================================================================

/// Body of `POST /tasks/:id/handoff`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct HandoffTaskRequest {
    pub from_agent_id: Uuid,
    pub to_agent_id: Uuid,
    pub reason: String,
    /// Defaults to a snapshot of the task's context
    #[serde(default)]
    pub context_transfer: Option<TaskContext>,
}

/// Body of `POST /tasks/:id/assistance`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RequestAssistanceRequest {
    pub reason: String,
    #[serde(default)]
    pub required_skills: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AcceptHandoffRequest {
    pub agent_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RejectHandoffRequest {
    pub agent_id: Uuid,
    #[serde(default)]
    pub reason: Option<String>,
}

// ============================================================================
// QUERIES
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListTasksQuery {
    pub status: Option<TaskStatus>,
    pub assigned_agent_id: Option<Uuid>,
    pub priority: Option<TaskPriority>,
    pub parent_task_id: Option<Uuid>,
    /// Page size; defaults to and is capped by server configuration
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl From<ListTasksQuery> for TaskFilter {
    fn from(query: ListTasksQuery) -> Self {
        TaskFilter {
            status: query.status,
            assigned_agent_id: query.assigned_agent_id,
            priority: query.priority,
            parent_task_id: query.parent_task_id,
            limit: query.limit,
            offset: query.offset.unwrap_or(0),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}
