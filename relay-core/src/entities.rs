//! Entity structs for RELAY

use crate::{
    new_entity_id, AgentId, AgentStatus, DurationMinutes, HandoffId, HandoffStatus,
    HistoryAction, HistoryEntryId, ProficiencyLevel, TaskId, TaskPriority, TaskStatus, Timestamp,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

// ============================================================================
// TASK CONTEXT
// ============================================================================

/// Structured working context carried by a task and snapshotted on handoff.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(default)]
pub struct TaskContext {
    /// Free-form data
    #[cfg_attr(feature = "openapi", schema(value_type = Object))]
    pub data: Map<String, Value>,
    /// What the work must achieve
    pub requirements: Vec<String>,
    /// Limits the work must respect
    pub constraints: Vec<String>,
    /// Tasks this one depends on
    #[cfg_attr(feature = "openapi", schema(value_type = Vec<String>))]
    pub dependencies: Vec<TaskId>,
}

impl TaskContext {
    /// Apply a patch field by field.
    ///
    /// Keys of `data` overwrite the same top-level keys of the existing map;
    /// nested values are replaced whole. List fields are replaced when present.
    pub fn merge(&mut self, patch: TaskContextPatch) {
        if let Some(data) = patch.data {
            for (key, value) in data {
                self.data.insert(key, value);
            }
        }
        if let Some(requirements) = patch.requirements {
            self.requirements = requirements;
        }
        if let Some(constraints) = patch.constraints {
            self.constraints = constraints;
        }
        if let Some(dependencies) = patch.dependencies {
            self.dependencies = dependencies;
        }
    }
}

/// Partial context update; absent fields are left untouched.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct TaskContextPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "openapi", schema(value_type = Option<Object>))]
    pub data: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requirements: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraints: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "openapi", schema(value_type = Option<Vec<String>>))]
    pub dependencies: Option<Vec<TaskId>>,
}

impl TaskContextPatch {
    pub fn is_empty(&self) -> bool {
        self.data.is_none()
            && self.requirements.is_none()
            && self.constraints.is_none()
            && self.dependencies.is_none()
    }
}

// ============================================================================
// TASK
// ============================================================================

/// A unit of work with a lifecycle and an optional assignee.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Task {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub task_id: TaskId,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "uuid"))]
    pub assigned_agent_id: Option<AgentId>,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "uuid"))]
    pub parent_task_id: Option<TaskId>,
    pub context: TaskContext,
    /// Estimated effort in minutes
    #[cfg_attr(feature = "openapi", schema(value_type = Option<i32>))]
    pub estimated_duration: Option<DurationMinutes>,
    /// Actual effort in minutes
    #[cfg_attr(feature = "openapi", schema(value_type = Option<i32>))]
    pub actual_duration: Option<DurationMinutes>,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub created_at: Timestamp,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub updated_at: Timestamp,
    /// Stamped once, at the first transition into `Completed`
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "date-time"))]
    pub completed_at: Option<Timestamp>,
    /// Optimistic concurrency version, bumped by every stored write
    pub version: u64,
}

impl Task {
    /// Create a new pending, unassigned task.
    pub fn new(title: impl Into<String>, priority: TaskPriority, now: Timestamp) -> Self {
        Self {
            task_id: new_entity_id(),
            title: title.into(),
            description: None,
            status: TaskStatus::Pending,
            priority,
            assigned_agent_id: None,
            parent_task_id: None,
            context: TaskContext::default(),
            estimated_duration: None,
            actual_duration: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
            version: 0,
        }
    }

    pub fn with_assignee(mut self, agent_id: AgentId) -> Self {
        self.assigned_agent_id = Some(agent_id);
        self
    }

    pub fn with_context(mut self, context: TaskContext) -> Self {
        self.context = context;
        self
    }

    /// Whether this task occupies a capacity slot of `agent_id`.
    pub fn occupies_slot_of(&self, agent_id: AgentId) -> bool {
        self.assigned_agent_id == Some(agent_id) && self.status.is_active()
    }

    /// Set a new status, stamping `completed_at` on the first completion only.
    pub fn set_status(&mut self, status: TaskStatus, now: Timestamp) {
        if status == TaskStatus::Completed && self.completed_at.is_none() {
            self.completed_at = Some(now);
        }
        self.status = status;
        self.updated_at = now;
    }

    /// Effort spent on a completed task, in minutes.
    ///
    /// Prefers the recorded `actual_duration` and falls back to wall-clock
    /// time between creation and completion.
    pub fn effective_duration(&self) -> Option<f64> {
        if let Some(actual) = self.actual_duration {
            return Some(f64::from(actual));
        }
        self.completed_at
            .map(|done| (done - self.created_at).num_seconds() as f64 / 60.0)
    }
}

// ============================================================================
// TASK HANDOFF
// ============================================================================

/// A stateful proposal to transfer a task from one agent to another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct TaskHandoff {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub handoff_id: HandoffId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub task_id: TaskId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub from_agent_id: AgentId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub to_agent_id: AgentId,
    pub reason: String,
    /// Snapshot of the working context at transfer time
    pub context_transfer: TaskContext,
    pub status: HandoffStatus,
    /// Status of the task right before the handoff, restored on rejection
    pub previous_task_status: TaskStatus,
    pub rejection_reason: Option<String>,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub created_at: Timestamp,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "date-time"))]
    pub completed_at: Option<Timestamp>,
}

impl TaskHandoff {
    /// Create a new pending handoff for `task` to `to_agent_id`.
    pub fn for_task(
        task: &Task,
        from_agent_id: AgentId,
        to_agent_id: AgentId,
        reason: impl Into<String>,
        context_transfer: TaskContext,
        now: Timestamp,
    ) -> Self {
        Self {
            handoff_id: new_entity_id(),
            task_id: task.task_id,
            from_agent_id,
            to_agent_id,
            reason: reason.into(),
            context_transfer,
            status: HandoffStatus::Pending,
            previous_task_status: task.status,
            rejection_reason: None,
            created_at: now,
            completed_at: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == HandoffStatus::Pending
    }

    pub fn accept(&mut self, now: Timestamp) {
        self.status = HandoffStatus::Accepted;
        self.completed_at = Some(now);
    }

    pub fn reject(&mut self, reason: Option<String>, now: Timestamp) {
        self.status = HandoffStatus::Rejected;
        self.rejection_reason = reason;
        self.completed_at = Some(now);
    }

    /// Whether this pending handoff has outlived `ttl`.
    pub fn is_expired(&self, ttl: chrono::Duration, now: Timestamp) -> bool {
        self.is_pending() && self.created_at + ttl <= now
    }
}

// ============================================================================
// AGENT
// ============================================================================

/// A capacity-bounded worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Agent {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub agent_id: AgentId,
    pub name: String,
    pub status: AgentStatus,
    pub max_concurrent_tasks: i32,
    pub skills: BTreeMap<String, ProficiencyLevel>,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub created_at: Timestamp,
}

impl Agent {
    /// Create a new active agent with no skills.
    pub fn new(name: impl Into<String>, max_concurrent_tasks: i32, now: Timestamp) -> Self {
        Self {
            agent_id: new_entity_id(),
            name: name.into(),
            status: AgentStatus::Active,
            max_concurrent_tasks,
            skills: BTreeMap::new(),
            created_at: now,
        }
    }

    pub fn with_skill(mut self, skill: impl Into<String>, level: ProficiencyLevel) -> Self {
        self.skills.insert(skill.into(), level);
        self
    }

    pub fn with_status(mut self, status: AgentStatus) -> Self {
        self.status = status;
        self
    }

    pub fn has_skill(&self, skill: &str) -> bool {
        self.skills.contains_key(skill)
    }

    /// Whether the agent holds every listed skill, at any level.
    pub fn has_all_skills(&self, skills: &[String]) -> bool {
        skills.iter().all(|s| self.has_skill(s))
    }
}

// ============================================================================
// HISTORY
// ============================================================================

/// Immutable audit record of a task lifecycle event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct TaskHistoryEntry {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub entry_id: HistoryEntryId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub task_id: TaskId,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "uuid"))]
    pub agent_id: Option<AgentId>,
    pub action: HistoryAction,
    pub details: String,
    #[cfg_attr(feature = "openapi", schema(value_type = Object))]
    pub metadata: Map<String, Value>,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub timestamp: Timestamp,
}

impl TaskHistoryEntry {
    pub fn new(
        task_id: TaskId,
        agent_id: Option<AgentId>,
        action: HistoryAction,
        details: impl Into<String>,
        now: Timestamp,
    ) -> Self {
        Self {
            entry_id: new_entity_id(),
            task_id,
            agent_id,
            action,
            details: details.into(),
            metadata: Map::new(),
            timestamp: now,
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// One changed field, as recorded in update history metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct FieldChange {
    pub field: String,
    #[cfg_attr(feature = "openapi", schema(value_type = Object))]
    pub from: Value,
    #[cfg_attr(feature = "openapi", schema(value_type = Object))]
    pub to: Value,
}
