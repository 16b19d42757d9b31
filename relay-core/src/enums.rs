//! Enum types for RELAY entities

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// PARSE ERROR
// ============================================================================

/// Error when parsing an enum from its database string representation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumParseError {
    pub type_name: &'static str,
    pub value: String,
}

impl fmt::Display for EnumParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid {}: {}", self.type_name, self.value)
    }
}

impl std::error::Error for EnumParseError {}

// ============================================================================
// ENTITY TYPE
// ============================================================================

/// Entity type discriminator for polymorphic references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Task,
    Handoff,
    Agent,
    HistoryEntry,
}

impl EntityType {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            EntityType::Task => "task",
            EntityType::Handoff => "handoff",
            EntityType::Agent => "agent",
            EntityType::HistoryEntry => "history_entry",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_db_str())
    }
}

// ============================================================================
// TASK STATUS
// ============================================================================

/// Lifecycle status of a task.
///
/// ```text
/// create() → Pending ⇄ InProgress → Completed
///               │  ╲       │  ╲         │
///               │   Failed ┘   ╲        └─ reopen → InProgress
///               └── handoff ──→ HandedOff ── accept → InProgress
///                                         └─ reject → previous status
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
    HandedOff,
}

impl TaskStatus {
    /// All statuses, in declaration order.
    pub const ALL: [TaskStatus; 5] = [
        TaskStatus::Pending,
        TaskStatus::InProgress,
        TaskStatus::Completed,
        TaskStatus::Failed,
        TaskStatus::HandedOff,
    ];

    /// Statuses that occupy a slot of the assignee's capacity.
    pub const ACTIVE: [TaskStatus; 3] = [
        TaskStatus::Pending,
        TaskStatus::InProgress,
        TaskStatus::HandedOff,
    ];

    pub fn as_db_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::HandedOff => "handed_off",
        }
    }

    pub fn from_db_str(s: &str) -> Result<Self, EnumParseError> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(TaskStatus::Pending),
            "in_progress" | "inprogress" => Ok(TaskStatus::InProgress),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            "handed_off" | "handedoff" => Ok(TaskStatus::HandedOff),
            _ => Err(EnumParseError {
                type_name: "task status",
                value: s.to_string(),
            }),
        }
    }

    /// Whether a task in this status counts against its assignee's capacity.
    pub fn is_active(&self) -> bool {
        Self::ACTIVE.contains(self)
    }

    /// Whether an explicit status update may move a task from `self` to `next`.
    ///
    /// Staying in the same status is always allowed. `HandedOff` is entered
    /// and left only through the handoff lifecycle, never through an update.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        if *self == next {
            return true;
        }
        matches!(
            (*self, next),
            (Pending, InProgress)
                | (Pending, Completed)
                | (Pending, Failed)
                | (InProgress, Pending)
                | (InProgress, Completed)
                | (InProgress, Failed)
                | (Failed, Pending)
                | (Failed, InProgress)
                | (Completed, InProgress)
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_db_str())
    }
}

impl FromStr for TaskStatus {
    type Err = EnumParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db_str(s)
    }
}

// ============================================================================
// TASK PRIORITY
// ============================================================================

/// Priority of a task.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl TaskPriority {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            TaskPriority::Low => "low",
            TaskPriority::Medium => "medium",
            TaskPriority::High => "high",
            TaskPriority::Urgent => "urgent",
        }
    }

    pub fn from_db_str(s: &str) -> Result<Self, EnumParseError> {
        match s.to_lowercase().as_str() {
            "low" => Ok(TaskPriority::Low),
            "medium" => Ok(TaskPriority::Medium),
            "high" => Ok(TaskPriority::High),
            "urgent" => Ok(TaskPriority::Urgent),
            _ => Err(EnumParseError {
                type_name: "task priority",
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_db_str())
    }
}

impl FromStr for TaskPriority {
    type Err = EnumParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db_str(s)
    }
}

// ============================================================================
// HANDOFF STATUS
// ============================================================================

/// Status of a task handoff.
///
/// ```text
/// create() → Pending ──┬── accept() ──→ Accepted (terminal)
///                      └── reject() ──→ Rejected (terminal)
/// ```
///
/// `Completed` is part of the stored model but no operation produces it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum HandoffStatus {
    #[default]
    Pending,
    Accepted,
    Rejected,
    Completed,
}

impl HandoffStatus {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            HandoffStatus::Pending => "pending",
            HandoffStatus::Accepted => "accepted",
            HandoffStatus::Rejected => "rejected",
            HandoffStatus::Completed => "completed",
        }
    }

    pub fn from_db_str(s: &str) -> Result<Self, EnumParseError> {
        match s.to_lowercase().as_str() {
            "pending" | "initiated" => Ok(HandoffStatus::Pending),
            "accepted" => Ok(HandoffStatus::Accepted),
            "rejected" => Ok(HandoffStatus::Rejected),
            "completed" => Ok(HandoffStatus::Completed),
            _ => Err(EnumParseError {
                type_name: "handoff status",
                value: s.to_string(),
            }),
        }
    }

    /// Check if this is a terminal state (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        !matches!(self, HandoffStatus::Pending)
    }
}

impl fmt::Display for HandoffStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_db_str())
    }
}

impl FromStr for HandoffStatus {
    type Err = EnumParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db_str(s)
    }
}

// ============================================================================
// AGENT STATUS & SKILLS
// ============================================================================

/// Availability of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    #[default]
    Active,
    Training,
    Inactive,
}

impl AgentStatus {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            AgentStatus::Active => "active",
            AgentStatus::Training => "training",
            AgentStatus::Inactive => "inactive",
        }
    }

    pub fn from_db_str(s: &str) -> Result<Self, EnumParseError> {
        match s.to_lowercase().as_str() {
            "active" => Ok(AgentStatus::Active),
            "training" => Ok(AgentStatus::Training),
            "inactive" => Ok(AgentStatus::Inactive),
            _ => Err(EnumParseError {
                type_name: "agent status",
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_db_str())
    }
}

impl FromStr for AgentStatus {
    type Err = EnumParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db_str(s)
    }
}

/// How well an agent knows a skill.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum ProficiencyLevel {
    #[default]
    Beginner,
    Intermediate,
    Advanced,
    Expert,
}

// ============================================================================
// HISTORY ACTION
// ============================================================================

/// Kind of lifecycle event recorded in a task's history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum HistoryAction {
    Created,
    Assigned,
    Started,
    Updated,
    Completed,
    Failed,
    HandedOff,
}

impl HistoryAction {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            HistoryAction::Created => "created",
            HistoryAction::Assigned => "assigned",
            HistoryAction::Started => "started",
            HistoryAction::Updated => "updated",
            HistoryAction::Completed => "completed",
            HistoryAction::Failed => "failed",
            HistoryAction::HandedOff => "handed_off",
        }
    }
}

impl fmt::Display for HistoryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_db_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_status_roundtrip() {
        for status in TaskStatus::ALL {
            let parsed = TaskStatus::from_db_str(status.as_db_str()).unwrap();
            assert_eq!(status, parsed);
        }
        assert!(TaskStatus::from_db_str("archived").is_err());
    }

    #[test]
    fn test_task_status_serde_is_snake_case() {
        let json = serde_json::to_string(&TaskStatus::HandedOff).unwrap();
        assert_eq!(json, "\"handed_off\"");
        let parsed: TaskStatus = serde_json::from_str("\"in_progress\"").unwrap();
        assert_eq!(parsed, TaskStatus::InProgress);
    }

    #[test]
    fn test_entity_type_display_matches_serde() {
        for entity in [
            EntityType::Task,
            EntityType::Handoff,
            EntityType::Agent,
            EntityType::HistoryEntry,
        ] {
            let json = serde_json::to_string(&entity).unwrap();
            assert_eq!(json, format!("\"{}\"", entity));
        }
    }

    #[test]
    fn test_active_statuses() {
        assert!(TaskStatus::Pending.is_active());
        assert!(TaskStatus::InProgress.is_active());
        assert!(TaskStatus::HandedOff.is_active());
        assert!(!TaskStatus::Completed.is_active());
        assert!(!TaskStatus::Failed.is_active());
    }

    #[test]
    fn test_transition_table() {
        use TaskStatus::*;
        assert!(Pending.can_transition_to(InProgress));
        assert!(InProgress.can_transition_to(Completed));
        assert!(Failed.can_transition_to(Pending));
        assert!(Completed.can_transition_to(InProgress));

        assert!(!Completed.can_transition_to(Pending));
        assert!(!Completed.can_transition_to(Failed));
        assert!(!HandedOff.can_transition_to(InProgress));
        assert!(!HandedOff.can_transition_to(Completed));
    }

    #[test]
    fn test_handed_off_never_entered_by_update() {
        for status in TaskStatus::ALL {
            if status != TaskStatus::HandedOff {
                assert!(!status.can_transition_to(TaskStatus::HandedOff));
            }
        }
    }

    #[test]
    fn test_same_status_is_allowed() {
        for status in TaskStatus::ALL {
            assert!(status.can_transition_to(status));
        }
    }

    #[test]
    fn test_priority_ordering() {
        assert!(TaskPriority::Low < TaskPriority::Medium);
        assert!(TaskPriority::High < TaskPriority::Urgent);
        assert_eq!(TaskPriority::default(), TaskPriority::Medium);
    }

    #[test]
    fn test_handoff_status_terminal() {
        assert!(!HandoffStatus::Pending.is_terminal());
        assert!(HandoffStatus::Accepted.is_terminal());
        assert!(HandoffStatus::Rejected.is_terminal());
        assert_eq!(
            HandoffStatus::from_db_str("Initiated").unwrap(),
            HandoffStatus::Pending
        );
    }

    #[test]
    fn test_agent_status_parse() {
        assert_eq!("Training".parse::<AgentStatus>().unwrap(), AgentStatus::Training);
        let err = "retired".parse::<AgentStatus>().unwrap_err();
        assert!(err.to_string().contains("retired"));
    }
}
