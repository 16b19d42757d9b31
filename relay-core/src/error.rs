//! Error types for RELAY operations

use crate::{AgentId, EntityType, HandoffId, HandoffStatus, TaskId, TaskStatus};
use thiserror::Error;
use uuid::Uuid;

/// Storage layer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Entity not found: {entity_type:?} with id {id}")]
    NotFound { entity_type: EntityType, id: Uuid },

    #[error("Insert failed for {entity_type:?}: {reason}")]
    InsertFailed { entity_type: EntityType, reason: String },

    #[error("Update failed for {entity_type:?} with id {id}: {reason}")]
    UpdateFailed {
        entity_type: EntityType,
        id: Uuid,
        reason: String,
    },

    #[error("Version conflict on {entity_type:?} {id}: expected {expected}, found {actual}")]
    VersionConflict {
        entity_type: EntityType,
        id: Uuid,
        expected: u64,
        actual: u64,
    },

    #[error("Transaction failed: {reason}")]
    TransactionFailed { reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Invalid status transition for task {task_id}: {from} -> {to}")]
    InvalidTransition {
        task_id: TaskId,
        from: TaskStatus,
        to: TaskStatus,
    },
}

/// Assignment and handoff errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AgentError {
    #[error("Agent not registered: {agent_id}")]
    NotRegistered { agent_id: AgentId },

    #[error("Agent {agent_id} is at capacity ({active}/{max} active tasks)")]
    CapacityExhausted {
        agent_id: AgentId,
        active: i32,
        max: i32,
    },

    #[error("No eligible agent with free capacity for task {task_id} (required skills: {required_skills:?})")]
    NoEligibleAgent {
        task_id: TaskId,
        required_skills: Vec<String>,
    },

    #[error("Agent {agent_id} does not own task {task_id}")]
    NotTaskOwner { task_id: TaskId, agent_id: AgentId },

    #[error("Task {task_id} has no assigned agent")]
    TaskUnassigned { task_id: TaskId },

    #[error("Task {task_id} is completed and cannot be handed off")]
    TaskCompleted { task_id: TaskId },

    #[error("Task {task_id} already has a pending handoff")]
    HandoffPending { task_id: TaskId },

    #[error("Agent {agent_id} cannot hand a task off to itself")]
    SelfHandoff { agent_id: AgentId },

    #[error("Agent {agent_id} is not the target of handoff {handoff_id}")]
    NotHandoffTarget {
        handoff_id: HandoffId,
        agent_id: AgentId,
    },

    #[error("Handoff {handoff_id} is {status}, expected pending")]
    HandoffNotPending {
        handoff_id: HandoffId,
        status: HandoffStatus,
    },

    #[error("Handoff {handoff_id} no longer matches task {task_id}: {reason}")]
    HandoffStale {
        handoff_id: HandoffId,
        task_id: TaskId,
        reason: String,
    },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Caller-facing error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    InvalidArgument,
    ResourceExhausted,
    Conflict,
    Internal,
}

/// Master error type for all RELAY errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RelayError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl RelayError {
    /// Shorthand for a missing entity.
    pub fn not_found(entity_type: EntityType, id: Uuid) -> Self {
        StorageError::NotFound { entity_type, id }.into()
    }

    /// Classify this error for callers.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RelayError::Storage(e) => match e {
                StorageError::NotFound { .. } => ErrorKind::NotFound,
                StorageError::VersionConflict { .. } => ErrorKind::Conflict,
                StorageError::InsertFailed { .. }
                | StorageError::UpdateFailed { .. }
                | StorageError::TransactionFailed { .. }
                | StorageError::LockPoisoned => ErrorKind::Internal,
            },
            RelayError::Validation(_) => ErrorKind::InvalidArgument,
            RelayError::Agent(e) => match e {
                AgentError::NotRegistered { .. } => ErrorKind::NotFound,
                AgentError::CapacityExhausted { .. } | AgentError::NoEligibleAgent { .. } => {
                    ErrorKind::ResourceExhausted
                }
                AgentError::HandoffStale { .. } => ErrorKind::Conflict,
                AgentError::NotTaskOwner { .. }
                | AgentError::TaskUnassigned { .. }
                | AgentError::TaskCompleted { .. }
                | AgentError::HandoffPending { .. }
                | AgentError::SelfHandoff { .. }
                | AgentError::NotHandoffTarget { .. }
                | AgentError::HandoffNotPending { .. } => ErrorKind::InvalidArgument,
            },
            RelayError::Config(_) => ErrorKind::Internal,
        }
    }
}

/// Result type alias for RELAY operations.
pub type RelayResult<T> = Result<T, RelayError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_display_not_found() {
        let err = StorageError::NotFound {
            entity_type: EntityType::Task,
            id: Uuid::nil(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("Entity not found"));
        assert!(msg.contains("Task"));
        assert!(msg.contains("00000000-0000-0000-0000-000000000000"));
    }

    #[test]
    fn test_capacity_error_display() {
        let err = AgentError::CapacityExhausted {
            agent_id: Uuid::nil(),
            active: 2,
            max: 2,
        };
        assert!(err.to_string().contains("2/2"));
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            RelayError::not_found(EntityType::Handoff, Uuid::nil()).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            RelayError::from(AgentError::NotRegistered { agent_id: Uuid::nil() }).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            RelayError::from(AgentError::NoEligibleAgent {
                task_id: Uuid::nil(),
                required_skills: vec![],
            })
            .kind(),
            ErrorKind::ResourceExhausted
        );
        assert_eq!(
            RelayError::from(AgentError::TaskCompleted { task_id: Uuid::nil() }).kind(),
            ErrorKind::InvalidArgument
        );
        assert_eq!(
            RelayError::from(StorageError::VersionConflict {
                entity_type: EntityType::Task,
                id: Uuid::nil(),
                expected: 1,
                actual: 2,
            })
            .kind(),
            ErrorKind::Conflict
        );
        assert_eq!(
            RelayError::from(StorageError::LockPoisoned).kind(),
            ErrorKind::Internal
        );
    }

    #[test]
    fn test_invalid_transition_is_invalid_argument() {
        let err = RelayError::from(ValidationError::InvalidTransition {
            task_id: Uuid::nil(),
            from: TaskStatus::Completed,
            to: TaskStatus::Pending,
        });
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert!(err.to_string().contains("completed -> pending"));
    }
}
