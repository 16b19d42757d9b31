//! Error Types for the RELAY API
//!
//! This module defines error handling for the HTTP layer:
//! - `ApiError` struct for structured error responses
//! - `ErrorCode` enum for categorizing errors
//! - `IntoResponse` implementation for Axum
//! - Conversion from core `RelayError` via its `ErrorKind`
//!
//! All errors are serialized as JSON with the status code of their category.

use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use relay_core::{AgentError, EntityType, ErrorKind, RelayError, StorageError, ValidationError};
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

// ============================================================================
// ERROR CODE ENUM
// ============================================================================

/// Error codes for API responses.
///
/// Each code belongs to exactly one caller-facing category and therefore
/// maps to exactly one HTTP status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // ========================================================================
    // Not Found (404)
    // ========================================================================
    /// Requested task does not exist
    TaskNotFound,

    /// Requested handoff does not exist
    HandoffNotFound,

    /// Requested agent is not registered
    AgentNotFound,

    /// Requested entity does not exist
    EntityNotFound,

    // ========================================================================
    // Invalid Argument (400)
    // ========================================================================
    /// Request validation failed
    ValidationFailed,

    /// Request body or query could not be parsed
    InvalidInput,

    /// Identifier in the path is not a valid UUID
    InvalidFormat,

    /// Requested status change is not allowed
    InvalidTransition,

    /// Operation does not apply to the entity in its current state
    PreconditionFailed,

    // ========================================================================
    // Resource Exhausted (429)
    // ========================================================================
    /// Target agent has no free capacity slot
    CapacityExhausted,

    /// No active agent with the required skills has free capacity
    NoEligibleAgent,

    // ========================================================================
    // Conflict (409)
    // ========================================================================
    /// Optimistic version check failed
    ConcurrentModification,

    /// Entity changed underneath a pending decision
    StateConflict,

    // ========================================================================
    // Internal (500)
    // ========================================================================
    /// Internal server error
    InternalError,
}

impl ErrorCode {
    /// Get the caller-facing category of this code.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ErrorCode::TaskNotFound
            | ErrorCode::HandoffNotFound
            | ErrorCode::AgentNotFound
            | ErrorCode::EntityNotFound => ErrorKind::NotFound,

            ErrorCode::ValidationFailed
            | ErrorCode::InvalidInput
            | ErrorCode::InvalidFormat
            | ErrorCode::InvalidTransition
            | ErrorCode::PreconditionFailed => ErrorKind::InvalidArgument,

            ErrorCode::CapacityExhausted | ErrorCode::NoEligibleAgent => {
                ErrorKind::ResourceExhausted
            }

            ErrorCode::ConcurrentModification | ErrorCode::StateConflict => ErrorKind::Conflict,

            ErrorCode::InternalError => ErrorKind::Internal,
        }
    }

    /// Get the HTTP status code for this error code.
    pub fn status_code(&self) -> StatusCode {
        status_for_kind(self.kind())
    }

    /// Get a default message for this error code.
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::TaskNotFound => "Task not found",
            ErrorCode::HandoffNotFound => "Handoff not found",
            ErrorCode::AgentNotFound => "Agent not found",
            ErrorCode::EntityNotFound => "Entity not found",
            ErrorCode::ValidationFailed => "Request validation failed",
            ErrorCode::InvalidInput => "Invalid input data",
            ErrorCode::InvalidFormat => "Invalid format",
            ErrorCode::InvalidTransition => "Status transition not allowed",
            ErrorCode::PreconditionFailed => "Operation not allowed in current state",
            ErrorCode::CapacityExhausted => "Agent capacity exhausted",
            ErrorCode::NoEligibleAgent => "No eligible agent available",
            ErrorCode::ConcurrentModification => "Concurrent modification detected",
            ErrorCode::StateConflict => "Operation conflicts with current state",
            ErrorCode::InternalError => "Internal server error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// HTTP status for a caller-facing error category.
pub fn status_for_kind(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::InvalidArgument => StatusCode::BAD_REQUEST,
        ErrorKind::ResourceExhausted => StatusCode::TOO_MANY_REQUESTS,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

// ============================================================================
// API ERROR STRUCT
// ============================================================================

/// Structured error response for API operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// Error code categorizing the error
    pub code: ErrorCode,

    /// Human-readable error message
    pub message: String,

    /// Optional additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    /// Create a new API error with the given code, using the default message.
    pub fn from_code(code: ErrorCode) -> Self {
        Self::new(code, code.default_message())
    }

    /// Add additional details to the error.
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn status_code(&self) -> StatusCode {
        self.code.status_code()
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    pub fn invalid_format(field: &str, expected: &str) -> Self {
        Self::new(
            ErrorCode::InvalidFormat,
            format!("Field '{}' has invalid format, expected {}", field, expected),
        )
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

// ============================================================================
// AXUM INTEGRATION
// ============================================================================

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(self)).into_response()
    }
}

// ============================================================================
// CONVERSIONS
// ============================================================================

fn not_found_code(entity_type: EntityType) -> ErrorCode {
    match entity_type {
        EntityType::Task => ErrorCode::TaskNotFound,
        EntityType::Handoff => ErrorCode::HandoffNotFound,
        EntityType::Agent => ErrorCode::AgentNotFound,
        EntityType::HistoryEntry => ErrorCode::EntityNotFound,
    }
}

/// Convert a core error, keeping its category.
impl From<RelayError> for ApiError {
    fn from(err: RelayError) -> Self {
        let code = match &err {
            RelayError::Storage(StorageError::NotFound { entity_type, .. }) => {
                not_found_code(*entity_type)
            }
            RelayError::Storage(StorageError::VersionConflict { .. }) => {
                ErrorCode::ConcurrentModification
            }
            RelayError::Validation(ValidationError::InvalidTransition { .. }) => {
                ErrorCode::InvalidTransition
            }
            RelayError::Validation(_) => ErrorCode::ValidationFailed,
            RelayError::Agent(AgentError::NotRegistered { .. }) => ErrorCode::AgentNotFound,
            RelayError::Agent(AgentError::CapacityExhausted { .. }) => {
                ErrorCode::CapacityExhausted
            }
            RelayError::Agent(AgentError::NoEligibleAgent { .. }) => ErrorCode::NoEligibleAgent,
            RelayError::Agent(AgentError::HandoffStale { .. }) => ErrorCode::StateConflict,
            RelayError::Agent(_) => ErrorCode::PreconditionFailed,
            RelayError::Storage(_) | RelayError::Config(_) => ErrorCode::InternalError,
        };
        debug_assert_eq!(code.kind(), err.kind());

        if code == ErrorCode::InternalError {
            // Storage internals are logged, not leaked
            tracing::error!(error = %err, "Internal error");
            return ApiError::from_code(code);
        }
        ApiError::new(code, err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::invalid_input(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::invalid_input(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::invalid_format("id", &format!("valid UUID ({})", rejection.body_text()))
    }
}

// ============================================================================
// RESULT TYPE ALIAS
// ============================================================================

/// Result type alias for API operations.
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::{new_entity_id, HandoffStatus, TaskStatus};

    fn samples() -> Vec<RelayError> {
        let id = new_entity_id();
        vec![
            RelayError::not_found(EntityType::Task, id),
            RelayError::not_found(EntityType::Handoff, id),
            AgentError::NotRegistered { agent_id: id }.into(),
            ValidationError::RequiredFieldMissing {
                field: "title".to_string(),
            }
            .into(),
            ValidationError::InvalidTransition {
                task_id: id,
                from: TaskStatus::Completed,
                to: TaskStatus::Pending,
            }
            .into(),
            AgentError::NotTaskOwner {
                task_id: id,
                agent_id: id,
            }
            .into(),
            AgentError::HandoffNotPending {
                handoff_id: id,
                status: HandoffStatus::Accepted,
            }
            .into(),
            AgentError::CapacityExhausted {
                agent_id: id,
                active: 2,
                max: 2,
            }
            .into(),
            AgentError::NoEligibleAgent {
                task_id: id,
                required_skills: vec!["permits".to_string()],
            }
            .into(),
            StorageError::VersionConflict {
                entity_type: EntityType::Task,
                id,
                expected: 1,
                actual: 2,
            }
            .into(),
            AgentError::HandoffStale {
                handoff_id: id,
                task_id: id,
                reason: "task moved".to_string(),
            }
            .into(),
            StorageError::LockPoisoned.into(),
        ]
    }

    #[test]
    fn test_status_follows_core_kind() {
        for err in samples() {
            let expected = status_for_kind(err.kind());
            let api: ApiError = err.clone().into();
            assert_eq!(api.status_code(), expected, "{:?}", err);
        }
    }

    #[test]
    fn test_kind_status_mapping() {
        assert_eq!(status_for_kind(ErrorKind::NotFound), StatusCode::NOT_FOUND);
        assert_eq!(status_for_kind(ErrorKind::InvalidArgument), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_for_kind(ErrorKind::ResourceExhausted),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(status_for_kind(ErrorKind::Conflict), StatusCode::CONFLICT);
        assert_eq!(
            status_for_kind(ErrorKind::Internal),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_specific_codes() {
        let id = new_entity_id();
        let api: ApiError = RelayError::not_found(EntityType::Task, id).into();
        assert_eq!(api.code, ErrorCode::TaskNotFound);
        assert!(api.message.contains(&id.to_string()));

        let api: ApiError = AgentError::CapacityExhausted {
            agent_id: id,
            active: 1,
            max: 1,
        }
        .into();
        assert_eq!(api.code, ErrorCode::CapacityExhausted);
    }

    #[test]
    fn test_internal_errors_are_not_leaked() {
        let api: ApiError = RelayError::from(StorageError::TransactionFailed {
            reason: "disk on fire".to_string(),
        })
        .into();
        assert_eq!(api.code, ErrorCode::InternalError);
        assert!(!api.message.contains("disk"));
    }

    #[test]
    fn test_error_serialization() -> Result<(), serde_json::Error> {
        let err = ApiError::from_code(ErrorCode::CapacityExhausted);
        let json = serde_json::to_string(&err)?;

        assert!(json.contains("CAPACITY_EXHAUSTED"));
        assert!(!json.contains("details"));

        let deserialized: ApiError = serde_json::from_str(&json)?;
        assert_eq!(deserialized, err);
        Ok(())
    }

    #[test]
    fn test_with_details() {
        let details = serde_json::json!({ "field": "title" });
        let err = ApiError::invalid_input("bad").with_details(details.clone());
        assert_eq!(err.details, Some(details));
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }
}
