//! RELAY Core - Entity Types
//!
//! Pure data structures for task assignment and handoff. All other crates
//! depend on this. Behavior here is limited to invariants that belong to a
//! single entity (status transitions, completion stamping, context merge).

pub mod config;
pub mod entities;
pub mod enums;
pub mod error;
pub mod identity;

pub use config::{RelayConfig, SelectionStrategy};
pub use entities::{
    Agent, FieldChange, Task, TaskContext, TaskContextPatch, TaskHandoff, TaskHistoryEntry,
};
pub use enums::{
    AgentStatus, EntityType, EnumParseError, HandoffStatus, HistoryAction, ProficiencyLevel,
    TaskPriority, TaskStatus,
};
pub use error::{
    AgentError, ConfigError, ErrorKind, RelayError, RelayResult, StorageError, ValidationError,
};
pub use identity::{
    new_entity_id, AgentId, DurationMinutes, EntityId, HandoffId, HistoryEntryId, TaskId,
    Timestamp,
};
