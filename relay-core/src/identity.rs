//! Identity types for RELAY entities

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Entity identifier using UUIDv7 for timestamp-sortable IDs.
/// UUIDv7 embeds a Unix timestamp, making IDs naturally sortable by creation time.
pub type EntityId = Uuid;

/// Identifier of a task.
pub type TaskId = EntityId;

/// Identifier of an agent.
pub type AgentId = EntityId;

/// Identifier of a task handoff.
pub type HandoffId = EntityId;

/// Identifier of a history entry.
pub type HistoryEntryId = EntityId;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Durations of work are tracked in whole minutes.
pub type DurationMinutes = i32;

/// Generate a new UUIDv7 EntityId (timestamp-sortable).
pub fn new_entity_id() -> EntityId {
    Uuid::now_v7()
}
