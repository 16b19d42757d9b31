//! RELAY Storage - Storage Traits and In-Memory Implementation
//!
//! Defines the storage abstraction for tasks, handoffs and history:
//! - `StorageRead`: point lookups, filtered listing and capacity counts
//! - `StorageTx`: writes, only reachable inside a transaction
//! - `StorageTrait`: shared read scopes and serializable, all-or-nothing
//!   transaction scopes
//!
//! History is append-only: no trait exposes an update or delete for it.

pub mod memory;
pub mod observer;
pub mod registry;

pub use memory::InMemoryStorage;
pub use observer::{ChangeObserver, NoopObserver};
pub use registry::{AgentRegistry, InMemoryAgentRegistry};

use relay_core::{
    AgentId, HandoffId, HandoffStatus, RelayResult, Task, TaskHandoff, TaskHistoryEntry, TaskId,
    TaskPriority, TaskStatus,
};
use serde::{Deserialize, Serialize};

// ============================================================================
// FILTERS
// ============================================================================

/// Filter for listing tasks. Results are ordered by `created_at`, then id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub assigned_agent_id: Option<AgentId>,
    pub priority: Option<TaskPriority>,
    pub parent_task_id: Option<TaskId>,
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: usize,
}

impl TaskFilter {
    pub fn by_status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn by_agent(agent_id: AgentId) -> Self {
        Self {
            assigned_agent_id: Some(agent_id),
            ..Default::default()
        }
    }

    pub fn matches(&self, task: &Task) -> bool {
        self.status.is_none_or(|s| task.status == s)
            && self
                .assigned_agent_id
                .is_none_or(|a| task.assigned_agent_id == Some(a))
            && self.priority.is_none_or(|p| task.priority == p)
            && self
                .parent_task_id
                .is_none_or(|p| task.parent_task_id == Some(p))
    }
}

/// Filter for listing handoffs. Results are ordered by `created_at`, then id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HandoffFilter {
    pub task_id: Option<TaskId>,
    pub from_agent_id: Option<AgentId>,
    pub to_agent_id: Option<AgentId>,
    pub status: Option<HandoffStatus>,
}

impl HandoffFilter {
    /// Pending handoffs addressed to `agent_id`.
    pub fn pending_for(agent_id: AgentId) -> Self {
        Self {
            to_agent_id: Some(agent_id),
            status: Some(HandoffStatus::Pending),
            ..Default::default()
        }
    }

    pub fn for_task(task_id: TaskId) -> Self {
        Self {
            task_id: Some(task_id),
            ..Default::default()
        }
    }

    pub fn matches(&self, handoff: &TaskHandoff) -> bool {
        self.task_id.is_none_or(|t| handoff.task_id == t)
            && self.from_agent_id.is_none_or(|a| handoff.from_agent_id == a)
            && self.to_agent_id.is_none_or(|a| handoff.to_agent_id == a)
            && self.status.is_none_or(|s| handoff.status == s)
    }
}

// ============================================================================
// STORAGE TRAITS
// ============================================================================

/// Read operations, available in both read and transaction scopes.
pub trait StorageRead {
    /// Get a task by ID.
    fn task_get(&self, id: TaskId) -> RelayResult<Option<Task>>;

    /// List tasks matching a filter, paginated by `limit`/`offset`.
    fn task_list(&self, filter: &TaskFilter) -> RelayResult<Vec<Task>>;

    /// Count tasks assigned to `agent_id` in an active status
    /// (pending, in_progress, handed_off).
    fn task_count_active(&self, agent_id: AgentId) -> RelayResult<i32>;

    /// Get a handoff by ID.
    fn handoff_get(&self, id: HandoffId) -> RelayResult<Option<TaskHandoff>>;

    /// List handoffs matching a filter.
    fn handoff_list(&self, filter: &HandoffFilter) -> RelayResult<Vec<TaskHandoff>>;

    /// History of one task, in append order.
    fn history_list(&self, task_id: TaskId) -> RelayResult<Vec<TaskHistoryEntry>>;

    /// Most recent history entries attributed to `agent_id`, newest first.
    fn history_list_by_agent(
        &self,
        agent_id: AgentId,
        limit: usize,
    ) -> RelayResult<Vec<TaskHistoryEntry>>;
}

/// Write operations, only reachable inside `StorageTrait::transaction`.
pub trait StorageTx: StorageRead {
    /// Insert a new task. Fails if the id already exists.
    fn task_insert(&mut self, task: &Task) -> RelayResult<()>;

    /// Replace a task if its stored version equals `expected_version`.
    ///
    /// Returns the stored task with its version bumped.
    fn task_update(&mut self, task: &Task, expected_version: u64) -> RelayResult<Task>;

    /// Insert a new handoff. Fails if the id already exists.
    fn handoff_insert(&mut self, handoff: &TaskHandoff) -> RelayResult<()>;

    /// Replace a pending handoff. Resolved handoffs are immutable.
    fn handoff_update(&mut self, handoff: &TaskHandoff) -> RelayResult<()>;

    /// Append an immutable history entry.
    fn history_append(&mut self, entry: &TaskHistoryEntry) -> RelayResult<()>;
}

/// Storage handle injected into every component.
///
/// `read` runs under a shared lock. `transaction` runs under an exclusive
/// lock and publishes its writes only if the closure returns `Ok`; an
/// error discards every write made inside it.
pub trait StorageTrait: Send + Sync {
    fn read<R, F>(&self, f: F) -> RelayResult<R>
    where
        F: FnOnce(&dyn StorageRead) -> RelayResult<R>;

    fn transaction<R, F>(&self, f: F) -> RelayResult<R>
    where
        F: FnOnce(&mut dyn StorageTx) -> RelayResult<R>;
}

/// Sort and paginate tasks the way every backend must.
pub fn finish_task_listing(mut tasks: Vec<Task>, filter: &TaskFilter) -> Vec<Task> {
    tasks.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.task_id.cmp(&b.task_id))
    });
    let iter = tasks.into_iter().skip(filter.offset);
    match filter.limit {
        Some(limit) => iter.take(limit).collect(),
        None => iter.collect(),
    }
}

/// Sort handoffs the way every backend must.
pub fn finish_handoff_listing(mut handoffs: Vec<TaskHandoff>) -> Vec<TaskHandoff> {
    handoffs.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.handoff_id.cmp(&b.handoff_id))
    });
    handoffs
}
