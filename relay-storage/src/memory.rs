//! In-memory storage with serializable, all-or-nothing transactions.
//!
//! A single `RwLock` guards every table. Read scopes share the lock;
//! a transaction holds it exclusively and writes into a staging overlay
//! that is folded into the tables only when the closure succeeds.

use crate::{
    finish_handoff_listing, finish_task_listing, HandoffFilter, StorageRead, StorageTrait,
    StorageTx, TaskFilter,
};
use relay_core::{
    AgentId, EntityType, HandoffId, RelayError, RelayResult, StorageError, Task, TaskHandoff,
    TaskHistoryEntry, TaskId,
};
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Debug, Default)]
struct Tables {
    tasks: HashMap<TaskId, Task>,
    handoffs: HashMap<HandoffId, TaskHandoff>,
    history: Vec<TaskHistoryEntry>,
}

impl StorageRead for Tables {
    fn task_get(&self, id: TaskId) -> RelayResult<Option<Task>> {
        Ok(self.tasks.get(&id).cloned())
    }

    fn task_list(&self, filter: &TaskFilter) -> RelayResult<Vec<Task>> {
        let tasks = self
            .tasks
            .values()
            .filter(|t| filter.matches(t))
            .cloned()
            .collect();
        Ok(finish_task_listing(tasks, filter))
    }

    fn task_count_active(&self, agent_id: AgentId) -> RelayResult<i32> {
        Ok(count_slots(self.tasks.values(), agent_id))
    }

    fn handoff_get(&self, id: HandoffId) -> RelayResult<Option<TaskHandoff>> {
        Ok(self.handoffs.get(&id).cloned())
    }

    fn handoff_list(&self, filter: &HandoffFilter) -> RelayResult<Vec<TaskHandoff>> {
        let handoffs = self
            .handoffs
            .values()
            .filter(|h| filter.matches(h))
            .cloned()
            .collect();
        Ok(finish_handoff_listing(handoffs))
    }

    fn history_list(&self, task_id: TaskId) -> RelayResult<Vec<TaskHistoryEntry>> {
        Ok(self
            .history
            .iter()
            .filter(|e| e.task_id == task_id)
            .cloned()
            .collect())
    }

    fn history_list_by_agent(
        &self,
        agent_id: AgentId,
        limit: usize,
    ) -> RelayResult<Vec<TaskHistoryEntry>> {
        Ok(newest_first(self.history.iter(), agent_id, limit))
    }
}

fn count_slots<'a>(tasks: impl Iterator<Item = &'a Task>, agent_id: AgentId) -> i32 {
    let count = tasks.filter(|t| t.occupies_slot_of(agent_id)).count();
    i32::try_from(count).unwrap_or(i32::MAX)
}

/// Entries by `agent_id`, newest first. Equal timestamps keep reverse append order.
fn newest_first<'a>(
    entries: impl DoubleEndedIterator<Item = &'a TaskHistoryEntry>,
    agent_id: AgentId,
    limit: usize,
) -> Vec<TaskHistoryEntry> {
    let mut matched: Vec<TaskHistoryEntry> = entries
        .rev()
        .filter(|e| e.agent_id == Some(agent_id))
        .cloned()
        .collect();
    matched.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    matched.truncate(limit);
    matched
}

// ============================================================================
// STAGING OVERLAY
// ============================================================================

/// Uncommitted writes of one transaction layered over the committed tables.
struct StagedTx<'a> {
    base: &'a Tables,
    tasks: HashMap<TaskId, Task>,
    handoffs: HashMap<HandoffId, TaskHandoff>,
    history: Vec<TaskHistoryEntry>,
}

/// Owned result of a successful transaction, applied after the overlay is dropped.
struct Changes {
    tasks: HashMap<TaskId, Task>,
    handoffs: HashMap<HandoffId, TaskHandoff>,
    history: Vec<TaskHistoryEntry>,
}

impl<'a> StagedTx<'a> {
    fn new(base: &'a Tables) -> Self {
        Self {
            base,
            tasks: HashMap::new(),
            handoffs: HashMap::new(),
            history: Vec::new(),
        }
    }

    fn into_changes(self) -> Changes {
        Changes {
            tasks: self.tasks,
            handoffs: self.handoffs,
            history: self.history,
        }
    }

    fn merged_tasks(&self) -> impl Iterator<Item = &Task> {
        self.base
            .tasks
            .values()
            .filter(|t| !self.tasks.contains_key(&t.task_id))
            .chain(self.tasks.values())
    }

    fn merged_handoffs(&self) -> impl Iterator<Item = &TaskHandoff> {
        self.base
            .handoffs
            .values()
            .filter(|h| !self.handoffs.contains_key(&h.handoff_id))
            .chain(self.handoffs.values())
    }
}

impl Changes {
    fn apply(self, tables: &mut Tables) {
        tables.tasks.extend(self.tasks);
        tables.handoffs.extend(self.handoffs);
        tables.history.extend(self.history);
    }
}

impl StorageRead for StagedTx<'_> {
    fn task_get(&self, id: TaskId) -> RelayResult<Option<Task>> {
        match self.tasks.get(&id) {
            Some(task) => Ok(Some(task.clone())),
            None => self.base.task_get(id),
        }
    }

    fn task_list(&self, filter: &TaskFilter) -> RelayResult<Vec<Task>> {
        let tasks = self
            .merged_tasks()
            .filter(|t| filter.matches(t))
            .cloned()
            .collect();
        Ok(finish_task_listing(tasks, filter))
    }

    fn task_count_active(&self, agent_id: AgentId) -> RelayResult<i32> {
        Ok(count_slots(self.merged_tasks(), agent_id))
    }

    fn handoff_get(&self, id: HandoffId) -> RelayResult<Option<TaskHandoff>> {
        match self.handoffs.get(&id) {
            Some(handoff) => Ok(Some(handoff.clone())),
            None => self.base.handoff_get(id),
        }
    }

    fn handoff_list(&self, filter: &HandoffFilter) -> RelayResult<Vec<TaskHandoff>> {
        let handoffs = self
            .merged_handoffs()
            .filter(|h| filter.matches(h))
            .cloned()
            .collect();
        Ok(finish_handoff_listing(handoffs))
    }

    fn history_list(&self, task_id: TaskId) -> RelayResult<Vec<TaskHistoryEntry>> {
        Ok(self
            .base
            .history
            .iter()
            .chain(self.history.iter())
            .filter(|e| e.task_id == task_id)
            .cloned()
            .collect())
    }

    fn history_list_by_agent(
        &self,
        agent_id: AgentId,
        limit: usize,
    ) -> RelayResult<Vec<TaskHistoryEntry>> {
        Ok(newest_first(
            self.base.history.iter().chain(self.history.iter()),
            agent_id,
            limit,
        ))
    }
}

impl StorageTx for StagedTx<'_> {
    fn task_insert(&mut self, task: &Task) -> RelayResult<()> {
        if self.task_get(task.task_id)?.is_some() {
            return Err(RelayError::Storage(StorageError::InsertFailed {
                entity_type: EntityType::Task,
                reason: "already exists".to_string(),
            }));
        }
        self.tasks.insert(task.task_id, task.clone());
        Ok(())
    }

    fn task_update(&mut self, task: &Task, expected_version: u64) -> RelayResult<Task> {
        let current = self
            .task_get(task.task_id)?
            .ok_or_else(|| RelayError::not_found(EntityType::Task, task.task_id))?;

        if current.version != expected_version {
            return Err(RelayError::Storage(StorageError::VersionConflict {
                entity_type: EntityType::Task,
                id: task.task_id,
                expected: expected_version,
                actual: current.version,
            }));
        }

        let mut stored = task.clone();
        stored.version = expected_version + 1;
        self.tasks.insert(stored.task_id, stored.clone());
        Ok(stored)
    }

    fn handoff_insert(&mut self, handoff: &TaskHandoff) -> RelayResult<()> {
        if self.handoff_get(handoff.handoff_id)?.is_some() {
            return Err(RelayError::Storage(StorageError::InsertFailed {
                entity_type: EntityType::Handoff,
                reason: "already exists".to_string(),
            }));
        }
        self.handoffs.insert(handoff.handoff_id, handoff.clone());
        Ok(())
    }

    fn handoff_update(&mut self, handoff: &TaskHandoff) -> RelayResult<()> {
        let current = self
            .handoff_get(handoff.handoff_id)?
            .ok_or_else(|| RelayError::not_found(EntityType::Handoff, handoff.handoff_id))?;

        if current.status.is_terminal() {
            return Err(RelayError::Storage(StorageError::UpdateFailed {
                entity_type: EntityType::Handoff,
                id: handoff.handoff_id,
                reason: format!("handoff is already {}", current.status),
            }));
        }
        self.handoffs.insert(handoff.handoff_id, handoff.clone());
        Ok(())
    }

    fn history_append(&mut self, entry: &TaskHistoryEntry) -> RelayResult<()> {
        self.history.push(entry.clone());
        Ok(())
    }
}

// ============================================================================
// IN-MEMORY STORAGE
// ============================================================================

/// In-memory storage for tests and single-process deployments.
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    tables: RwLock<Tables>,
}

impl InMemoryStorage {
    /// Create an empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get count of stored tasks.
    pub fn task_count(&self) -> RelayResult<usize> {
        Ok(self.tables.read().map_err(|_| poisoned())?.tasks.len())
    }

    /// Get count of stored handoffs.
    pub fn handoff_count(&self) -> RelayResult<usize> {
        Ok(self.tables.read().map_err(|_| poisoned())?.handoffs.len())
    }

    /// Get count of history entries.
    pub fn history_count(&self) -> RelayResult<usize> {
        Ok(self.tables.read().map_err(|_| poisoned())?.history.len())
    }
}

fn poisoned() -> RelayError {
    RelayError::Storage(StorageError::LockPoisoned)
}

impl StorageTrait for InMemoryStorage {
    fn read<R, F>(&self, f: F) -> RelayResult<R>
    where
        F: FnOnce(&dyn StorageRead) -> RelayResult<R>,
    {
        let tables = self.tables.read().map_err(|_| poisoned())?;
        f(&*tables)
    }

    fn transaction<R, F>(&self, f: F) -> RelayResult<R>
    where
        F: FnOnce(&mut dyn StorageTx) -> RelayResult<R>,
    {
        let mut tables = self.tables.write().map_err(|_| poisoned())?;
        let mut staged = StagedTx::new(&tables);
        let result = f(&mut staged)?;
        let changes = staged.into_changes();
        changes.apply(&mut tables);
        Ok(result)
    }
}

// ============================================================================
// TESTS
// ============================================================================


// ============================================================================
// PROPERTY-BASED TESTS
// ============================================================================
