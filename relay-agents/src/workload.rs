//! Workload aggregation and the capacity check every assignment goes through.

use relay_core::{
    Agent, AgentError, AgentId, RelayResult, Task, TaskHandoff, TaskStatus, Timestamp,
};
use relay_storage::{HandoffFilter, StorageRead, TaskFilter};
use serde::{Deserialize, Serialize};

/// Fraction of an agent's capacity in use, capped at 1.0.
///
/// Agents with no capacity are reported as fully utilized.
pub fn utilization(active_tasks: i32, max_concurrent_tasks: i32) -> f64 {
    if max_concurrent_tasks <= 0 {
        return 1.0;
    }
    (f64::from(active_tasks) / f64::from(max_concurrent_tasks)).min(1.0)
}

/// Fail with `CapacityExhausted` unless `agent` can take one more active task.
///
/// Must be called in the same transaction as the write that claims the slot.
pub fn ensure_capacity<T>(reader: &T, agent: &Agent) -> RelayResult<i32>
where
    T: StorageRead + ?Sized,
{
    let active = reader.task_count_active(agent.agent_id)?;
    if active >= agent.max_concurrent_tasks {
        return Err(AgentError::CapacityExhausted {
            agent_id: agent.agent_id,
            active,
            max: agent.max_concurrent_tasks,
        }
        .into());
    }
    Ok(active)
}

/// Point-in-time load of a single agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct WorkloadView {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub agent_id: AgentId,
    pub max_concurrent_tasks: i32,
    /// Tasks holding a capacity slot (pending, in_progress, handed_off)
    pub current_tasks: Vec<Task>,
    /// Handoffs addressed to this agent that await a decision
    pub pending_handoffs: Vec<TaskHandoff>,
    pub capacity_utilization: f64,
    /// Mean effort of completed tasks, in minutes
    pub average_task_duration: Option<f64>,
    /// Tasks completed inside the trailing window
    pub recent_completions: usize,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub computed_at: Timestamp,
}

impl WorkloadView {
    /// Aggregate the workload of `agent` from a consistent read.
    pub fn compute<T>(
        reader: &T,
        agent: &Agent,
        recent_window: chrono::Duration,
        now: Timestamp,
    ) -> RelayResult<Self>
    where
        T: StorageRead + ?Sized,
    {
        let assigned = reader.task_list(&TaskFilter::by_agent(agent.agent_id))?;
        let (current_tasks, others): (Vec<Task>, Vec<Task>) =
            assigned.into_iter().partition(|t| t.status.is_active());

        let completed: Vec<&Task> = others
            .iter()
            .filter(|t| t.status == TaskStatus::Completed)
            .collect();

        let durations: Vec<f64> = completed
            .iter()
            .filter_map(|t| t.effective_duration())
            .collect();
        let average_task_duration = if durations.is_empty() {
            None
        } else {
            Some(durations.iter().sum::<f64>() / durations.len() as f64)
        };

        let since = now - recent_window;
        let recent_completions = completed
            .iter()
            .filter(|t| t.completed_at.is_some_and(|done| done >= since))
            .count();

        let pending_handoffs = reader.handoff_list(&HandoffFilter::pending_for(agent.agent_id))?;
        let active = i32::try_from(current_tasks.len()).unwrap_or(i32::MAX);

        Ok(Self {
            agent_id: agent.agent_id,
            max_concurrent_tasks: agent.max_concurrent_tasks,
            capacity_utilization: utilization(active, agent.max_concurrent_tasks),
            current_tasks,
            pending_handoffs,
            average_task_duration,
            recent_completions,
            computed_at: now,
        })
    }

    pub fn active_task_count(&self) -> usize {
        self.current_tasks.len()
    }

    pub fn has_capacity(&self) -> bool {
        (self.current_tasks.len() as i64) < i64::from(self.max_concurrent_tasks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use relay_core::{ErrorKind, TaskPriority};
    use relay_storage::{InMemoryStorage, StorageTrait};

    fn seed(storage: &InMemoryStorage, task: Task) {
        storage.transaction(|tx| tx.task_insert(&task)).unwrap();
    }

    #[test]
    fn test_utilization() {
        assert_eq!(utilization(0, 4), 0.0);
        assert_eq!(utilization(1, 4), 0.25);
        assert_eq!(utilization(6, 4), 1.0);
        assert_eq!(utilization(0, 0), 1.0);
    }

    #[test]
    fn test_ensure_capacity() {
        let storage = InMemoryStorage::new();
        let agent = Agent::new("a", 1, Utc::now());
        assert_eq!(storage.read(|r| ensure_capacity(r, &agent)).unwrap(), 0);

        seed(
            &storage,
            Task::new("t", TaskPriority::Low, Utc::now()).with_assignee(agent.agent_id),
        );
        let err = storage.read(|r| ensure_capacity(r, &agent)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResourceExhausted);
    }

    #[test]
    fn test_workload_aggregates() {
        let storage = InMemoryStorage::new();
        let now = Utc::now();
        let agent = Agent::new("estimator", 4, now);

        seed(
            &storage,
            Task::new("open", TaskPriority::Low, now).with_assignee(agent.agent_id),
        );

        let mut recent = Task::new("recent", TaskPriority::Low, now - Duration::hours(2))
            .with_assignee(agent.agent_id);
        recent.set_status(TaskStatus::Completed, now - Duration::hours(1));
        seed(&storage, recent);

        let mut old = Task::new("old", TaskPriority::Low, now - Duration::days(30))
            .with_assignee(agent.agent_id);
        old.set_status(TaskStatus::Completed, now - Duration::days(20));
        old.actual_duration = Some(30);
        seed(&storage, old);

        let view = storage
            .read(|r| WorkloadView::compute(r, &agent, Duration::days(7), now))
            .unwrap();

        assert_eq!(view.active_task_count(), 1);
        assert_eq!(view.capacity_utilization, 0.25);
        assert_eq!(view.recent_completions, 1);
        assert_eq!(view.average_task_duration, Some(45.0));
        assert!(view.has_capacity());
        assert!(view.pending_handoffs.is_empty());
    }

    #[test]
    fn test_workload_without_completions() {
        let storage = InMemoryStorage::new();
        let agent = Agent::new("idle", 0, Utc::now());
        let view = storage
            .read(|r| WorkloadView::compute(r, &agent, Duration::days(7), Utc::now()))
            .unwrap();
        assert_eq!(view.average_task_duration, None);
        assert_eq!(view.capacity_utilization, 1.0);
        assert!(!view.has_capacity());
    }
}
