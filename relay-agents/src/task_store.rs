//! Task lifecycle: creation, partial updates, listing, and history.

use crate::workload::ensure_capacity;
use chrono::Utc;
use relay_core::{
    AgentError, AgentId, DurationMinutes, EntityType, FieldChange, HistoryAction, RelayConfig,
    RelayError, RelayResult, StorageError, Task, TaskContext, TaskContextPatch, TaskHistoryEntry,
    TaskId, TaskPriority, TaskStatus, Timestamp, ValidationError,
};
use relay_storage::{AgentRegistry, ChangeObserver, StorageRead, StorageTrait, TaskFilter};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};

/// Input for creating a task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct NewTask {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: TaskPriority,
    #[serde(default)]
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "uuid"))]
    pub assigned_agent_id: Option<AgentId>,
    #[serde(default)]
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "uuid"))]
    pub parent_task_id: Option<TaskId>,
    #[serde(default)]
    pub context: TaskContext,
    #[serde(default)]
    #[cfg_attr(feature = "openapi", schema(value_type = Option<i32>))]
    pub estimated_duration: Option<DurationMinutes>,
}

impl NewTask {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }
}

/// Partial update of a task. Absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(default)]
pub struct TaskUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "uuid"))]
    pub assigned_agent_id: Option<AgentId>,
    pub context: Option<TaskContextPatch>,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<i32>))]
    pub estimated_duration: Option<DurationMinutes>,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<i32>))]
    pub actual_duration: Option<DurationMinutes>,
    /// Reject the update unless the stored version still matches
    pub expected_version: Option<u64>,
}

/// Owns task records and their history.
pub struct TaskStore<S, R> {
    storage: Arc<S>,
    registry: Arc<R>,
    observer: Arc<dyn ChangeObserver>,
    config: RelayConfig,
}

impl<S, R> TaskStore<S, R>
where
    S: StorageTrait,
    R: AgentRegistry,
{
    pub fn new(
        storage: Arc<S>,
        registry: Arc<R>,
        observer: Arc<dyn ChangeObserver>,
        config: RelayConfig,
    ) -> Self {
        Self {
            storage,
            registry,
            observer,
            config,
        }
    }

    /// Create a pending task, optionally pre-assigned.
    pub fn create(&self, input: NewTask) -> RelayResult<Task> {
        let title = input.title.trim();
        if title.is_empty() {
            return Err(ValidationError::RequiredFieldMissing {
                field: "title".to_string(),
            }
            .into());
        }
        check_duration("estimated_duration", input.estimated_duration)?;

        let now = Utc::now();
        let mut task = Task::new(title, input.priority, now).with_context(input.context);
        task.description = input.description;
        task.parent_task_id = input.parent_task_id;
        task.estimated_duration = input.estimated_duration;
        task.assigned_agent_id = input.assigned_agent_id;

        self.storage.transaction(|tx| {
            if let Some(agent_id) = task.assigned_agent_id {
                let agent = self.registry.agent_require(agent_id)?;
                ensure_capacity(&*tx, &agent)?;
            }
            if let Some(parent_id) = task.parent_task_id {
                require_task(&*tx, parent_id)?;
            }
            tx.task_insert(&task)?;

            let entry = TaskHistoryEntry::new(
                task.task_id,
                task.assigned_agent_id,
                HistoryAction::Created,
                format!("Task created: {}", task.title),
                now,
            )
            .with_metadata("priority", json!(task.priority))
            .with_metadata("assigned_agent_id", json!(task.assigned_agent_id));
            tx.history_append(&entry)
        })?;

        info!(
            task_id = %task.task_id,
            assigned_agent_id = ?task.assigned_agent_id,
            priority = %task.priority,
            "Task created"
        );
        self.observer.entity_changed(EntityType::Task, task.task_id);
        Ok(task)
    }

    /// Apply a partial update.
    ///
    /// Status changes must follow the transition table. One history entry is
    /// written when status, assignee or priority changed, listing every
    /// changed field.
    pub fn update(&self, task_id: TaskId, update: TaskUpdate) -> RelayResult<Task> {
        check_duration("estimated_duration", update.estimated_duration)?;
        check_duration("actual_duration", update.actual_duration)?;
        if let Some(title) = &update.title {
            if title.trim().is_empty() {
                return Err(ValidationError::InvalidValue {
                    field: "title".to_string(),
                    reason: "must not be empty".to_string(),
                }
                .into());
            }
        }

        let now = Utc::now();
        let result = self.storage.transaction(|tx| {
            let new_assignee = match update.assigned_agent_id {
                Some(id) => Some(self.registry.agent_require(id)?),
                None => None,
            };
            let current = require_task(&*tx, task_id)?;
            if let Some(expected) = update.expected_version {
                if expected != current.version {
                    return Err(StorageError::VersionConflict {
                        entity_type: EntityType::Task,
                        id: task_id,
                        expected,
                        actual: current.version,
                    }
                    .into());
                }
            }

            let mut task = current.clone();
            let mut changes = Vec::new();

            if let Some(title) = &update.title {
                let title = title.trim();
                if title != task.title {
                    changes.push(change("title", json!(task.title), json!(title)));
                    task.title = title.to_string();
                }
            }
            if let Some(description) = &update.description {
                if Some(description) != task.description.as_ref() {
                    changes.push(change("description", json!(task.description), json!(description)));
                    task.description = Some(description.clone());
                }
            }
            if let Some(priority) = update.priority {
                if priority != task.priority {
                    changes.push(change("priority", json!(task.priority), json!(priority)));
                    task.priority = priority;
                }
            }
            if let Some(status) = update.status {
                if status != task.status {
                    if !task.status.can_transition_to(status) {
                        return Err(ValidationError::InvalidTransition {
                            task_id,
                            from: task.status,
                            to: status,
                        }
                        .into());
                    }
                    changes.push(change("status", json!(task.status), json!(status)));
                    task.set_status(status, now);
                }
            }
            if let Some(agent) = &new_assignee {
                if Some(agent.agent_id) != task.assigned_agent_id {
                    if current.status == TaskStatus::HandedOff {
                        return Err(AgentError::HandoffPending { task_id }.into());
                    }
                    changes.push(change(
                        "assigned_agent_id",
                        json!(task.assigned_agent_id),
                        json!(agent.agent_id),
                    ));
                    task.assigned_agent_id = Some(agent.agent_id);
                }
            }
            if let Some(patch) = &update.context {
                if !patch.is_empty() {
                    let before = task.context.clone();
                    task.context.merge(patch.clone());
                    if task.context != before {
                        changes.push(change("context", json!(before), json!(task.context)));
                    }
                }
            }
            if let Some(minutes) = update.estimated_duration {
                if Some(minutes) != task.estimated_duration {
                    changes.push(change("estimated_duration", json!(task.estimated_duration), json!(minutes)));
                    task.estimated_duration = Some(minutes);
                }
            }
            if let Some(minutes) = update.actual_duration {
                if Some(minutes) != task.actual_duration {
                    changes.push(change("actual_duration", json!(task.actual_duration), json!(minutes)));
                    task.actual_duration = Some(minutes);
                }
            }

            if changes.is_empty() {
                return Ok((current, false));
            }

            // A task that starts holding a slot of its assignee needs a free one.
            if let Some(agent_id) = task.assigned_agent_id {
                if task.occupies_slot_of(agent_id) && !current.occupies_slot_of(agent_id) {
                    let agent = match &new_assignee {
                        Some(agent) if agent.agent_id == agent_id => agent.clone(),
                        _ => self.registry.agent_require(agent_id)?,
                    };
                    ensure_capacity(&*tx, &agent)?;
                }
            }

            task.updated_at = now;
            let stored = tx.task_update(&task, current.version)?;

            if let Some(entry) = history_for_update(&current, &stored, &changes, now) {
                tx.history_append(&entry)?;
            }
            Ok((stored, true))
        });

        let (task, changed) = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                debug!(task_id = %task_id, error = %e, "Task update rejected");
                return Err(e);
            }
        };

        if changed {
            info!(
                task_id = %task.task_id,
                status = %task.status,
                version = task.version,
                "Task updated"
            );
            self.observer.entity_changed(EntityType::Task, task.task_id);
        }
        Ok(task)
    }

    pub fn get(&self, task_id: TaskId) -> RelayResult<Task> {
        self.storage.read(|r| require_task(r, task_id))
    }

    /// List tasks; the page size defaults to and is capped by configuration.
    pub fn list(&self, mut filter: TaskFilter) -> RelayResult<Vec<Task>> {
        filter.limit = Some(self.config.page_size(filter.limit));
        self.storage.read(|r| r.task_list(&filter))
    }

    /// History of a task in append order.
    pub fn history(&self, task_id: TaskId) -> RelayResult<Vec<TaskHistoryEntry>> {
        self.storage.read(|r| {
            require_task(r, task_id)?;
            r.history_list(task_id)
        })
    }

    /// History entries attributed to an agent, newest first.
    pub fn agent_history(
        &self,
        agent_id: AgentId,
        limit: Option<usize>,
    ) -> RelayResult<Vec<TaskHistoryEntry>> {
        self.registry.agent_require(agent_id)?;
        let limit = self.config.page_size(limit);
        self.storage
            .read(|r| r.history_list_by_agent(agent_id, limit))
    }
}

/// Load a task or fail with NotFound.
pub(crate) fn require_task<T>(reader: &T, task_id: TaskId) -> RelayResult<Task>
where
    T: StorageRead + ?Sized,
{
    reader
        .task_get(task_id)?
        .ok_or_else(|| RelayError::not_found(EntityType::Task, task_id))
}

fn check_duration(field: &str, minutes: Option<DurationMinutes>) -> RelayResult<()> {
    match minutes {
        Some(m) if m < 0 => Err(ValidationError::InvalidValue {
            field: field.to_string(),
            reason: format!("must not be negative, got {}", m),
        }
        .into()),
        _ => Ok(()),
    }
}

fn change(field: &str, from: Value, to: Value) -> FieldChange {
    FieldChange {
        field: field.to_string(),
        from,
        to,
    }
}

fn history_for_update(
    before: &Task,
    after: &Task,
    changes: &[FieldChange],
    now: Timestamp,
) -> Option<TaskHistoryEntry> {
    let status_changed = before.status != after.status;
    let assignee_changed = before.assigned_agent_id != after.assigned_agent_id;
    let priority_changed = before.priority != after.priority;
    if !(status_changed || assignee_changed || priority_changed) {
        return None;
    }

    let action = match after.status {
        TaskStatus::Completed if status_changed => HistoryAction::Completed,
        TaskStatus::Failed if status_changed => HistoryAction::Failed,
        TaskStatus::InProgress if status_changed => HistoryAction::Started,
        _ if assignee_changed => HistoryAction::Assigned,
        _ => HistoryAction::Updated,
    };

    let fields: Vec<&str> = changes.iter().map(|c| c.field.as_str()).collect();
    let details = format!("Task {}: {}", action, fields.join(", "));

    Some(
        TaskHistoryEntry::new(after.task_id, after.assigned_agent_id, action, details, now)
            .with_metadata("changes", json!(changes))
            .with_metadata("version", json!(after.version)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::ErrorKind;
    use relay_test_utils::assertions::{assert_kind, assert_not_found};
    use relay_test_utils::fixtures::{agent_with_capacity, RelayFixture};
    use relay_test_utils::InMemoryAgentRegistry;
    use relay_storage::InMemoryStorage;

    fn store(fixture: &RelayFixture) -> TaskStore<InMemoryStorage, InMemoryAgentRegistry> {
        TaskStore::new(
            fixture.storage.clone(),
            fixture.registry.clone(),
            fixture.observer.clone(),
            fixture.config.clone(),
        )
    }

    #[test]
    fn test_create_pending_unassigned() {
        let fixture = RelayFixture::new();
        let tasks = store(&fixture);

        let task = tasks
            .create(NewTask {
                title: "Review contract".to_string(),
                priority: TaskPriority::Medium,
                ..Default::default()
            })
            .unwrap();

        assert_eq!(task.status, TaskStatus::Pending);
        assert!(task.assigned_agent_id.is_none());

        let history = tasks.history(task.task_id).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].action, HistoryAction::Created);
        assert!(fixture.observer.saw(EntityType::Task, task.task_id));
    }

    #[test]
    fn test_create_requires_title() {
        let fixture = RelayFixture::new();
        let result = store(&fixture).create(NewTask::new("   "));
        assert_kind(&result, ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_create_with_unknown_assignee_is_not_found() {
        let fixture = RelayFixture::new();
        let result = store(&fixture).create(NewTask {
            assigned_agent_id: Some(relay_core::new_entity_id()),
            ..NewTask::new("t")
        });
        assert_kind(&result, ErrorKind::NotFound);
        assert_eq!(fixture.storage.task_count().unwrap(), 0);
    }

    #[test]
    fn test_create_with_full_assignee_is_exhausted() {
        let fixture = RelayFixture::new();
        let agent = fixture.agent(agent_with_capacity("full", 1));
        let tasks = store(&fixture);

        tasks
            .create(NewTask {
                assigned_agent_id: Some(agent),
                ..NewTask::new("first")
            })
            .unwrap();
        let result = tasks.create(NewTask {
            assigned_agent_id: Some(agent),
            ..NewTask::new("second")
        });
        assert_kind(&result, ErrorKind::ResourceExhausted);
        assert_eq!(fixture.storage.task_count().unwrap(), 1);
    }

    #[test]
    fn test_create_with_missing_parent() {
        let fixture = RelayFixture::new();
        let result = store(&fixture).create(NewTask {
            parent_task_id: Some(relay_core::new_entity_id()),
            ..NewTask::new("child")
        });
        assert_not_found(&result, EntityType::Task);
    }

    #[test]
    fn test_update_status_writes_one_entry_with_changes() {
        let fixture = RelayFixture::new();
        let agent = fixture.agent(agent_with_capacity("a", 2));
        let tasks = store(&fixture);
        let task = tasks.create(NewTask::new("t")).unwrap();

        let updated = tasks
            .update(
                task.task_id,
                TaskUpdate {
                    status: Some(TaskStatus::InProgress),
                    priority: Some(TaskPriority::Urgent),
                    assigned_agent_id: Some(agent),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.status, TaskStatus::InProgress);
        assert_eq!(updated.version, 1);

        let history = tasks.history(task.task_id).unwrap();
        assert_eq!(history.len(), 2);
        let entry = &history[1];
        assert_eq!(entry.action, HistoryAction::Started);
        let fields: Vec<String> = entry.metadata["changes"]
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["field"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(fields, vec!["priority", "status", "assigned_agent_id"]);
    }

    #[test]
    fn test_update_without_tracked_change_writes_no_history() {
        let fixture = RelayFixture::new();
        let tasks = store(&fixture);
        let task = tasks.create(NewTask::new("t")).unwrap();

        let updated = tasks
            .update(
                task.task_id,
                TaskUpdate {
                    title: Some("renamed".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.title, "renamed");
        assert_eq!(tasks.history(task.task_id).unwrap().len(), 1);
    }

    #[test]
    fn test_update_rejects_disallowed_transition() {
        let fixture = RelayFixture::new();
        let tasks = store(&fixture);
        let task = tasks.create(NewTask::new("t")).unwrap();
        tasks
            .update(
                task.task_id,
                TaskUpdate {
                    status: Some(TaskStatus::Completed),
                    ..Default::default()
                },
            )
            .unwrap();

        let result = tasks.update(
            task.task_id,
            TaskUpdate {
                status: Some(TaskStatus::Pending),
                ..Default::default()
            },
        );
        assert_kind(&result, ErrorKind::InvalidArgument);

        let result = tasks.update(
            task.task_id,
            TaskUpdate {
                status: Some(TaskStatus::HandedOff),
                ..Default::default()
            },
        );
        assert_kind(&result, ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_completed_at_survives_reopen() {
        let fixture = RelayFixture::new();
        let tasks = store(&fixture);
        let task = tasks.create(NewTask::new("t")).unwrap();
        let set = |status| TaskUpdate {
            status: Some(status),
            ..Default::default()
        };

        let done = tasks.update(task.task_id, set(TaskStatus::Completed)).unwrap();
        let stamped = done.completed_at;
        assert!(stamped.is_some());

        tasks.update(task.task_id, set(TaskStatus::InProgress)).unwrap();
        let again = tasks.update(task.task_id, set(TaskStatus::Completed)).unwrap();
        assert_eq!(again.completed_at, stamped);
    }

    #[test]
    fn test_update_stale_version_conflicts() {
        let fixture = RelayFixture::new();
        let tasks = store(&fixture);
        let task = tasks.create(NewTask::new("t")).unwrap();
        tasks
            .update(
                task.task_id,
                TaskUpdate {
                    priority: Some(TaskPriority::High),
                    ..Default::default()
                },
            )
            .unwrap();

        let result = tasks.update(
            task.task_id,
            TaskUpdate {
                priority: Some(TaskPriority::Low),
                expected_version: Some(0),
                ..Default::default()
            },
        );
        assert_kind(&result, ErrorKind::Conflict);
        assert_eq!(tasks.get(task.task_id).unwrap().priority, TaskPriority::High);
    }

    #[test]
    fn test_reopen_checks_assignee_capacity() {
        let fixture = RelayFixture::new();
        let agent = fixture.agent(agent_with_capacity("a", 1));
        let tasks = store(&fixture);
        let first = tasks
            .create(NewTask {
                assigned_agent_id: Some(agent),
                ..NewTask::new("first")
            })
            .unwrap();
        tasks
            .update(
                first.task_id,
                TaskUpdate {
                    status: Some(TaskStatus::Completed),
                    ..Default::default()
                },
            )
            .unwrap();
        tasks
            .create(NewTask {
                assigned_agent_id: Some(agent),
                ..NewTask::new("second")
            })
            .unwrap();

        let result = tasks.update(
            first.task_id,
            TaskUpdate {
                status: Some(TaskStatus::InProgress),
                ..Default::default()
            },
        );
        assert_kind(&result, ErrorKind::ResourceExhausted);
    }

    #[test]
    fn test_context_merge_on_update() {
        let fixture = RelayFixture::new();
        let tasks = store(&fixture);
        let mut context = TaskContext::default();
        context.data.insert("site".to_string(), json!({"floor": 2}));
        context.data.insert("owner".to_string(), json!("ops"));
        let task = tasks
            .create(NewTask {
                context,
                ..NewTask::new("t")
            })
            .unwrap();

        let updated = tasks
            .update(
                task.task_id,
                TaskUpdate {
                    context: Some(TaskContextPatch {
                        data: json!({"site": {"wing": "east"}}).as_object().cloned(),
                        ..Default::default()
                    }),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.context.data["site"], json!({"wing": "east"}));
        assert_eq!(updated.context.data["owner"], json!("ops"));
    }

    #[test]
    fn test_list_pagination_and_missing() {
        let fixture = RelayFixture::new();
        let tasks = store(&fixture);
        for i in 0..3 {
            tasks.create(NewTask::new(format!("t{}", i))).unwrap();
        }
        let page = tasks
            .list(TaskFilter {
                limit: Some(2),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(page.len(), 2);

        assert_not_found(&tasks.get(relay_core::new_entity_id()), EntityType::Task);
        assert_not_found(&tasks.history(relay_core::new_entity_id()), EntityType::Task);
    }

    #[test]
    fn test_zero_page_config_still_lists() {
        let fixture = RelayFixture::new().with_config(RelayConfig {
            default_page_size: 0,
            max_page_size: 0,
            ..RelayConfig::default()
        });
        let tasks = store(&fixture);
        let agent = fixture.agent(agent_with_capacity("pager", 2));
        tasks.create(NewTask::new("first")).unwrap();
        tasks
            .create(NewTask {
                assigned_agent_id: Some(agent),
                ..NewTask::new("second")
            })
            .unwrap();

        assert_eq!(tasks.list(TaskFilter::default()).unwrap().len(), 1);
        assert_eq!(tasks.agent_history(agent, None).unwrap().len(), 1);
    }
}
