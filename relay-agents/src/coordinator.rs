//! Handoff coordination.
//!
//! Every operation here reads, validates, and writes inside one storage
//! transaction. The capacity check for the target and the write that claims
//! the slot therefore cannot interleave with another transfer.

use crate::policy::{collect_candidates, policy_for, AssignmentPolicy};
use crate::task_store::require_task;
use crate::workload::{ensure_capacity, WorkloadView};
use chrono::Utc;
use relay_core::{
    Agent, AgentError, AgentId, EntityType, HandoffId, HistoryAction, RelayConfig, RelayError,
    RelayResult, Task, TaskContext, TaskHandoff, TaskHistoryEntry, TaskId, TaskStatus, Timestamp,
    ValidationError,
};
use relay_storage::{AgentRegistry, ChangeObserver, HandoffFilter, StorageRead, StorageTrait, StorageTx};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Rejection reason recorded by the expiry sweep.
pub const EXPIRED_REASON: &str = "expired";

/// Explicit transfer of a task to a named agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandoffRequest {
    pub task_id: TaskId,
    pub from_agent_id: AgentId,
    pub to_agent_id: AgentId,
    pub reason: String,
    /// Defaults to a snapshot of the task's context
    #[serde(default)]
    pub context_transfer: Option<TaskContext>,
}

/// Transfer of a task to whichever eligible agent the policy picks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssistanceRequest {
    pub task_id: TaskId,
    pub reason: String,
    #[serde(default)]
    pub required_skills: Vec<String>,
}

pub struct HandoffCoordinator<S, R> {
    storage: Arc<S>,
    registry: Arc<R>,
    observer: Arc<dyn ChangeObserver>,
    policy: Box<dyn AssignmentPolicy>,
    config: RelayConfig,
}

impl<S, R> HandoffCoordinator<S, R>
where
    S: StorageTrait,
    R: AgentRegistry,
{
    /// Create a coordinator using the policy named by `config.selection_strategy`.
    pub fn new(
        storage: Arc<S>,
        registry: Arc<R>,
        observer: Arc<dyn ChangeObserver>,
        config: RelayConfig,
    ) -> Self {
        let policy = policy_for(config.selection_strategy);
        Self {
            storage,
            registry,
            observer,
            policy,
            config,
        }
    }

    pub fn with_policy(mut self, policy: Box<dyn AssignmentPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    // ========================================================================
    // TRANSFER
    // ========================================================================

    /// Hand a task from its current owner to a named agent.
    pub fn handoff_task(&self, request: HandoffRequest) -> RelayResult<TaskHandoff> {
        require_reason(&request.reason)?;
        if request.from_agent_id == request.to_agent_id {
            return Err(AgentError::SelfHandoff {
                agent_id: request.from_agent_id,
            }
            .into());
        }
        let now = Utc::now();
        let result = self.storage.transaction(|tx| {
            // Read agents at commit time so a capacity change is honored
            self.registry.agent_require(request.from_agent_id)?;
            let target = self.registry.agent_require(request.to_agent_id)?;
            let task = require_task(&*tx, request.task_id)?;
            check_transferable(&task, Some(request.from_agent_id))?;
            commit_handoff(
                tx,
                task,
                request.from_agent_id,
                &target,
                &request.reason,
                request.context_transfer.clone(),
                now,
            )
        });

        self.finish_transfer(request.task_id, result)
    }

    /// Hand a task to the best eligible agent chosen by the selection policy.
    ///
    /// Candidate loads are read in the same transaction as the commit.
    pub fn request_assistance(&self, request: AssistanceRequest) -> RelayResult<TaskHandoff> {
        require_reason(&request.reason)?;

        let now = Utc::now();
        let result = self.storage.transaction(|tx| {
            let task = require_task(&*tx, request.task_id)?;
            let from_agent_id = task.assigned_agent_id.ok_or(AgentError::TaskUnassigned {
                task_id: task.task_id,
            })?;
            check_transferable(&task, None)?;

            let agents = self.registry.agent_list()?;
            let candidates = collect_candidates(
                &*tx,
                agents,
                Some(from_agent_id),
                &request.required_skills,
            )?;
            let considered = candidates.len();
            let selected = self.policy.select(candidates).ok_or_else(|| {
                RelayError::from(AgentError::NoEligibleAgent {
                    task_id: task.task_id,
                    required_skills: request.required_skills.clone(),
                })
            })?;

            debug!(
                task_id = %task.task_id,
                policy = self.policy.name(),
                candidates = considered,
                selected = %selected.agent.agent_id,
                "Assistance target selected"
            );

            commit_handoff(
                tx,
                task,
                from_agent_id,
                &selected.agent,
                &request.reason,
                None,
                now,
            )
        });

        self.finish_transfer(request.task_id, result)
    }

    fn finish_transfer(
        &self,
        task_id: TaskId,
        result: RelayResult<TaskHandoff>,
    ) -> RelayResult<TaskHandoff> {
        match result {
            Ok(handoff) => {
                info!(
                    task_id = %handoff.task_id,
                    handoff_id = %handoff.handoff_id,
                    from_agent_id = %handoff.from_agent_id,
                    to_agent_id = %handoff.to_agent_id,
                    "Task handed off"
                );
                self.notify(&handoff);
                Ok(handoff)
            }
            Err(e) => {
                debug!(task_id = %task_id, error = %e, "Handoff rejected");
                Err(e)
            }
        }
    }

    // ========================================================================
    // RESOLUTION
    // ========================================================================

    /// Accept a pending handoff as its target; the task becomes in_progress.
    pub fn accept_handoff(&self, handoff_id: HandoffId, agent_id: AgentId) -> RelayResult<TaskHandoff> {
        let now = Utc::now();
        let result = self.storage.transaction(|tx| {
            let mut handoff = require_pending_for(&*tx, handoff_id, agent_id)?;
            let mut task = require_task(&*tx, handoff.task_id)?;
            check_not_stale(&task, &handoff)?;

            let version = task.version;
            task.set_status(TaskStatus::InProgress, now);
            tx.task_update(&task, version)?;

            handoff.accept(now);
            tx.handoff_update(&handoff)?;

            let entry = TaskHistoryEntry::new(
                task.task_id,
                Some(agent_id),
                HistoryAction::Started,
                format!("Handoff {} accepted", handoff.handoff_id),
                now,
            )
            .with_metadata("handoff_id", json!(handoff.handoff_id))
            .with_metadata("from_agent_id", json!(handoff.from_agent_id));
            tx.history_append(&entry)?;
            Ok(handoff)
        });

        match result {
            Ok(handoff) => {
                info!(
                    handoff_id = %handoff.handoff_id,
                    task_id = %handoff.task_id,
                    to_agent_id = %agent_id,
                    "Handoff accepted"
                );
                self.notify(&handoff);
                Ok(handoff)
            }
            Err(e) => {
                debug!(handoff_id = %handoff_id, agent_id = %agent_id, error = %e, "Accept rejected");
                Err(e)
            }
        }
    }

    /// Decline a pending handoff as its target; the task goes back to its
    /// previous owner, or is released unassigned if that owner is now full.
    pub fn reject_handoff(
        &self,
        handoff_id: HandoffId,
        agent_id: AgentId,
        reason: Option<String>,
    ) -> RelayResult<TaskHandoff> {
        let now = Utc::now();
        let result = self.storage.transaction(|tx| {
            let handoff = require_pending_for(&*tx, handoff_id, agent_id)?;
            self.commit_rejection(tx, handoff, reason.clone(), Some(agent_id), now)
        });

        match result {
            Ok(handoff) => {
                info!(
                    handoff_id = %handoff.handoff_id,
                    task_id = %handoff.task_id,
                    to_agent_id = %agent_id,
                    "Handoff rejected"
                );
                self.notify(&handoff);
                Ok(handoff)
            }
            Err(e) => {
                debug!(handoff_id = %handoff_id, agent_id = %agent_id, error = %e, "Reject refused");
                Err(e)
            }
        }
    }

    /// Reject every pending handoff older than the configured TTL.
    ///
    /// Each handoff is resolved in its own transaction; one failure is logged
    /// and does not stop the sweep.
    pub fn expire_pending_handoffs(&self, now: Timestamp) -> RelayResult<Vec<TaskHandoff>> {
        let ttl = self.config.handoff_ttl_chrono()?;
        let pending = self.storage.read(|r| {
            r.handoff_list(&HandoffFilter {
                status: Some(relay_core::HandoffStatus::Pending),
                ..Default::default()
            })
        })?;

        let mut expired = Vec::new();
        for candidate in pending.into_iter().filter(|h| h.is_expired(ttl, now)) {
            let handoff_id = candidate.handoff_id;
            let result = self.storage.transaction(|tx| {
                let handoff = tx
                    .handoff_get(handoff_id)?
                    .ok_or_else(|| RelayError::not_found(EntityType::Handoff, handoff_id))?;
                if !handoff.is_expired(ttl, now) {
                    return Ok(None);
                }
                self.commit_rejection(tx, handoff, Some(EXPIRED_REASON.to_string()), None, now)
                    .map(Some)
            });

            match result {
                Ok(Some(handoff)) => {
                    info!(
                        handoff_id = %handoff.handoff_id,
                        task_id = %handoff.task_id,
                        "Pending handoff expired"
                    );
                    self.notify(&handoff);
                    expired.push(handoff);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(handoff_id = %handoff_id, error = %e, "Failed to expire handoff");
                }
            }
        }
        Ok(expired)
    }

    fn commit_rejection(
        &self,
        tx: &mut dyn StorageTx,
        mut handoff: TaskHandoff,
        reason: Option<String>,
        actor: Option<AgentId>,
        now: Timestamp,
    ) -> RelayResult<TaskHandoff> {
        let mut task = require_task(&*tx, handoff.task_id)?;
        check_not_stale(&task, &handoff)?;

        let restored = handoff.previous_task_status;
        let returns_to_owner = if restored.is_active() {
            match self.registry.agent_get(handoff.from_agent_id)? {
                Some(owner) => tx.task_count_active(owner.agent_id)? < owner.max_concurrent_tasks,
                None => false,
            }
        } else {
            true
        };

        let version = task.version;
        if returns_to_owner {
            task.assigned_agent_id = Some(handoff.from_agent_id);
            task.set_status(restored, now);
        } else {
            task.assigned_agent_id = None;
            task.set_status(TaskStatus::Pending, now);
        }
        tx.task_update(&task, version)?;

        handoff.reject(reason, now);
        tx.handoff_update(&handoff)?;

        let details = if returns_to_owner {
            format!(
                "Handoff {} rejected; returned to {}",
                handoff.handoff_id, handoff.from_agent_id
            )
        } else {
            format!(
                "Handoff {} rejected; {} has no free capacity, task released",
                handoff.handoff_id, handoff.from_agent_id
            )
        };
        let entry = TaskHistoryEntry::new(task.task_id, actor, HistoryAction::Assigned, details, now)
            .with_metadata("handoff_id", json!(handoff.handoff_id))
            .with_metadata("rejection_reason", json!(handoff.rejection_reason))
            .with_metadata("assigned_agent_id", json!(task.assigned_agent_id));
        tx.history_append(&entry)?;
        Ok(handoff)
    }

    // ========================================================================
    // QUERIES
    // ========================================================================

    pub fn get_handoff(&self, handoff_id: HandoffId) -> RelayResult<TaskHandoff> {
        self.storage.read(|r| {
            r.handoff_get(handoff_id)?
                .ok_or_else(|| RelayError::not_found(EntityType::Handoff, handoff_id))
        })
    }

    /// All handoffs of a task, oldest first.
    pub fn list_task_handoffs(&self, task_id: TaskId) -> RelayResult<Vec<TaskHandoff>> {
        self.storage.read(|r| {
            require_task(r, task_id)?;
            r.handoff_list(&HandoffFilter::for_task(task_id))
        })
    }

    /// Current workload of an agent.
    pub fn agent_workload(&self, agent_id: AgentId) -> RelayResult<WorkloadView> {
        let agent = self.registry.agent_require(agent_id)?;
        let window = self.config.recent_window_chrono()?;
        let now = Utc::now();
        self.storage
            .read(|r| WorkloadView::compute(r, &agent, window, now))
    }

    fn notify(&self, handoff: &TaskHandoff) {
        self.observer.entity_changed(EntityType::Task, handoff.task_id);
        self.observer
            .entity_changed(EntityType::Handoff, handoff.handoff_id);
    }
}

fn require_reason(reason: &str) -> RelayResult<()> {
    if reason.trim().is_empty() {
        return Err(ValidationError::RequiredFieldMissing {
            field: "reason".to_string(),
        }
        .into());
    }
    Ok(())
}

/// Preconditions shared by both transfer paths.
fn check_transferable(task: &Task, from_agent_id: Option<AgentId>) -> RelayResult<()> {
    if let Some(from) = from_agent_id {
        if task.assigned_agent_id != Some(from) {
            return Err(AgentError::NotTaskOwner {
                task_id: task.task_id,
                agent_id: from,
            }
            .into());
        }
    }
    match task.status {
        TaskStatus::Completed => Err(AgentError::TaskCompleted {
            task_id: task.task_id,
        }
        .into()),
        TaskStatus::HandedOff => Err(AgentError::HandoffPending {
            task_id: task.task_id,
        }
        .into()),
        _ => Ok(()),
    }
}

/// Claim a slot at `target` and move the task there, atomically with the
/// handoff record and its history entry.
fn commit_handoff(
    tx: &mut dyn StorageTx,
    mut task: Task,
    from_agent_id: AgentId,
    target: &Agent,
    reason: &str,
    context_transfer: Option<TaskContext>,
    now: Timestamp,
) -> RelayResult<TaskHandoff> {
    ensure_capacity(&*tx, target)?;

    let context = context_transfer.unwrap_or_else(|| task.context.clone());
    let handoff = TaskHandoff::for_task(&task, from_agent_id, target.agent_id, reason, context, now);

    let version = task.version;
    task.assigned_agent_id = Some(target.agent_id);
    task.set_status(TaskStatus::HandedOff, now);
    tx.task_update(&task, version)?;
    tx.handoff_insert(&handoff)?;

    let entry = TaskHistoryEntry::new(
        task.task_id,
        Some(from_agent_id),
        HistoryAction::HandedOff,
        format!("Handed off to {}: {}", target.agent_id, reason),
        now,
    )
    .with_metadata("handoff_id", json!(handoff.handoff_id))
    .with_metadata("to_agent_id", json!(target.agent_id))
    .with_metadata("previous_status", json!(handoff.previous_task_status));
    tx.history_append(&entry)?;
    Ok(handoff)
}

fn require_pending_for<T>(reader: &T, handoff_id: HandoffId, agent_id: AgentId) -> RelayResult<TaskHandoff>
where
    T: StorageRead + ?Sized,
{
    let handoff = reader
        .handoff_get(handoff_id)?
        .ok_or_else(|| RelayError::not_found(EntityType::Handoff, handoff_id))?;
    if handoff.to_agent_id != agent_id {
        return Err(AgentError::NotHandoffTarget {
            handoff_id,
            agent_id,
        }
        .into());
    }
    if !handoff.is_pending() {
        return Err(AgentError::HandoffNotPending {
            handoff_id,
            status: handoff.status,
        }
        .into());
    }
    Ok(handoff)
}

/// A pending handoff is only actionable while the task still waits on it.
fn check_not_stale(task: &Task, handoff: &TaskHandoff) -> RelayResult<()> {
    let reason = if task.status != TaskStatus::HandedOff {
        format!("task is {}", task.status)
    } else if task.assigned_agent_id != Some(handoff.to_agent_id) {
        "task was reassigned".to_string()
    } else {
        return Ok(());
    };
    Err(AgentError::HandoffStale {
        handoff_id: handoff.handoff_id,
        task_id: task.task_id,
        reason,
    }
    .into())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task_store::{NewTask, TaskStore, TaskUpdate};
    use chrono::Duration;
    use relay_core::{ErrorKind, HandoffStatus, SelectionStrategy};
    use relay_storage::{InMemoryAgentRegistry, InMemoryStorage};
    use relay_test_utils::assertions::{
        assert_capacity_invariant, assert_handoff_invariant, assert_kind,
    };
    use relay_test_utils::fixtures::{agent_with_capacity, agent_with_skills, RelayFixture};

    type Coordinator = HandoffCoordinator<InMemoryStorage, InMemoryAgentRegistry>;
    type Store = TaskStore<InMemoryStorage, InMemoryAgentRegistry>;

    fn services(fixture: &RelayFixture) -> (Store, Coordinator) {
        let store = TaskStore::new(
            fixture.storage.clone(),
            fixture.registry.clone(),
            fixture.observer.clone(),
            fixture.config.clone(),
        );
        let coordinator = HandoffCoordinator::new(
            fixture.storage.clone(),
            fixture.registry.clone(),
            fixture.observer.clone(),
            fixture.config.clone(),
        );
        (store, coordinator)
    }

    fn assigned(store: &Store, agent: AgentId, title: &str) -> Task {
        store
            .create(NewTask {
                assigned_agent_id: Some(agent),
                ..NewTask::new(title)
            })
            .unwrap()
    }

    fn request(task: &Task, from: AgentId, to: AgentId) -> HandoffRequest {
        HandoffRequest {
            task_id: task.task_id,
            from_agent_id: from,
            to_agent_id: to,
            reason: "shift change".to_string(),
            context_transfer: None,
        }
    }

    fn assist(task: &Task, skills: &[&str]) -> AssistanceRequest {
        AssistanceRequest {
            task_id: task.task_id,
            reason: "overloaded".to_string(),
            required_skills: skills.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_handoff_to_agent_with_capacity() {
        let fixture = RelayFixture::new();
        let a = fixture.agent(agent_with_capacity("a", 2));
        let b = fixture.agent(agent_with_capacity("b", 2));
        let (store, coordinator) = services(&fixture);
        let task = assigned(&store, a, "t1");
        assigned(&store, a, "t2");

        let handoff = coordinator.handoff_task(request(&task, a, b)).unwrap();

        assert_eq!(handoff.status, HandoffStatus::Pending);
        assert_eq!(handoff.previous_task_status, TaskStatus::Pending);
        let task = store.get(task.task_id).unwrap();
        assert_eq!(task.status, TaskStatus::HandedOff);
        assert_eq!(task.assigned_agent_id, Some(b));

        let history = store.history(task.task_id).unwrap();
        assert_eq!(history.last().map(|e| e.action), Some(HistoryAction::HandedOff));
        assert!(fixture.observer.saw(EntityType::Handoff, handoff.handoff_id));
        assert_handoff_invariant(&*fixture.storage);
    }

    #[test]
    fn test_handoff_to_full_agent_changes_nothing() {
        let fixture = RelayFixture::new();
        let a = fixture.agent(agent_with_capacity("a", 2));
        let b = fixture.agent(agent_with_capacity("b", 2));
        let (store, coordinator) = services(&fixture);
        let task = assigned(&store, a, "t1");
        assigned(&store, b, "b1");
        assigned(&store, b, "b2");
        let history_before = store.history(task.task_id).unwrap().len();

        let result = coordinator.handoff_task(request(&task, a, b));
        assert_kind(&result, ErrorKind::ResourceExhausted);

        let after = store.get(task.task_id).unwrap();
        assert_eq!(after, task);
        assert_eq!(store.history(task.task_id).unwrap().len(), history_before);
        assert_eq!(fixture.storage.handoff_count().unwrap(), 0);
    }

    #[test]
    fn test_handoff_precondition_failures() {
        let fixture = RelayFixture::new();
        let a = fixture.agent(agent_with_capacity("a", 2));
        let b = fixture.agent(agent_with_capacity("b", 2));
        let c = fixture.agent(agent_with_capacity("c", 2));
        let (store, coordinator) = services(&fixture);
        let task = assigned(&store, a, "t");

        assert_kind(&coordinator.handoff_task(request(&task, c, b)), ErrorKind::InvalidArgument);
        assert_kind(&coordinator.handoff_task(request(&task, a, a)), ErrorKind::InvalidArgument);
        assert_kind(
            &coordinator.handoff_task(request(&task, a, relay_core::new_entity_id())),
            ErrorKind::NotFound,
        );

        let mut missing = task.clone();
        missing.task_id = relay_core::new_entity_id();
        assert_kind(&coordinator.handoff_task(request(&missing, a, b)), ErrorKind::NotFound);

        let mut blank = request(&task, a, b);
        blank.reason = " ".to_string();
        assert_kind(&coordinator.handoff_task(blank), ErrorKind::InvalidArgument);

        store
            .update(
                task.task_id,
                TaskUpdate {
                    status: Some(TaskStatus::Completed),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_kind(&coordinator.handoff_task(request(&task, a, b)), ErrorKind::InvalidArgument);
        assert_eq!(fixture.storage.handoff_count().unwrap(), 0);
    }

    #[test]
    fn test_second_handoff_while_pending_is_refused() {
        let fixture = RelayFixture::new();
        let a = fixture.agent(agent_with_capacity("a", 2));
        let b = fixture.agent(agent_with_capacity("b", 2));
        let c = fixture.agent(agent_with_capacity("c", 2));
        let (store, coordinator) = services(&fixture);
        let task = assigned(&store, a, "t");

        coordinator.handoff_task(request(&task, a, b)).unwrap();
        let result = coordinator.handoff_task(request(&task, b, c));
        assert!(matches!(
            result,
            Err(RelayError::Agent(AgentError::HandoffPending { .. }))
        ));
        assert_handoff_invariant(&*fixture.storage);
    }

    #[test]
    fn test_assistance_selects_only_skilled_agent() {
        let fixture = RelayFixture::new();
        let a = fixture.agent(agent_with_capacity("a", 2));
        fixture.agent(agent_with_skills("b", 5, &["estimating"]));
        let c = fixture.agent(agent_with_skills("c", 2, &["blueprint_analysis"]));
        let (store, coordinator) = services(&fixture);
        let task = assigned(&store, a, "t");

        let handoff = coordinator
            .request_assistance(assist(&task, &["blueprint_analysis"]))
            .unwrap();
        assert_eq!(handoff.to_agent_id, c);
        assert_eq!(handoff.from_agent_id, a);
        assert_eq!(store.get(task.task_id).unwrap().assigned_agent_id, Some(c));
    }

    #[test]
    fn test_assistance_without_candidates() {
        let fixture = RelayFixture::new();
        let a = fixture.agent(agent_with_skills("a", 2, &["permits"]));
        let busy = fixture.agent(agent_with_skills("busy", 1, &["permits"]));
        fixture.agent(agent_with_skills("idle", 2, &["permits"]).with_status(relay_core::AgentStatus::Inactive));
        let (store, coordinator) = services(&fixture);
        let task = assigned(&store, a, "t");
        assigned(&store, busy, "other");

        let result = coordinator.request_assistance(assist(&task, &["permits"]));
        assert_kind(&result, ErrorKind::ResourceExhausted);
        assert_eq!(fixture.storage.handoff_count().unwrap(), 0);
        assert_eq!(store.get(task.task_id).unwrap().status, TaskStatus::Pending);
    }

    #[test]
    fn test_assistance_requires_assignee() {
        let fixture = RelayFixture::new();
        fixture.agent(agent_with_capacity("b", 2));
        let (store, coordinator) = services(&fixture);
        let task = store.create(NewTask::new("unowned")).unwrap();

        let result = coordinator.request_assistance(assist(&task, &[]));
        assert!(matches!(
            result,
            Err(RelayError::Agent(AgentError::TaskUnassigned { .. }))
        ));
    }

    #[test]
    fn test_assistance_prefers_least_loaded() {
        let fixture = RelayFixture::new();
        let a = fixture.agent(agent_with_capacity("a", 2));
        let b = fixture.agent(agent_with_capacity("b", 2));
        let c = fixture.agent(agent_with_capacity("c", 4));
        let (store, coordinator) = services(&fixture);
        let task = assigned(&store, a, "t");
        assigned(&store, b, "b1");
        assigned(&store, c, "c1");

        let handoff = coordinator.request_assistance(assist(&task, &[])).unwrap();
        assert_eq!(handoff.to_agent_id, c);
    }

    #[test]
    fn test_assistance_with_lowest_id_policy() {
        let fixture = RelayFixture::new().with_config(RelayConfig {
            selection_strategy: SelectionStrategy::LowestId,
            ..Default::default()
        });
        let a = fixture.agent(agent_with_capacity("a", 2));
        let b = fixture.agent(agent_with_capacity("b", 2));
        let c = fixture.agent(agent_with_capacity("c", 2));
        let (store, coordinator) = services(&fixture);
        let task = assigned(&store, a, "t");

        let handoff = coordinator.request_assistance(assist(&task, &[])).unwrap();
        assert_eq!(handoff.to_agent_id, b.min(c));
    }

    #[test]
    fn test_accept_moves_task_in_progress() {
        let fixture = RelayFixture::new();
        let a = fixture.agent(agent_with_capacity("a", 2));
        let b = fixture.agent(agent_with_capacity("b", 2));
        let (store, coordinator) = services(&fixture);
        let task = assigned(&store, a, "t");
        let handoff = coordinator.handoff_task(request(&task, a, b)).unwrap();

        let accepted = coordinator.accept_handoff(handoff.handoff_id, b).unwrap();
        assert_eq!(accepted.status, HandoffStatus::Accepted);
        assert!(accepted.completed_at.is_some());

        let task = store.get(task.task_id).unwrap();
        assert_eq!(task.status, TaskStatus::InProgress);
        assert_eq!(task.assigned_agent_id, Some(b));

        let last = store.history(task.task_id).unwrap().pop().unwrap();
        assert_eq!(last.action, HistoryAction::Started);
        assert_eq!(last.agent_id, Some(b));
        assert_handoff_invariant(&*fixture.storage);
    }

    #[test]
    fn test_accept_twice_fails_without_mutation() {
        let fixture = RelayFixture::new();
        let a = fixture.agent(agent_with_capacity("a", 2));
        let b = fixture.agent(agent_with_capacity("b", 2));
        let (store, coordinator) = services(&fixture);
        let task = assigned(&store, a, "t");
        let handoff = coordinator.handoff_task(request(&task, a, b)).unwrap();
        coordinator.accept_handoff(handoff.handoff_id, b).unwrap();

        let task_before = store.get(task.task_id).unwrap();
        let history_before = store.history(task.task_id).unwrap().len();

        let result = coordinator.accept_handoff(handoff.handoff_id, b);
        assert_kind(&result, ErrorKind::InvalidArgument);
        assert_eq!(store.get(task.task_id).unwrap(), task_before);
        assert_eq!(store.history(task.task_id).unwrap().len(), history_before);
    }

    #[test]
    fn test_accept_by_wrong_agent() {
        let fixture = RelayFixture::new();
        let a = fixture.agent(agent_with_capacity("a", 2));
        let b = fixture.agent(agent_with_capacity("b", 2));
        let (store, coordinator) = services(&fixture);
        let task = assigned(&store, a, "t");
        let handoff = coordinator.handoff_task(request(&task, a, b)).unwrap();

        let result = coordinator.accept_handoff(handoff.handoff_id, a);
        assert!(matches!(
            result,
            Err(RelayError::Agent(AgentError::NotHandoffTarget { .. }))
        ));
        assert_kind(
            &coordinator.accept_handoff(relay_core::new_entity_id(), b),
            ErrorKind::NotFound,
        );
    }

    #[test]
    fn test_accept_after_reassignment_conflicts() {
        let fixture = RelayFixture::new();
        let a = fixture.agent(agent_with_capacity("a", 2));
        let b = fixture.agent(agent_with_capacity("b", 2));
        let (store, coordinator) = services(&fixture);
        let task = assigned(&store, a, "t");
        let handoff = coordinator.handoff_task(request(&task, a, b)).unwrap();

        // Simulate a writer that bypassed the coordinator.
        fixture
            .storage
            .transaction(|tx| {
                let mut t = tx.task_get(task.task_id)?.unwrap();
                let version = t.version;
                t.status = TaskStatus::InProgress;
                t.assigned_agent_id = Some(a);
                tx.task_update(&t, version).map(|_| ())
            })
            .unwrap();

        let result = coordinator.accept_handoff(handoff.handoff_id, b);
        assert_kind(&result, ErrorKind::Conflict);
        assert!(coordinator.get_handoff(handoff.handoff_id).unwrap().is_pending());
    }

    #[test]
    fn test_reject_returns_task_to_owner() {
        let fixture = RelayFixture::new();
        let a = fixture.agent(agent_with_capacity("a", 2));
        let b = fixture.agent(agent_with_capacity("b", 2));
        let (store, coordinator) = services(&fixture);
        let task = assigned(&store, a, "t");
        store
            .update(
                task.task_id,
                TaskUpdate {
                    status: Some(TaskStatus::InProgress),
                    ..Default::default()
                },
            )
            .unwrap();
        let handoff = coordinator.handoff_task(request(&task, a, b)).unwrap();

        let rejected = coordinator
            .reject_handoff(handoff.handoff_id, b, Some("no bandwidth".to_string()))
            .unwrap();
        assert_eq!(rejected.status, HandoffStatus::Rejected);
        assert_eq!(rejected.rejection_reason.as_deref(), Some("no bandwidth"));

        let task = store.get(task.task_id).unwrap();
        assert_eq!(task.assigned_agent_id, Some(a));
        assert_eq!(task.status, TaskStatus::InProgress);

        let last = store.history(task.task_id).unwrap().pop().unwrap();
        assert_eq!(last.action, HistoryAction::Assigned);
        assert_kind(
            &coordinator.reject_handoff(handoff.handoff_id, b, None),
            ErrorKind::InvalidArgument,
        );
        assert_handoff_invariant(&*fixture.storage);
    }

    #[test]
    fn test_reject_releases_task_when_owner_is_full() {
        let fixture = RelayFixture::new();
        let a = fixture.agent(agent_with_capacity("a", 1));
        let b = fixture.agent(agent_with_capacity("b", 2));
        let (store, coordinator) = services(&fixture);
        let task = assigned(&store, a, "t");
        let handoff = coordinator.handoff_task(request(&task, a, b)).unwrap();
        assigned(&store, a, "filler");

        coordinator.reject_handoff(handoff.handoff_id, b, None).unwrap();

        let task = store.get(task.task_id).unwrap();
        assert_eq!(task.assigned_agent_id, None);
        assert_eq!(task.status, TaskStatus::Pending);
        assert_capacity_invariant(&*fixture.storage, &*fixture.registry);
    }

    #[test]
    fn test_expire_pending_handoffs() {
        let fixture = RelayFixture::new();
        let a = fixture.agent(agent_with_capacity("a", 2));
        let b = fixture.agent(agent_with_capacity("b", 2));
        let (store, coordinator) = services(&fixture);
        let task = assigned(&store, a, "t");
        let handoff = coordinator.handoff_task(request(&task, a, b)).unwrap();

        let now = Utc::now();
        assert!(coordinator.expire_pending_handoffs(now).unwrap().is_empty());

        let later = now + Duration::hours(1);
        let expired = coordinator.expire_pending_handoffs(later).unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].handoff_id, handoff.handoff_id);
        assert_eq!(expired[0].rejection_reason.as_deref(), Some(EXPIRED_REASON));

        let task = store.get(task.task_id).unwrap();
        assert_eq!(task.assigned_agent_id, Some(a));
        assert_eq!(task.status, TaskStatus::Pending);

        let last = store.history(task.task_id).unwrap().pop().unwrap();
        assert_eq!(last.agent_id, None);
        assert!(coordinator.expire_pending_handoffs(later).unwrap().is_empty());
    }

    #[test]
    fn test_list_task_handoffs_and_workload() {
        let fixture = RelayFixture::new();
        let a = fixture.agent(agent_with_capacity("a", 2));
        let b = fixture.agent(agent_with_capacity("b", 4));
        let (store, coordinator) = services(&fixture);
        let task = assigned(&store, a, "t");
        let first = coordinator.handoff_task(request(&task, a, b)).unwrap();
        coordinator.reject_handoff(first.handoff_id, b, None).unwrap();
        let second = coordinator.handoff_task(request(&task, a, b)).unwrap();

        let handoffs = coordinator.list_task_handoffs(task.task_id).unwrap();
        let ids: Vec<_> = handoffs.iter().map(|h| h.handoff_id).collect();
        assert_eq!(ids, vec![first.handoff_id, second.handoff_id]);

        let workload = coordinator.agent_workload(b).unwrap();
        assert_eq!(workload.active_task_count(), 1);
        assert_eq!(workload.pending_handoffs.len(), 1);
        assert_eq!(workload.capacity_utilization, 0.25);

        assert_kind(
            &coordinator.agent_workload(relay_core::new_entity_id()),
            ErrorKind::NotFound,
        );
    }
}
