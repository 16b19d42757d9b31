//! RELAY Test Utilities
//!
//! Centralized test infrastructure for the RELAY workspace:
//! - Proptest generators for entity types
//! - A recording change observer
//! - Test fixtures for common scenarios
//! - Invariant assertions over storage state

pub use relay_storage::{
    AgentRegistry, ChangeObserver, HandoffFilter, InMemoryAgentRegistry, InMemoryStorage,
    NoopObserver, StorageRead, StorageTrait, TaskFilter,
};

pub use relay_core::{
    Agent, AgentError, AgentId, AgentStatus, EntityId, EntityType, ErrorKind, HandoffStatus,
    ProficiencyLevel, RelayConfig, RelayError, RelayResult, StorageError, Task, TaskContext,
    TaskHandoff, TaskId, TaskPriority, TaskStatus, Timestamp,
};

use std::sync::{Arc, Mutex};

// ============================================================================
// RECORDING OBSERVER
// ============================================================================

/// Observer that remembers every change notification, in order.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<(EntityType, EntityId)>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of recorded notifications.
    pub fn events(&self) -> Vec<(EntityType, EntityId)> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn saw(&self, entity_type: EntityType, id: EntityId) -> bool {
        self.events().contains(&(entity_type, id))
    }

    pub fn clear(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }
}

impl ChangeObserver for RecordingObserver {
    fn entity_changed(&self, entity_type: EntityType, id: EntityId) {
        if let Ok(mut events) = self.events.lock() {
            events.push((entity_type, id));
        }
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for generating RELAY entity types.

    use super::*;
    use chrono::Utc;
    use proptest::prelude::*;
    use serde_json::{Map, Value};

    pub fn arb_task_status() -> impl Strategy<Value = TaskStatus> {
        prop_oneof![
            Just(TaskStatus::Pending),
            Just(TaskStatus::InProgress),
            Just(TaskStatus::Completed),
            Just(TaskStatus::Failed),
            Just(TaskStatus::HandedOff),
        ]
    }

    pub fn arb_priority() -> impl Strategy<Value = TaskPriority> {
        prop_oneof![
            Just(TaskPriority::Low),
            Just(TaskPriority::Medium),
            Just(TaskPriority::High),
            Just(TaskPriority::Urgent),
        ]
    }

    pub fn arb_proficiency() -> impl Strategy<Value = ProficiencyLevel> {
        prop_oneof![
            Just(ProficiencyLevel::Beginner),
            Just(ProficiencyLevel::Intermediate),
            Just(ProficiencyLevel::Advanced),
            Just(ProficiencyLevel::Expert),
        ]
    }

    /// Generate a small set of skill names drawn from a fixed vocabulary,
    /// so that generated agents and requirements overlap.
    pub fn arb_skill_set() -> impl Strategy<Value = Vec<String>> {
        prop::sample::subsequence(
            vec![
                "blueprint_analysis",
                "estimating",
                "permits",
                "scheduling",
                "site_survey",
            ],
            0..=3,
        )
        .prop_map(|skills| skills.into_iter().map(String::from).collect())
    }

    pub fn arb_task_context() -> impl Strategy<Value = TaskContext> {
        (
            prop::collection::btree_map("[a-z]{1,8}", any::<i64>(), 0..4),
            arb_skill_set(),
            prop::collection::vec("[a-z ]{1,16}", 0..3),
        )
            .prop_map(|(data, requirements, constraints)| {
                let data: Map<String, Value> =
                    data.into_iter().map(|(k, v)| (k, Value::from(v))).collect();
                TaskContext {
                    data,
                    requirements,
                    constraints,
                    dependencies: Vec::new(),
                }
            })
    }

    /// Generate an active agent with capacity 0..=4 and some skills.
    pub fn arb_agent() -> impl Strategy<Value = Agent> {
        ("[a-z]{3,10}", 0i32..=4, arb_skill_set(), arb_proficiency()).prop_map(
            |(name, max, skills, level)| {
                skills
                    .into_iter()
                    .fold(Agent::new(name, max, Utc::now()), |agent, skill| {
                        agent.with_skill(skill, level)
                    })
            },
        )
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built test fixtures for common testing scenarios.

    use super::*;
    use chrono::Utc;

    /// Active agent with the given capacity and no skills.
    pub fn agent_with_capacity(name: &str, max_concurrent_tasks: i32) -> Agent {
        Agent::new(name, max_concurrent_tasks, Utc::now())
    }

    /// Active agent with the given capacity and skills at intermediate level.
    pub fn agent_with_skills(name: &str, max_concurrent_tasks: i32, skills: &[&str]) -> Agent {
        skills.iter().fold(
            agent_with_capacity(name, max_concurrent_tasks),
            |agent, skill| agent.with_skill(*skill, ProficiencyLevel::Intermediate),
        )
    }

    /// Pending task with no assignee.
    pub fn pending_task(title: &str) -> Task {
        Task::new(title, TaskPriority::Medium, Utc::now())
    }

    /// Context whose requirements name the given skills.
    pub fn context_requiring(skills: &[&str]) -> TaskContext {
        TaskContext {
            requirements: skills.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    /// Shared storage and registry wired the way services expect them.
    #[derive(Debug, Clone)]
    pub struct RelayFixture {
        pub storage: Arc<InMemoryStorage>,
        pub registry: Arc<InMemoryAgentRegistry>,
        pub observer: Arc<RecordingObserver>,
        pub config: RelayConfig,
    }

    impl Default for RelayFixture {
        fn default() -> Self {
            Self::new()
        }
    }

    impl RelayFixture {
        pub fn new() -> Self {
            Self {
                storage: Arc::new(InMemoryStorage::new()),
                registry: Arc::new(InMemoryAgentRegistry::new()),
                observer: Arc::new(RecordingObserver::new()),
                config: RelayConfig::default(),
            }
        }

        pub fn with_config(mut self, config: RelayConfig) -> Self {
            self.config = config;
            self
        }

        /// Register an agent, panicking on failure.
        #[track_caller]
        pub fn agent(&self, agent: Agent) -> AgentId {
            match self.registry.register(agent) {
                Ok(agent) => agent.agent_id,
                Err(e) => panic!("Failed to register agent: {:?}", e),
            }
        }

        /// Insert a task directly, bypassing validation.
        #[track_caller]
        pub fn seed_task(&self, task: Task) -> Task {
            match self.storage.transaction(|tx| tx.task_insert(&task)) {
                Ok(()) => task,
                Err(e) => panic!("Failed to seed task: {:?}", e),
            }
        }

        /// Stored copy of a task, panicking when missing.
        #[track_caller]
        pub fn task(&self, task_id: TaskId) -> Task {
            match self.storage.read(|r| r.task_get(task_id)) {
                Ok(Some(task)) => task,
                other => panic!("Expected task {}, got: {:?}", task_id, other),
            }
        }

        #[track_caller]
        pub fn active_count(&self, agent_id: AgentId) -> i32 {
            match self.storage.read(|r| r.task_count_active(agent_id)) {
                Ok(count) => count,
                Err(e) => panic!("Failed to count active tasks: {:?}", e),
            }
        }
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions for RELAY results and cross-entity invariants.

    use super::*;

    /// Assert that a RelayResult failed with the given error kind.
    #[track_caller]
    pub fn assert_kind<T: std::fmt::Debug>(result: &RelayResult<T>, expected: ErrorKind) {
        match result {
            Err(e) => assert_eq!(e.kind(), expected, "Wrong error kind for {:?}", e),
            Ok(value) => panic!("Expected {:?} error, got Ok({:?})", expected, value),
        }
    }

    /// Assert that a RelayResult is a NotFound storage error for the entity type.
    #[track_caller]
    pub fn assert_not_found<T: std::fmt::Debug>(result: &RelayResult<T>, entity_type: EntityType) {
        match result {
            Err(RelayError::Storage(StorageError::NotFound {
                entity_type: et, ..
            })) => {
                assert_eq!(*et, entity_type, "Wrong entity type in NotFound error");
            }
            other => panic!("Expected NotFound error for {:?}, got: {:?}", entity_type, other),
        }
    }

    /// Assert that no registered agent holds more active tasks than it may.
    ///
    /// Only meaningful when capacities were never lowered below current load.
    #[track_caller]
    pub fn assert_capacity_invariant<S, R>(storage: &S, registry: &R)
    where
        S: StorageTrait,
        R: AgentRegistry + ?Sized,
    {
        let agents = match registry.agent_list() {
            Ok(agents) => agents,
            Err(e) => panic!("Failed to list agents: {:?}", e),
        };
        for agent in agents {
            let active = match storage.read(|r| r.task_count_active(agent.agent_id)) {
                Ok(active) => active,
                Err(e) => panic!("Failed to count active tasks: {:?}", e),
            };
            assert!(
                active <= agent.max_concurrent_tasks.max(0),
                "Agent {} holds {} active tasks, max {}",
                agent.agent_id,
                active,
                agent.max_concurrent_tasks
            );
        }
    }

    /// Assert the handoff invariants over all stored tasks:
    /// - a task has at most one pending handoff
    /// - a task is `handed_off` exactly when it has a pending handoff, and
    ///   is then assigned to that handoff's target
    #[track_caller]
    pub fn assert_handoff_invariant<S: StorageTrait>(storage: &S) {
        let result = storage.read(|r| {
            let tasks = r.task_list(&TaskFilter::default())?;
            let mut violations = Vec::new();
            for task in tasks {
                let pending = r.handoff_list(&HandoffFilter {
                    task_id: Some(task.task_id),
                    status: Some(HandoffStatus::Pending),
                    ..Default::default()
                })?;
                if pending.len() > 1 {
                    violations.push(format!(
                        "task {} has {} pending handoffs",
                        task.task_id,
                        pending.len()
                    ));
                }
                let handed_off = task.status == TaskStatus::HandedOff;
                match pending.first() {
                    Some(h) if !handed_off => violations.push(format!(
                        "task {} is {} with pending handoff {}",
                        task.task_id, task.status, h.handoff_id
                    )),
                    Some(h) if task.assigned_agent_id != Some(h.to_agent_id) => {
                        violations.push(format!(
                            "task {} is not assigned to handoff target {}",
                            task.task_id, h.to_agent_id
                        ))
                    }
                    None if handed_off => violations.push(format!(
                        "task {} is handed_off without a pending handoff",
                        task.task_id
                    )),
                    _ => {}
                }
            }
            Ok(violations)
        });
        match result {
            Ok(violations) => assert!(
                violations.is_empty(),
                "Handoff invariant violated: {:?}",
                violations
            ),
            Err(e) => panic!("Failed to read storage: {:?}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::assertions::*;
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_fixture_registers_and_seeds() {
        let fixture = RelayFixture::new();
        let agent = fixture.agent(agent_with_skills("surveyor", 2, &["site_survey"]));
        let task = fixture.seed_task(pending_task("Survey lot 7").with_assignee(agent));

        assert_eq!(fixture.task(task.task_id).assigned_agent_id, Some(agent));
        assert_eq!(fixture.active_count(agent), 1);
        assert_capacity_invariant(&*fixture.storage, &*fixture.registry);
        assert_handoff_invariant(&*fixture.storage);
    }

    #[test]
    #[should_panic(expected = "active tasks")]
    fn test_capacity_invariant_detects_overload() {
        let fixture = RelayFixture::new();
        let agent = fixture.agent(agent_with_capacity("solo", 1));
        fixture.seed_task(pending_task("a").with_assignee(agent));
        fixture.seed_task(pending_task("b").with_assignee(agent));
        assert_capacity_invariant(&*fixture.storage, &*fixture.registry);
    }

    #[test]
    fn test_recording_observer() {
        let observer = RecordingObserver::new();
        let id = relay_core::new_entity_id();
        observer.entity_changed(EntityType::Task, id);
        assert!(observer.saw(EntityType::Task, id));
        observer.clear();
        assert!(observer.events().is_empty());
    }
}
