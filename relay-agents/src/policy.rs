//! Target selection for request-for-assistance.
//!
//! Candidates are built from the registry and counted against storage inside
//! the caller's transaction; a policy only orders them. Ordering is total so
//! the same state always yields the same pick.

use crate::workload::utilization;
use relay_core::{Agent, AgentId, AgentStatus, RelayResult, SelectionStrategy};
use relay_storage::StorageRead;
use std::cmp::Ordering;
use std::fmt;

/// An eligible agent together with its current load.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub agent: Agent,
    pub active_tasks: i32,
}

impl Candidate {
    pub fn has_capacity(&self) -> bool {
        self.active_tasks < self.agent.max_concurrent_tasks
    }

    pub fn utilization(&self) -> f64 {
        utilization(self.active_tasks, self.agent.max_concurrent_tasks)
    }
}

/// Whether `agent` may receive a task regardless of its load.
pub fn is_eligible(agent: &Agent, exclude: Option<AgentId>, required_skills: &[String]) -> bool {
    agent.status == AgentStatus::Active
        && Some(agent.agent_id) != exclude
        && agent.has_all_skills(required_skills)
}

/// Eligible agents with a free slot, in registry order.
pub fn collect_candidates<T>(
    reader: &T,
    agents: Vec<Agent>,
    exclude: Option<AgentId>,
    required_skills: &[String],
) -> RelayResult<Vec<Candidate>>
where
    T: StorageRead + ?Sized,
{
    let mut candidates = Vec::new();
    for agent in agents {
        if !is_eligible(&agent, exclude, required_skills) {
            continue;
        }
        let active_tasks = reader.task_count_active(agent.agent_id)?;
        let candidate = Candidate {
            agent,
            active_tasks,
        };
        if candidate.has_capacity() {
            candidates.push(candidate);
        }
    }
    Ok(candidates)
}

/// Orders candidates for selection; the first candidate wins.
pub trait AssignmentPolicy: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    fn compare(&self, a: &Candidate, b: &Candidate) -> Ordering;

    fn rank(&self, candidates: &mut [Candidate]) {
        candidates.sort_by(|a, b| self.compare(a, b));
    }

    fn select(&self, mut candidates: Vec<Candidate>) -> Option<Candidate> {
        self.rank(&mut candidates);
        candidates.into_iter().next()
    }
}

/// Lowest utilization first, then fewest active tasks, then lowest id.
#[derive(Debug, Clone, Copy, Default)]
pub struct LeastLoaded;

impl AssignmentPolicy for LeastLoaded {
    fn name(&self) -> &'static str {
        "least_loaded"
    }

    fn compare(&self, a: &Candidate, b: &Candidate) -> Ordering {
        // Compare active/max ratios exactly by cross-multiplying.
        let lhs = i64::from(a.active_tasks) * i64::from(b.agent.max_concurrent_tasks.max(1));
        let rhs = i64::from(b.active_tasks) * i64::from(a.agent.max_concurrent_tasks.max(1));
        lhs.cmp(&rhs)
            .then_with(|| a.active_tasks.cmp(&b.active_tasks))
            .then_with(|| a.agent.agent_id.cmp(&b.agent.agent_id))
    }
}

/// Ascending agent id.
#[derive(Debug, Clone, Copy, Default)]
pub struct LowestId;

impl AssignmentPolicy for LowestId {
    fn name(&self) -> &'static str {
        "lowest_id"
    }

    fn compare(&self, a: &Candidate, b: &Candidate) -> Ordering {
        a.agent.agent_id.cmp(&b.agent.agent_id)
    }
}

pub fn policy_for(strategy: SelectionStrategy) -> Box<dyn AssignmentPolicy> {
    match strategy {
        SelectionStrategy::LeastLoaded => Box::new(LeastLoaded),
        SelectionStrategy::LowestId => Box::new(LowestId),
    }
}
