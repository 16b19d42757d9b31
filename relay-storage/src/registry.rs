//! Agent registry: the read-only view of agents the core consumes.

use relay_core::{
    Agent, AgentError, AgentId, AgentStatus, RelayError, RelayResult, StorageError,
    ValidationError,
};
use std::collections::BTreeMap;
use std::sync::RwLock;

/// Lookup of agents by id.
///
/// The assignment core never writes agents; lifecycle management is owned
/// by whoever implements this trait.
pub trait AgentRegistry: Send + Sync {
    fn agent_get(&self, id: AgentId) -> RelayResult<Option<Agent>>;

    /// All agents, ordered by id.
    fn agent_list(&self) -> RelayResult<Vec<Agent>>;

    /// Get an agent or fail with `NotRegistered`.
    fn agent_require(&self, id: AgentId) -> RelayResult<Agent> {
        self.agent_get(id)?
            .ok_or_else(|| AgentError::NotRegistered { agent_id: id }.into())
    }
}

/// Registry kept in process memory.
#[derive(Debug, Default)]
pub struct InMemoryAgentRegistry {
    agents: RwLock<BTreeMap<AgentId, Agent>>,
}

impl InMemoryAgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an agent.
    pub fn register(&self, agent: Agent) -> RelayResult<Agent> {
        if agent.name.trim().is_empty() {
            return Err(ValidationError::RequiredFieldMissing {
                field: "name".to_string(),
            }
            .into());
        }
        check_capacity(agent.max_concurrent_tasks)?;
        let mut agents = self.agents.write().map_err(|_| poisoned())?;
        agents.insert(agent.agent_id, agent.clone());
        Ok(agent)
    }

    pub fn set_status(&self, id: AgentId, status: AgentStatus) -> RelayResult<Agent> {
        self.modify(id, |agent| agent.status = status)
    }

    /// Change the capacity bound. Existing assignments above the new bound
    /// are kept; the agent just stops receiving new work.
    pub fn set_max_concurrent_tasks(&self, id: AgentId, max: i32) -> RelayResult<Agent> {
        check_capacity(max)?;
        self.modify(id, |agent| agent.max_concurrent_tasks = max)
    }

    pub fn len(&self) -> RelayResult<usize> {
        Ok(self.agents.read().map_err(|_| poisoned())?.len())
    }

    pub fn is_empty(&self) -> RelayResult<bool> {
        Ok(self.len()? == 0)
    }

    fn modify(&self, id: AgentId, f: impl FnOnce(&mut Agent)) -> RelayResult<Agent> {
        let mut agents = self.agents.write().map_err(|_| poisoned())?;
        let agent = agents
            .get_mut(&id)
            .ok_or(AgentError::NotRegistered { agent_id: id })?;
        f(agent);
        Ok(agent.clone())
    }
}

fn check_capacity(max_concurrent_tasks: i32) -> RelayResult<()> {
    if max_concurrent_tasks < 0 {
        return Err(ValidationError::InvalidValue {
            field: "max_concurrent_tasks".to_string(),
            reason: "must not be negative".to_string(),
        }
        .into());
    }
    Ok(())
}

fn poisoned() -> RelayError {
    RelayError::Storage(StorageError::LockPoisoned)
}

impl AgentRegistry for InMemoryAgentRegistry {
    fn agent_get(&self, id: AgentId) -> RelayResult<Option<Agent>> {
        Ok(self.agents.read().map_err(|_| poisoned())?.get(&id).cloned())
    }

    fn agent_list(&self) -> RelayResult<Vec<Agent>> {
        Ok(self
            .agents
            .read()
            .map_err(|_| poisoned())?
            .values()
            .cloned()
            .collect())
    }
}
