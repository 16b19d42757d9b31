//! RELAY Agents - Task Assignment and Handoff
//!
//! Services over a shared storage handle and agent registry:
//! - `TaskStore`: task lifecycle, transition table, change history
//! - `AssignmentPolicy`: deterministic ordering of eligible targets
//! - `HandoffCoordinator`: capacity-checked transfer, accept, reject, expiry
//! - `WorkloadView`: per-agent load aggregate

pub mod coordinator;
pub mod policy;
pub mod task_store;
pub mod workload;

pub use coordinator::{AssistanceRequest, HandoffCoordinator, HandoffRequest, EXPIRED_REASON};
pub use policy::{
    collect_candidates, is_eligible, policy_for, AssignmentPolicy, Candidate, LeastLoaded,
    LowestId,
};
pub use task_store::{NewTask, TaskStore, TaskUpdate};
pub use workload::{ensure_capacity, utilization, WorkloadView};
