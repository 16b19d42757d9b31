//! Handoff Expiry Background Task
//!
//! Periodically rejects pending handoffs whose `created_at + handoff_ttl`
//! has passed. Each expired handoff is resolved in its own transaction by the
//! coordinator, with the same semantics as a rejection by the target, so a
//! handoff that was accepted or rejected concurrently is simply skipped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use relay_agents::HandoffCoordinator;
use relay_storage::{AgentRegistry, StorageTrait};
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

use crate::config::{ApiConfig, DEFAULT_HANDOFF_SWEEP_INTERVAL_SECS};
use crate::telemetry::metrics::with_metrics;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Configuration for the handoff expiry task.
#[derive(Debug, Clone)]
pub struct HandoffExpiryConfig {
    /// How often to look for expired handoffs (default: 60 seconds)
    pub check_interval: Duration,

    /// Whether to log each expired handoff (default: true)
    pub log_expirations: bool,
}

impl Default for HandoffExpiryConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(DEFAULT_HANDOFF_SWEEP_INTERVAL_SECS),
            log_expirations: true,
        }
    }
}

impl From<&ApiConfig> for HandoffExpiryConfig {
    fn from(config: &ApiConfig) -> Self {
        Self {
            check_interval: config.handoff_sweep_interval,
            ..Self::default()
        }
    }
}

// ============================================================================
// METRICS
// ============================================================================

/// Counters for expiry activity since the task started.
#[derive(Debug, Default)]
pub struct HandoffExpiryMetrics {
    pub handoffs_expired: AtomicU64,
    pub sweep_cycles: AtomicU64,
    pub sweep_errors: AtomicU64,
}

impl HandoffExpiryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> HandoffExpirySnapshot {
        HandoffExpirySnapshot {
            handoffs_expired: self.handoffs_expired.load(Ordering::Relaxed),
            sweep_cycles: self.sweep_cycles.load(Ordering::Relaxed),
            sweep_errors: self.sweep_errors.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of expiry metrics at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandoffExpirySnapshot {
    pub handoffs_expired: u64,
    pub sweep_cycles: u64,
    pub sweep_errors: u64,
}

// ============================================================================
// BACKGROUND TASK
// ============================================================================

/// Background task that periodically expires stale handoffs.
///
/// Runs until the shutdown signal is received and returns the metrics
/// collected during its lifetime.
pub async fn handoff_expiry_task<S, R>(
    coordinator: Arc<HandoffCoordinator<S, R>>,
    config: HandoffExpiryConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Arc<HandoffExpiryMetrics>
where
    S: StorageTrait,
    R: AgentRegistry,
{
    let metrics = Arc::new(HandoffExpiryMetrics::new());

    let mut sweep_interval = interval(config.check_interval);
    sweep_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(
        check_interval_secs = config.check_interval.as_secs(),
        handoff_ttl_secs = coordinator.config().handoff_ttl.as_secs(),
        "Handoff expiry task started"
    );

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                // A dropped sender also means shutdown
                if changed.is_err() || *shutdown_rx.borrow() {
                    tracing::info!("Handoff expiry task shutting down");
                    break;
                }
            }

            _ = sweep_interval.tick() => {
                run_sweep(&coordinator, &config, &metrics);
            }
        }
    }

    let snapshot = metrics.snapshot();
    tracing::info!(
        handoffs_expired = snapshot.handoffs_expired,
        sweep_cycles = snapshot.sweep_cycles,
        sweep_errors = snapshot.sweep_errors,
        "Handoff expiry task completed"
    );

    metrics
}

/// Perform one expiry sweep, returning how many handoffs were expired.
pub fn run_sweep<S, R>(
    coordinator: &HandoffCoordinator<S, R>,
    config: &HandoffExpiryConfig,
    metrics: &HandoffExpiryMetrics,
) -> u64
where
    S: StorageTrait,
    R: AgentRegistry,
{
    metrics.sweep_cycles.fetch_add(1, Ordering::Relaxed);

    let expired = match coordinator.expire_pending_handoffs(Utc::now()) {
        Ok(expired) => expired,
        Err(e) => {
            tracing::error!(error = %e, "Failed to expire pending handoffs");
            metrics.sweep_errors.fetch_add(1, Ordering::Relaxed);
            with_metrics(|m| m.record_sweep_error());
            return 0;
        }
    };

    if config.log_expirations {
        for handoff in &expired {
            tracing::warn!(
                handoff_id = %handoff.handoff_id,
                task_id = %handoff.task_id,
                to_agent_id = %handoff.to_agent_id,
                "Expired pending handoff"
            );
        }
    }

    let count = expired.len() as u64;
    if count > 0 {
        metrics.handoffs_expired.fetch_add(count, Ordering::Relaxed);
        with_metrics(|m| m.record_expired_handoffs(expired.len()));
        tracing::info!(handoffs = count, "Handoff expiry cycle completed");
    } else {
        tracing::trace!("Handoff expiry cycle completed with no expired handoffs");
    }
    count
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ApiCoordinator;
    use relay_agents::HandoffRequest;
    use relay_core::{HandoffStatus, RelayConfig, TaskStatus};
    use relay_test_utils::fixtures::{agent_with_capacity, pending_task, RelayFixture};

    /// Fixture with a TTL short enough that a handoff is expired right away.
    fn fixture_with_pending_handoff() -> (RelayFixture, Arc<ApiCoordinator>, uuid::Uuid) {
        let fixture = RelayFixture::new().with_config(RelayConfig {
            handoff_ttl: Duration::from_millis(1),
            ..RelayConfig::default()
        });
        let owner = fixture.agent(agent_with_capacity("owner", 2));
        let target = fixture.agent(agent_with_capacity("target", 2));
        let mut task = pending_task("estimate roof");
        task.assigned_agent_id = Some(owner);
        let task = fixture.seed_task(task);

        let coordinator = Arc::new(HandoffCoordinator::new(
            fixture.storage.clone(),
            fixture.registry.clone(),
            fixture.observer.clone(),
            fixture.config.clone(),
        ));
        let handoff = coordinator
            .handoff_task(HandoffRequest {
                task_id: task.task_id,
                from_agent_id: owner,
                to_agent_id: target,
                reason: "going on leave".to_string(),
                context_transfer: None,
            })
            .unwrap();
        std::thread::sleep(Duration::from_millis(5));
        (fixture, coordinator, handoff.handoff_id)
    }

    #[test]
    fn test_config_default() {
        let config = HandoffExpiryConfig::default();
        assert_eq!(
            config.check_interval,
            Duration::from_secs(DEFAULT_HANDOFF_SWEEP_INTERVAL_SECS)
        );
        assert!(config.log_expirations);
    }

    #[test]
    fn test_config_from_api_config() {
        let api = ApiConfig {
            handoff_sweep_interval: Duration::from_secs(7),
            ..ApiConfig::default()
        };
        assert_eq!(
            HandoffExpiryConfig::from(&api).check_interval,
            Duration::from_secs(7)
        );
    }

    #[test]
    fn test_sweep_expires_and_counts() {
        let (fixture, coordinator, handoff_id) = fixture_with_pending_handoff();
        let metrics = HandoffExpiryMetrics::new();

        let expired = run_sweep(&coordinator, &HandoffExpiryConfig::default(), &metrics);
        assert_eq!(expired, 1);

        let handoff = coordinator.get_handoff(handoff_id).unwrap();
        assert_eq!(handoff.status, HandoffStatus::Rejected);
        let task = fixture.task(handoff.task_id);
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.assigned_agent_id, Some(handoff.from_agent_id));

        // Already resolved; a second sweep finds nothing
        assert_eq!(
            run_sweep(&coordinator, &HandoffExpiryConfig::default(), &metrics),
            0
        );
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.handoffs_expired, 1);
        assert_eq!(snapshot.sweep_cycles, 2);
        assert_eq!(snapshot.sweep_errors, 0);
    }

    #[tokio::test]
    async fn test_task_sweeps_then_stops_on_shutdown() {
        let (_fixture, coordinator, handoff_id) = fixture_with_pending_handoff();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let config = HandoffExpiryConfig {
            check_interval: Duration::from_millis(10),
            log_expirations: false,
        };

        let handle = tokio::spawn(handoff_expiry_task(coordinator.clone(), config, shutdown_rx));
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown_tx.send(true).unwrap();

        let metrics = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("task did not stop")
            .unwrap();
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.handoffs_expired, 1);
        assert!(snapshot.sweep_cycles >= 1);
        assert_eq!(
            coordinator.get_handoff(handoff_id).unwrap().status,
            HandoffStatus::Rejected
        );
    }
}
