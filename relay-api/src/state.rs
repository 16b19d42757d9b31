//! Shared application state for Axum routers.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::FromRef;
use relay_agents::{HandoffCoordinator, TaskStore};
use relay_core::RelayConfig;
use relay_storage::{ChangeObserver, InMemoryAgentRegistry, InMemoryStorage};

use crate::telemetry::MetricsObserver;

/// Task store over the in-process storage and registry.
pub type ApiTaskStore = TaskStore<InMemoryStorage, InMemoryAgentRegistry>;

/// Handoff coordinator over the in-process storage and registry.
pub type ApiCoordinator = HandoffCoordinator<InMemoryStorage, InMemoryAgentRegistry>;

/// Application-wide state shared across all routes.
#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<InMemoryStorage>,
    pub registry: Arc<InMemoryAgentRegistry>,
    pub tasks: Arc<ApiTaskStore>,
    pub handoffs: Arc<ApiCoordinator>,
    pub start_time: Instant,
}

impl AppState {
    /// Fresh state whose committed changes are counted in Prometheus.
    pub fn new(config: RelayConfig) -> Self {
        Self::with_observer(config, Arc::new(MetricsObserver))
    }

    pub fn with_observer(config: RelayConfig, observer: Arc<dyn ChangeObserver>) -> Self {
        let storage = Arc::new(InMemoryStorage::new());
        let registry = Arc::new(InMemoryAgentRegistry::new());
        let tasks = Arc::new(TaskStore::new(
            storage.clone(),
            registry.clone(),
            observer.clone(),
            config.clone(),
        ));
        let handoffs = Arc::new(HandoffCoordinator::new(
            storage.clone(),
            registry.clone(),
            observer,
            config,
        ));
        Self {
            storage,
            registry,
            tasks,
            handoffs,
            start_time: Instant::now(),
        }
    }
}

macro_rules! impl_from_ref {
    ($ty:ty, $field:ident) => {
        impl FromRef<AppState> for $ty {
            fn from_ref(state: &AppState) -> Self {
                state.$field.clone()
            }
        }
    };
}

impl_from_ref!(Arc<InMemoryStorage>, storage);
impl_from_ref!(Arc<InMemoryAgentRegistry>, registry);
impl_from_ref!(Arc<ApiTaskStore>, tasks);
impl_from_ref!(Arc<ApiCoordinator>, handoffs);
impl_from_ref!(Instant, start_time);
