//! Change notification hook.
//!
//! Observers are told which entities a committed operation touched, so that
//! caches and projections can invalidate. They are called after commit and
//! must not fail the operation.

use relay_core::{EntityId, EntityType};

pub trait ChangeObserver: Send + Sync {
    fn entity_changed(&self, entity_type: EntityType, id: EntityId);
}

/// Observer that ignores every change.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl ChangeObserver for NoopObserver {
    fn entity_changed(&self, _entity_type: EntityType, _id: EntityId) {}
}
