//! Pooled entity state and release notification binding.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex, Weak,
};

use tracing::warn;

use crate::loader::EntityHandle;

/// A target for release notifications.
///
/// Implemented by the pool: when a checked-out entity is released, the notification travels through the binding held
/// by the entity, not through a direct call on the pool.
pub(crate) trait ReleaseTarget: Send + Sync {
    /// Handles the release of a previously checked-out entity.
    fn entity_released(&self, entity: &Arc<EntityState>);
}

/// Internal state of a pooled entity.
///
/// The kind index is set at creation and never changes, even as the entity cycles between active and inactive. The
/// release binding holds at most one target at a time: it is set when the entity is checked out and taken when the
/// entity is released, which is what makes a second release of the same checkout a detectable no-op.
pub(crate) struct EntityState {
    handle: EntityHandle,
    kind_idx: usize,
    active: AtomicBool,
    release_target: Mutex<Option<Weak<dyn ReleaseTarget>>>,
}

impl EntityState {
    /// Creates a new, inactive `EntityState` belonging to the given kind.
    pub fn new(handle: EntityHandle, kind_idx: usize) -> Self {
        Self {
            handle,
            kind_idx,
            active: AtomicBool::new(false),
            release_target: Mutex::new(None),
        }
    }

    /// Returns the loader handle for this entity.
    pub fn handle(&self) -> EntityHandle {
        self.handle
    }

    /// Returns the index of the kind this entity belongs to.
    pub fn kind_index(&self) -> usize {
        self.kind_idx
    }

    /// Returns `true` if the entity is currently checked out.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Marks the entity as checked out.
    pub fn activate(&self) {
        self.active.store(true, Ordering::Release);
    }

    /// Marks the entity as available, returning whether it was checked out.
    pub fn deactivate(&self) -> bool {
        self.active.swap(false, Ordering::AcqRel)
    }

    /// Binds the release notification target for the current checkout.
    pub fn bind_release_target(&self, target: Weak<dyn ReleaseTarget>) {
        let previous = self.release_target.lock().unwrap().replace(target);
        debug_assert!(previous.is_none(), "entity checked out while already bound");
    }

    /// Takes the release notification target, leaving the entity unbound.
    pub fn take_release_target(&self) -> Option<Weak<dyn ReleaseTarget>> {
        self.release_target.lock().unwrap().take()
    }
}

/// A checked-out pooled entity.
///
/// Handed to the caller's `on_ready` continuation by [`EntityPool::acquire_with`][crate::pool::EntityPool::acquire_with].
/// The entity itself is the release entry point: call [`release`][Self::release] to return it to its pool. Dropping a
/// `PooledEntity` without releasing it leaves the underlying entity checked out forever.
pub struct PooledEntity {
    state: Arc<EntityState>,
}

impl PooledEntity {
    pub(crate) fn new(state: Arc<EntityState>) -> Self {
        Self { state }
    }

    /// Returns the loader handle for this entity.
    pub fn handle(&self) -> EntityHandle {
        self.state.handle()
    }

    /// Returns `true` if the entity is currently checked out.
    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    /// Returns the entity to its pool.
    ///
    /// Notifies the pool through the release binding established at checkout. Releasing an entity that is not
    /// currently checked out (double release, or an entity never handed out) is a no-op with a warning diagnostic.
    pub fn release(&self) {
        match self.state.take_release_target().and_then(|target| target.upgrade()) {
            Some(target) => target.entity_released(&self.state),
            None => warn!(
                handle = ?self.state.handle(),
                "Release of an entity that is not checked out. Ignoring."
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    #[derive(Default)]
    struct RecordingTarget {
        releases: AtomicUsize,
    }

    impl ReleaseTarget for RecordingTarget {
        fn entity_released(&self, entity: &Arc<EntityState>) {
            entity.deactivate();
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn release_notifies_bound_target_once() {
        let target = Arc::new(RecordingTarget::default());
        let state = Arc::new(EntityState::new(EntityHandle::from_raw(1), 0));

        state.activate();
        let weak = Arc::downgrade(&target);
        let bound: Weak<dyn ReleaseTarget> = weak;
        state.bind_release_target(bound);

        let entity = PooledEntity::new(Arc::clone(&state));
        entity.release();
        assert_eq!(target.releases.load(Ordering::SeqCst), 1);
        assert!(!state.is_active());

        // Second release finds no binding and must not notify again.
        entity.release();
        assert_eq!(target.releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn release_without_binding_is_noop() {
        let state = Arc::new(EntityState::new(EntityHandle::from_raw(2), 3));
        let entity = PooledEntity::new(Arc::clone(&state));

        entity.release();
        assert!(!state.is_active());
        assert_eq!(state.kind_index(), 3);
    }
}
