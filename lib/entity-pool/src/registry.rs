//! Per-kind live entity registry.

use std::sync::Arc;

use crate::instance::EntityState;

/// Tracking set of the live entities of one kind.
///
/// Holds every created-and-not-yet-destroyed entity of the kind, active or not. Availability lookup scans in
/// insertion order and returns the first inactive entry. The registry tracks entities but has no destruction
/// authority; removal only forgets an entry.
#[derive(Default)]
pub(crate) struct Registry {
    entries: Vec<Arc<EntityState>>,
}

impl Registry {
    /// Returns the first inactive entity in registry order, if any.
    pub fn try_get_available(&self) -> Option<Arc<EntityState>> {
        self.entries.iter().find(|entry| !entry.is_active()).map(Arc::clone)
    }

    /// Adds an entity to the registry.
    pub fn add(&mut self, entity: Arc<EntityState>) {
        debug_assert!(
            !self.entries.iter().any(|entry| Arc::ptr_eq(entry, &entity)),
            "entity registered twice"
        );
        self.entries.push(entity);
    }

    /// Removes an entity from the registry, returning whether it was present.
    ///
    /// Removing a non-member is a no-op.
    pub fn remove(&mut self, entity: &Arc<EntityState>) -> bool {
        match self.entries.iter().position(|entry| Arc::ptr_eq(entry, entity)) {
            Some(idx) => {
                self.entries.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Returns the number of entities in the registry.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns the number of inactive entities in the registry.
    pub fn idle_len(&self) -> usize {
        self.entries.iter().filter(|entry| !entry.is_active()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::EntityHandle;

    fn entity(raw: u64) -> Arc<EntityState> {
        Arc::new(EntityState::new(EntityHandle::from_raw(raw), 0))
    }

    #[test]
    fn first_fit_in_insertion_order() {
        let mut registry = Registry::default();
        let first = entity(1);
        let second = entity(2);
        registry.add(Arc::clone(&first));
        registry.add(Arc::clone(&second));

        let found = registry.try_get_available().unwrap();
        assert!(Arc::ptr_eq(&found, &first));

        first.activate();
        let found = registry.try_get_available().unwrap();
        assert!(Arc::ptr_eq(&found, &second));

        second.activate();
        assert!(registry.try_get_available().is_none());
    }

    #[test]
    fn remove_is_idempotent() {
        let mut registry = Registry::default();
        let tracked = entity(1);
        registry.add(Arc::clone(&tracked));
        assert_eq!(registry.len(), 1);

        assert!(registry.remove(&tracked));
        assert!(!registry.remove(&tracked));
        assert_eq!(registry.len(), 0);

        let stranger = entity(2);
        assert!(!registry.remove(&stranger));
    }

    #[test]
    fn idle_len_tracks_active_flag() {
        let mut registry = Registry::default();
        let first = entity(1);
        let second = entity(2);
        registry.add(Arc::clone(&first));
        registry.add(Arc::clone(&second));
        assert_eq!(registry.idle_len(), 2);

        first.activate();
        assert_eq!(registry.idle_len(), 1);

        first.deactivate();
        assert_eq!(registry.idle_len(), 2);
    }
}
