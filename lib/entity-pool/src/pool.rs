//! Pool orchestration.

use std::sync::{Arc, Mutex, Weak};

use metrics::{counter, gauge};
use snafu::ensure;
use tracing::{debug, error, warn};

use crate::{
    config::{KindConfig, PoolConfig},
    error::{ConfigError, DuplicateTemplate},
    instance::{EntityState, PooledEntity, ReleaseTarget},
    loader::{EntityHandle, EntityLoader, TemplateRef},
    reclaimer::DelayedReclaimer,
    registry::Registry,
};

/// Continuation invoked with the entity once an acquire request is satisfied.
type ReadyCallback = Box<dyn FnOnce(PooledEntity) + Send + 'static>;

/// One configured kind and its runtime bookkeeping.
struct Kind {
    config: KindConfig,
    state: Mutex<KindState>,
}

/// Mutable per-kind state, guarded by the kind's mutex.
///
/// `live` counts created-and-not-yet-destroyed entities and must equal the registry size after every mutation.
#[derive(Default)]
struct KindState {
    live: usize,
    registry: Registry,
}

struct PoolState {
    name: String,
    loader: Arc<dyn EntityLoader>,
    kinds: Vec<Kind>,
    reclaimer: DelayedReclaimer,
}

/// An object-reuse pool for asynchronously instantiated entities.
///
/// The pool serves acquire requests for a fixed set of configured kinds, each identified by a template reference.
/// A request is satisfied from the kind's registry when an inactive entity exists (same-turn delivery), and otherwise
/// by asking the loader to instantiate a new entity (delivery when the instantiation resolves). Released entities
/// stay registered for reuse, except that entities beyond a kind's capacity are handed to a delayed reclaimer when
/// overflow eviction is enabled for that kind.
///
/// Acquire never blocks: the returned boolean means "kind known and request accepted", and readiness is communicated
/// only through the `on_ready` continuation. Concurrent registry misses for the same kind each trigger their own
/// instantiation; misses are deliberately not coalesced.
///
/// The pool is cheap to clone (clones share state) and safe to use from multiple tasks, but `acquire` and
/// `initialize` spawn onto the current Tokio runtime and must be called within one.
pub struct EntityPool {
    state: Arc<PoolState>,
}

impl EntityPool {
    /// Creates a new `EntityPool` using the given loader and configuration.
    ///
    /// # Errors
    ///
    /// If two configured kinds share the same template reference, an error is returned.
    pub fn new(loader: Arc<dyn EntityLoader>, config: PoolConfig) -> Result<Self, ConfigError> {
        for (idx, kind) in config.kinds.iter().enumerate() {
            ensure!(
                !config.kinds[..idx].iter().any(|other| other.template == kind.template),
                DuplicateTemplate {
                    template: kind.template.clone()
                }
            );
        }

        let reclaimer = DelayedReclaimer::new(Arc::clone(&loader));
        let kinds = config
            .kinds
            .into_iter()
            .map(|config| Kind {
                config,
                state: Mutex::new(KindState::default()),
            })
            .collect();

        Ok(Self {
            state: Arc::new(PoolState {
                name: config.name,
                loader,
                kinds,
                reclaimer,
            }),
        })
    }

    /// Initializes the pool.
    ///
    /// Asks the loader to preload every configured template, and triggers `capacity` instantiations for each kind
    /// configured with preallocation. Preallocated entities are registered inactive: they are pre-warmed for future
    /// acquires, not handed to anyone. Returns immediately; instantiations resolve in the background.
    ///
    /// Must be called within a Tokio runtime.
    pub fn initialize(&self) {
        for (kind_idx, kind) in self.state.kinds.iter().enumerate() {
            let state = Arc::clone(&self.state);
            let template = kind.config.template.clone();
            tokio::spawn(async move {
                if let Err(error) = state.loader.preload(&template).await {
                    warn!(template = %template, %error, "Failed to preload template.");
                }
            });

            if !kind.config.preallocate {
                continue;
            }

            debug!(
                template = %kind.config.template,
                capacity = kind.config.capacity,
                "Preallocating entities."
            );
            for _ in 0..kind.config.capacity {
                self.state.spawn_instantiation(kind_idx, None, false);
            }
        }
    }

    /// Acquires an entity of the kind identified by the given template, fire-and-forget.
    ///
    /// Identical to [`acquire_with`][Self::acquire_with] except that nobody receives the entity: on a registry miss,
    /// the instantiated entity ends up registered and checked out with no holder. Returns `false` if no kind is
    /// configured for the template, with no side effects.
    ///
    /// Must be called within a Tokio runtime.
    pub fn acquire(&self, template: &TemplateRef) -> bool {
        self.do_acquire(template, None)
    }

    /// Acquires an entity of the kind identified by the given template.
    ///
    /// Returns `false` if no kind is configured for the template, with no side effects; `on_ready` is never invoked
    /// in that case. Returns `true` when the request is accepted: if an inactive entity exists in the kind's
    /// registry, `on_ready` is invoked with it before this method returns; otherwise a new instantiation is
    /// triggered and `on_ready` is invoked when it resolves. If the instantiation fails, `on_ready` is never
    /// invoked (the failure is logged and absorbed).
    ///
    /// Must be called within a Tokio runtime.
    pub fn acquire_with<F>(&self, template: &TemplateRef, on_ready: F) -> bool
    where
        F: FnOnce(PooledEntity) + Send + 'static,
    {
        self.do_acquire(template, Some(Box::new(on_ready)))
    }

    /// Shuts down the pool.
    ///
    /// Abandons all pending delayed destructions as a group: overflow entities whose reclaim delay has not yet
    /// elapsed are simply no longer tracked, their destruction never fires. Pending instantiations are unaffected.
    pub fn shutdown(&self) {
        debug!(pool = %self.state.name, "Shutting down pool. Abandoning pending reclamations.");
        self.state.reclaimer.cancel_all();
    }

    /// Returns the number of live (created and not yet destroyed) entities of the given kind.
    ///
    /// Returns `None` if no kind is configured for the template.
    pub fn live_count(&self, template: &TemplateRef) -> Option<usize> {
        self.state
            .find_kind(template)
            .map(|kind| kind.state.lock().unwrap().live)
    }

    /// Returns the number of inactive (pooled, available for reuse) entities of the given kind.
    ///
    /// Returns `None` if no kind is configured for the template.
    pub fn idle_count(&self, template: &TemplateRef) -> Option<usize> {
        self.state
            .find_kind(template)
            .map(|kind| kind.state.lock().unwrap().registry.idle_len())
    }

    fn do_acquire(&self, template: &TemplateRef, on_ready: Option<ReadyCallback>) -> bool {
        let Some(kind_idx) = self
            .state
            .kinds
            .iter()
            .position(|kind| kind.config.template == *template)
        else {
            warn!(template = %template, "No kind configured for template. Request rejected.");
            return false;
        };

        let kind = &self.state.kinds[kind_idx];
        let available = {
            let kind_state = kind.state.lock().unwrap();
            let found = kind_state.registry.try_get_available();
            if let Some(entity) = &found {
                // Activated under the kind lock so a concurrent acquire cannot also find it.
                entity.activate();
            }
            found
        };

        match available {
            Some(entity) => {
                let weak = Arc::downgrade(&self.state);
                let target: Weak<dyn ReleaseTarget> = weak;
                entity.bind_release_target(target);
                self.state.record_acquired(template);
                debug!(template = %template, handle = ?entity.handle(), "Serving entity from pool.");
                if let Some(on_ready) = on_ready {
                    on_ready(PooledEntity::new(entity));
                }
            }
            None => {
                debug!(template = %template, "No pooled entity available. Instantiating.");
                self.state.spawn_instantiation(kind_idx, on_ready, true);
            }
        }

        true
    }
}

impl Clone for EntityPool {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl PoolState {
    fn find_kind(&self, template: &TemplateRef) -> Option<&Kind> {
        self.kinds.iter().find(|kind| kind.config.template == *template)
    }

    fn record_acquired(&self, template: &TemplateRef) {
        let label = template.to_string();
        counter!("entity_pool_acquired", "kind" => label.clone()).increment(1);
        gauge!("entity_pool_in_use", "kind" => label).increment(1.0);
    }

    /// Triggers an asynchronous instantiation for the given kind.
    ///
    /// Each call is an independent request: when it resolves, the new entity is registered, and additionally
    /// activated, bound, and delivered to `on_ready` when `activate` is set. On failure the request is abandoned
    /// with a diagnostic and no state is touched.
    fn spawn_instantiation(self: &Arc<Self>, kind_idx: usize, on_ready: Option<ReadyCallback>, activate: bool) {
        let state = Arc::clone(self);
        let template = self.kinds[kind_idx].config.template.clone();
        tokio::spawn(async move {
            match state.loader.instantiate(&template, &state.name).await {
                Ok(handle) => state.register_instantiated(kind_idx, handle, on_ready, activate),
                Err(error) => {
                    error!(template = %template, %error, "Failed to instantiate entity. Abandoning request.");
                }
            }
        });
    }

    fn register_instantiated(
        self: &Arc<Self>, kind_idx: usize, handle: EntityHandle, on_ready: Option<ReadyCallback>, activate: bool,
    ) {
        let kind = &self.kinds[kind_idx];
        let entity = Arc::new(EntityState::new(handle, kind_idx));

        if activate {
            // Activated before registration so a concurrent acquire cannot check it out from under the requester.
            entity.activate();
            let weak = Arc::downgrade(self);
            let target: Weak<dyn ReleaseTarget> = weak;
            entity.bind_release_target(target);
        }

        {
            let mut kind_state = kind.state.lock().unwrap();
            kind_state.registry.add(Arc::clone(&entity));
            kind_state.live += 1;
            debug_assert_eq!(kind_state.live, kind_state.registry.len());
        }

        debug!(
            template = %kind.config.template,
            ?handle,
            activated = activate,
            "Registered newly instantiated entity."
        );

        if activate {
            self.record_acquired(&kind.config.template);
            if let Some(on_ready) = on_ready {
                on_ready(PooledEntity::new(entity));
            }
        }
    }
}

impl ReleaseTarget for PoolState {
    fn entity_released(&self, entity: &Arc<EntityState>) {
        let kind = &self.kinds[entity.kind_index()];

        // Deactivation shares the kind lock with the capacity check: the registry scan in `do_acquire` must never
        // observe this entity inactive while it is still eligible for eviction.
        let evicted = {
            let mut kind_state = kind.state.lock().unwrap();
            if !entity.deactivate() {
                warn!(handle = ?entity.handle(), "Release of an inactive entity. Ignoring.");
                return;
            }

            if kind_state.live > kind.config.capacity && kind.config.evict_overflow {
                let removed = kind_state.registry.remove(entity);
                if removed {
                    kind_state.live = kind_state.live.checked_sub(1).expect("live entity count underflow");
                }
                debug_assert_eq!(kind_state.live, kind_state.registry.len());
                removed
            } else {
                false
            }
        };

        let label = kind.config.template.to_string();
        counter!("entity_pool_released", "kind" => label.clone()).increment(1);
        gauge!("entity_pool_in_use", "kind" => label.clone()).decrement(1.0);

        if evicted {
            counter!("entity_pool_evicted", "kind" => label).increment(1);
            debug!(
                template = %kind.config.template,
                handle = ?entity.handle(),
                "Evicting overflow entity."
            );
            self.reclaimer
                .schedule_destroy(entity.handle(), kind.config.overflow_lifetime());
        } else {
            debug!(
                template = %kind.config.template,
                handle = ?entity.handle(),
                "Entity returned to pool."
            );
        }
    }
}
