//! Delayed destruction of overflow entities.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use slab::Slab;
use tokio::{select, sync::oneshot, time::sleep};
use tracing::debug;

use crate::loader::{EntityHandle, EntityLoader};

/// Schedules destruction of overflow entities after a delay.
///
/// Each scheduled destruction runs as its own timer task, tracked in a slab of cancellation senders keyed by a
/// monotonically increasing token. [`cancel_all`][Self::cancel_all] abandons every pending destruction as a group:
/// pending timers are stopped without firing, they are never forced to complete early.
pub(crate) struct DelayedReclaimer {
    loader: Arc<dyn EntityLoader>,
    pending: Arc<Mutex<Slab<oneshot::Sender<()>>>>,
}

impl DelayedReclaimer {
    /// Creates a new `DelayedReclaimer` destroying entities through the given loader.
    pub fn new(loader: Arc<dyn EntityLoader>) -> Self {
        Self {
            loader,
            pending: Arc::new(Mutex::new(Slab::new())),
        }
    }

    /// Schedules the given entity for destruction after `delay` elapses.
    ///
    /// Must be called within a Tokio runtime.
    pub fn schedule_destroy(&self, handle: EntityHandle, delay: Duration) {
        let (cancel_tx, mut cancel_rx) = oneshot::channel();
        let token = self.pending.lock().unwrap().insert(cancel_tx);

        debug!(?handle, token, delay_secs = delay.as_secs_f64(), "Scheduled overflow entity for destruction.");

        let loader = Arc::clone(&self.loader);
        let pending = Arc::clone(&self.pending);
        tokio::spawn(async move {
            select! {
                _ = &mut cancel_rx => {
                    debug!(?handle, token, "Pending destruction abandoned.");
                }
                _ = sleep(delay) => {
                    let _ = pending.lock().unwrap().try_remove(token);
                    debug!(?handle, token, "Destroying overflow entity.");
                    loader.release(handle);
                }
            }
        });
    }

    /// Abandons all pending destructions.
    pub fn cancel_all(&self) {
        let mut pending = self.pending.lock().unwrap();
        let abandoned = pending.len();
        for cancel_tx in pending.drain() {
            // The timer task may have just fired and gone away; nothing to do then.
            let _ = cancel_tx.send(());
        }

        if abandoned > 0 {
            debug!(abandoned, "Abandoned all pending destructions.");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, Ordering};

    use async_trait::async_trait;
    use tokio::time::advance;

    use super::*;
    use crate::{error::GenericError, loader::TemplateRef};

    #[derive(Default)]
    struct RecordingLoader {
        next_handle: AtomicU64,
        released: Mutex<Vec<EntityHandle>>,
    }

    impl RecordingLoader {
        fn released(&self) -> Vec<EntityHandle> {
            self.released.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl EntityLoader for RecordingLoader {
        async fn instantiate(&self, _template: &TemplateRef, _parent: &str) -> Result<EntityHandle, GenericError> {
            Ok(EntityHandle::from_raw(self.next_handle.fetch_add(1, Ordering::SeqCst)))
        }

        fn release(&self, handle: EntityHandle) {
            self.released.lock().unwrap().push(handle);
        }
    }

    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn destroys_after_delay() {
        let loader = Arc::new(RecordingLoader::default());
        let reclaimer = DelayedReclaimer::new(Arc::clone(&loader) as Arc<dyn EntityLoader>);

        reclaimer.schedule_destroy(EntityHandle::from_raw(42), Duration::from_secs(5));
        settle().await;
        assert!(loader.released().is_empty());

        advance(Duration::from_secs(4)).await;
        settle().await;
        assert!(loader.released().is_empty());

        advance(Duration::from_secs(2)).await;
        settle().await;
        assert_eq!(loader.released(), vec![EntityHandle::from_raw(42)]);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_all_abandons_pending_destructions() {
        let loader = Arc::new(RecordingLoader::default());
        let reclaimer = DelayedReclaimer::new(Arc::clone(&loader) as Arc<dyn EntityLoader>);

        reclaimer.schedule_destroy(EntityHandle::from_raw(1), Duration::from_secs(5));
        reclaimer.schedule_destroy(EntityHandle::from_raw(2), Duration::from_secs(5));
        settle().await;

        reclaimer.cancel_all();

        advance(Duration::from_secs(10)).await;
        settle().await;
        assert!(loader.released().is_empty());
    }
}
