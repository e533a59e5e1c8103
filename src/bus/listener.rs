//! Listener that turns invalidation signals into resyncs.
//!
//! Both transports are merged into one stream. Each envelope is checked
//! against an LRU of recently seen ids (the same emission can reach a tab on
//! more than one path), same-window signals emitted by the target itself are
//! skipped (it already resynced), and irrelevant signals are ignored. Signals
//! that arrive while a resync is running are coalesced into one more resync.

use async_trait::async_trait;
use futures::FutureExt;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use uuid::Uuid;

use super::{BusError, InvalidationBus, SignalEnvelope};

/// Whatever owns the state a signal invalidates.
#[async_trait]
pub trait ResyncTarget: Send + Sync {
    /// Re-fetch and replace all derived state.
    async fn resync_now(&self);

    /// Source id this target stamps on the signals it emits.
    fn source_id(&self) -> Uuid;
}

/// De-duplication and relevance filter.
struct SignalFilter {
    seen: LruCache<Uuid, ()>,
    own_source: Uuid,
}

impl SignalFilter {
    fn new(capacity: usize, own_source: Uuid) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        SignalFilter {
            seen: LruCache::new(capacity),
            own_source,
        }
    }

    /// True if this envelope should trigger a resync.
    fn accept(&mut self, envelope: &SignalEnvelope) -> bool {
        if self.seen.put(envelope.id, ()).is_some() {
            log::debug!("duplicate signal {} ignored", envelope.id);
            return false;
        }
        if !envelope.source.is_nil() && envelope.source == self.own_source {
            return false;
        }
        envelope.signal.invalidates_groups()
    }
}

pub struct InvalidationListener;

impl InvalidationListener {
    /// Subscribe to both transports of `bus` and resync `target` on every
    /// relevant signal until the returned handle is shut down or dropped.
    pub async fn spawn<T>(
        target: Arc<T>,
        bus: &InvalidationBus,
        dedup_capacity: usize,
    ) -> Result<ListenerHandle, BusError>
    where
        T: ResyncTarget + 'static,
    {
        let window = bus.subscribe_window().await?;
        let cross_tab = bus.subscribe_cross_tab().await?;
        let mut merged = futures::stream::select(window, cross_tab);

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let resyncs = Arc::new(AtomicUsize::new(0));
        let counter = resyncs.clone();
        let mut filter = SignalFilter::new(dedup_capacity, target.source_id());

        let task = tokio::spawn(async move {
            loop {
                let envelope = tokio::select! {
                    _ = &mut shutdown_rx => break,
                    next = merged.next() => match next {
                        Some(envelope) => envelope,
                        None => break,
                    },
                };

                if !filter.accept(&envelope) {
                    continue;
                }
                log::debug!("{} received, resyncing", envelope.signal);

                loop {
                    target.resync_now().await;
                    counter.fetch_add(1, Ordering::SeqCst);

                    // Coalesce whatever queued up during the resync
                    let mut pending = false;
                    while let Some(Some(queued)) = merged.next().now_or_never() {
                        pending |= filter.accept(&queued);
                    }
                    if !pending {
                        break;
                    }
                }
            }
            log::debug!("invalidation listener stopped");
        });

        Ok(ListenerHandle {
            task: Some(task),
            shutdown: Some(shutdown_tx),
            resyncs,
        })
    }
}

/// Owns the listener task. Dropping it unsubscribes from both transports.
pub struct ListenerHandle {
    task: Option<JoinHandle<()>>,
    shutdown: Option<oneshot::Sender<()>>,
    resyncs: Arc<AtomicUsize>,
}

impl ListenerHandle {
    /// Number of resyncs this listener has triggered.
    pub fn resync_count(&self) -> usize {
        self.resyncs.load(Ordering::SeqCst)
    }

    /// Stop listening and wait for the task to finish.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
