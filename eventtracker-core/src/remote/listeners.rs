//! Listener bookkeeping shared by remote store implementations.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::error::RemoteReadError;
use crate::remote::Snapshot;

pub type SnapshotResult = Result<Snapshot, RemoteReadError>;

/// Active listeners of one collection.
///
/// Deliveries go through unbounded channels, so `broadcast` never waits on a
/// slow reader and listeners see snapshots in the order they were broadcast.
#[derive(Debug, Default)]
pub struct ListenerRegistry {
    next_id: AtomicU64,
    senders: Mutex<HashMap<u64, mpsc::UnboundedSender<SnapshotResult>>>,
}

impl ListenerRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a new listener.
    pub fn subscribe(self: &Arc<Self>) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::unbounded_channel();

        if let Ok(mut senders) = self.senders.lock() {
            senders.insert(id, sender);
        }
        debug!(listener = id, "listener registered");

        Subscription {
            id,
            receiver,
            registry: Arc::downgrade(self),
        }
    }

    /// Deliver to a single listener (the initial snapshot on registration).
    pub fn send_to(&self, id: u64, result: SnapshotResult) {
        if let Ok(senders) = self.senders.lock()
            && let Some(sender) = senders.get(&id)
        {
            let _ = sender.send(result);
        }
    }

    /// Deliver to every listener, dropping the ones whose handle is gone.
    pub fn broadcast(&self, result: SnapshotResult) {
        let Ok(mut senders) = self.senders.lock() else {
            return;
        };
        senders.retain(|id, sender| {
            let alive = sender.send(result.clone()).is_ok();
            if !alive {
                trace!(listener = id, "pruning closed listener");
            }
            alive
        });
    }

    /// Drop every listener. Their streams end after draining pending snapshots.
    pub fn clear(&self) {
        if let Ok(mut senders) = self.senders.lock() {
            senders.clear();
        }
    }

    pub fn remove(&self, id: u64) {
        if let Ok(mut senders) = self.senders.lock()
            && senders.remove(&id).is_some()
        {
            debug!(listener = id, "listener removed");
        }
    }

    pub fn len(&self) -> usize {
        self.senders.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Handle to a registered listener.
///
/// Yields snapshots (or read errors) as a [`Stream`]. Cancelling the handle, or
/// dropping it, unregisters the listener.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    receiver: mpsc::UnboundedReceiver<SnapshotResult>,
    registry: Weak<ListenerRegistry>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait for the next delivery. `None` once the listener has been dropped by
    /// the store and everything pending has been read.
    pub async fn next_snapshot(&mut self) -> Option<SnapshotResult> {
        self.receiver.recv().await
    }

    /// Unregister the listener.
    pub fn cancel(self) {
        // Drop does the unregistering.
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.id);
        }
    }
}

impl Stream for Subscription {
    type Item = SnapshotResult;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn snapshot(revision: u64) -> SnapshotResult {
        Ok(Snapshot {
            revision,
            events: Vec::new(),
        })
    }

    #[tokio::test]
    async fn broadcast_reaches_every_listener_in_order() {
        let registry = ListenerRegistry::new();
        let mut a = registry.subscribe();
        let mut b = registry.subscribe();

        registry.broadcast(snapshot(1));
        registry.broadcast(snapshot(2));

        for sub in [&mut a, &mut b] {
            assert_eq!(sub.next_snapshot().await.unwrap().unwrap().revision, 1);
            assert_eq!(sub.next().await.unwrap().unwrap().revision, 2);
        }
    }

    #[tokio::test]
    async fn cancel_unregisters_listener() {
        let registry = ListenerRegistry::new();
        let sub = registry.subscribe();
        assert_eq!(registry.len(), 1);
        sub.cancel();
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn clear_ends_streams_after_pending_items() {
        let registry = ListenerRegistry::new();
        let mut sub = registry.subscribe();
        registry.broadcast(Err(RemoteReadError::PermissionDenied));
        registry.clear();

        assert_eq!(
            sub.next_snapshot().await,
            Some(Err(RemoteReadError::PermissionDenied))
        );
        assert_eq!(sub.next_snapshot().await, None);
    }

    #[tokio::test]
    async fn send_to_targets_one_listener() {
        let registry = ListenerRegistry::new();
        let mut a = registry.subscribe();
        let b = registry.subscribe();
        registry.send_to(a.id(), snapshot(7));
        drop(b);
        assert_eq!(a.next_snapshot().await.unwrap().unwrap().revision, 7);
    }
}
