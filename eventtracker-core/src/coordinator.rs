//! The single owner of the remote store, the local cache and the event list.
//!
//! A coordinator holds exactly one remote subscription. A pump task turns every
//! snapshot into an [`EventsView`] and publishes it on a watch channel; list
//! views, the live watch and the digest each hold a receiver.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::cache::LocalCache;
use crate::error::{LocalStoreError, RemoteReadError, RemoteWriteError, TrackerError, TrackerResult};
use crate::event::{Event, EventDraft, EventField};
use crate::remote::{RemoteStore, Subscription};

/// How remote changes reach the local cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CachePolicy {
    /// The cache is left alone; only `mirror_to_cache` writes to it.
    #[default]
    Detached,
    /// Every snapshot replaces the cache contents.
    Mirror,
}

/// What list consumers see.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventsView {
    /// Revision of the snapshot the events came from
    pub revision: u64,
    /// Remote iteration order (key order, i.e. creation order)
    pub events: Arc<Vec<Event>>,
    /// Last read error. Events stay at the last good snapshot.
    pub error: Option<RemoteReadError>,
    /// Last failure mirroring into the cache
    pub cache_error: Option<LocalStoreError>,
    /// At least one snapshot has arrived
    pub loaded: bool,
}

impl EventsView {
    pub fn get(&self, id: &str) -> Option<&Event> {
        self.events.iter().find(|e| e.id == id)
    }
}

/// Ids deleted through this coordinator whose removal has not shown up in a
/// snapshot yet. Snapshots queued before the removal are published without them.
#[derive(Default)]
struct RemovedIds(Mutex<HashSet<String>>);

impl RemovedIds {
    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Forget ids the snapshot no longer holds and hide the rest.
    fn settle(&self, events: Vec<Event>) -> Vec<Event> {
        let mut removed = self.lock();
        removed.retain(|id| events.iter().any(|e| &e.id == id));
        without(events, &removed)
    }
}

fn without(events: Vec<Event>, removed: &HashSet<String>) -> Vec<Event> {
    if removed.is_empty() {
        return events;
    }
    events.into_iter().filter(|e| !removed.contains(&e.id)).collect()
}

pub struct SyncCoordinator {
    remote: Arc<dyn RemoteStore>,
    cache: Option<LocalCache>,
    view: Arc<watch::Sender<EventsView>>,
    removed: Arc<RemovedIds>,
    pump: Mutex<Option<JoinHandle<()>>>,
    stop: Mutex<Option<oneshot::Sender<()>>>,
}

impl SyncCoordinator {
    /// Subscribe to the remote store and start publishing its snapshots.
    #[instrument(skip_all, fields(policy = ?policy, cache = cache.is_some()))]
    pub async fn start(
        remote: Arc<dyn RemoteStore>,
        cache: Option<LocalCache>,
        policy: CachePolicy,
    ) -> Result<Self, RemoteReadError> {
        let subscription = remote.subscribe().await?;
        let (view, _) = watch::channel(EventsView::default());
        let view = Arc::new(view);
        let (stop_tx, stop_rx) = oneshot::channel();

        let mirror = match policy {
            CachePolicy::Mirror => cache.clone(),
            CachePolicy::Detached => None,
        };
        let removed = Arc::new(RemovedIds::default());
        let pump = tokio::spawn(pump_snapshots(
            subscription,
            view.clone(),
            removed.clone(),
            mirror,
            stop_rx,
        ));
        info!("sync coordinator started");

        Ok(SyncCoordinator {
            remote,
            cache,
            view,
            removed,
            pump: Mutex::new(Some(pump)),
            stop: Mutex::new(Some(stop_tx)),
        })
    }

    /// Write a new event and return it with the id the store assigned.
    #[instrument(skip(self, draft), fields(title = %draft.title))]
    pub async fn add_event(&self, draft: EventDraft) -> Result<Event, RemoteWriteError> {
        let id = self.remote.create(&draft).await?;
        Ok(draft.into_event(id))
    }

    #[instrument(skip(self, value))]
    pub async fn edit_event_field(
        &self,
        id: &str,
        field: EventField,
        value: &str,
    ) -> Result<(), RemoteWriteError> {
        self.remote.update_field(id, field, value).await
    }

    /// Remove an event remotely, then drop it from the list by id. It stays out
    /// of the list even if older snapshots are still on their way.
    #[instrument(skip(self))]
    pub async fn delete_event(&self, id: &str) -> Result<(), RemoteWriteError> {
        self.remote.remove(id).await?;

        let mut removed = self.removed.lock();
        removed.insert(id.to_string());
        self.view.send_if_modified(|view| {
            if view.get(id).is_none() {
                return false;
            }
            let remaining: Vec<Event> = view.events.iter().filter(|e| e.id != id).cloned().collect();
            view.events = Arc::new(remaining);
            true
        });
        Ok(())
    }

    /// Events of the latest snapshot.
    pub fn current_events(&self) -> Arc<Vec<Event>> {
        self.view.borrow().events.clone()
    }

    pub fn view(&self) -> EventsView {
        self.view.borrow().clone()
    }

    /// A receiver that sees every published view.
    pub fn subscribe(&self) -> watch::Receiver<EventsView> {
        self.view.subscribe()
    }

    /// Wait for the first snapshot. Fails if the subscription reported an
    /// error before anything loaded.
    pub async fn ready(&self) -> Result<EventsView, RemoteReadError> {
        let mut receiver = self.subscribe();
        let view = receiver
            .wait_for(|view| view.loaded || view.error.is_some())
            .await
            .map_err(|_| RemoteReadError::Connectivity("coordinator stopped".into()))?
            .clone();

        match (&view.error, view.loaded) {
            (Some(error), false) => Err(error.clone()),
            _ => Ok(view),
        }
    }

    /// Copy the current events into the cache once, whatever the policy.
    #[instrument(skip(self))]
    pub async fn mirror_to_cache(&self) -> TrackerResult<usize> {
        let cache = self
            .cache
            .as_ref()
            .ok_or_else(|| TrackerError::Config("No local cache configured".into()))?;
        let events = self.current_events();
        let count = cache.replace_all(&events).await?;
        debug!(count, "mirrored events into cache");
        Ok(count)
    }

    /// Stop the pump and cancel the remote subscription.
    pub async fn shutdown(&self) {
        let stop = self.stop.lock().ok().and_then(|mut s| s.take());
        if let Some(stop) = stop {
            let _ = stop.send(());
        }

        let pump = self.pump.lock().ok().and_then(|mut p| p.take());
        if let Some(pump) = pump
            && let Err(e) = pump.await
        {
            warn!(error = %e, "snapshot pump ended abnormally");
        }
        info!("sync coordinator stopped");
    }
}

impl Drop for SyncCoordinator {
    fn drop(&mut self) {
        if let Ok(mut pump) = self.pump.lock()
            && let Some(pump) = pump.take()
        {
            pump.abort();
        }
    }
}

async fn pump_snapshots(
    mut subscription: Subscription,
    view: Arc<watch::Sender<EventsView>>,
    removed: Arc<RemovedIds>,
    mirror: Option<LocalCache>,
    mut stop: oneshot::Receiver<()>,
) {
    loop {
        let next = tokio::select! {
            _ = &mut stop => break,
            next = subscription.next_snapshot() => next,
        };

        match next {
            Some(Ok(snapshot)) => {
                let events = removed.settle(snapshot.events);
                let mut cache_error = None;

                if let Some(cache) = &mirror
                    && let Err(e) = cache.replace_all(&events).await
                {
                    warn!(error = %e, "failed to mirror snapshot into cache");
                    cache_error = Some(e);
                }

                // A delete may have landed while the cache was being written.
                let hidden = removed.lock();
                let events = Arc::new(without(events, &hidden));
                debug!(revision = snapshot.revision, count = events.len(), "publishing snapshot");
                view.send_modify(|view| {
                    view.revision = snapshot.revision;
                    view.events = events;
                    view.error = None;
                    view.cache_error = cache_error;
                    view.loaded = true;
                });
                drop(hidden);
            }
            Some(Err(e)) => {
                warn!(error = %e, "remote subscription reported an error");
                view.send_modify(|view| view.error = Some(e));
            }
            None => {
                debug!("remote subscription closed");
                break;
            }
        }
    }

    subscription.cancel();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{AccessRules, RealtimeStore, RootPath};

    fn open_store() -> Arc<RealtimeStore> {
        Arc::new(RealtimeStore::in_memory(RootPath::default(), AccessRules::open()))
    }

    async fn wait_for_count(coordinator: &SyncCoordinator, count: usize) -> EventsView {
        coordinator
            .subscribe()
            .wait_for(|view| view.loaded && view.events.len() == count)
            .await
            .unwrap()
            .clone()
    }

    #[tokio::test]
    async fn create_then_delete_standup() {
        let store = open_store();
        let coordinator = SyncCoordinator::start(store.clone(), None, CachePolicy::Detached)
            .await
            .unwrap();
        assert!(coordinator.ready().await.unwrap().events.is_empty());

        let created = coordinator
            .add_event(EventDraft::new("Standup", "03/05/2024", "9:00AM"))
            .await
            .unwrap();
        assert!(!created.id.is_empty());

        let view = wait_for_count(&coordinator, 1).await;
        assert_eq!(view.events[0], created);

        coordinator.delete_event(&created.id).await.unwrap();
        assert!(coordinator.current_events().iter().all(|e| e.id != created.id));
        wait_for_count(&coordinator, 0).await;

        coordinator.shutdown().await;
        assert_eq!(store.listener_count(), 0);
    }

    #[tokio::test]
    async fn edits_show_up_in_next_view() {
        let coordinator = SyncCoordinator::start(open_store(), None, CachePolicy::Detached)
            .await
            .unwrap();
        let event = coordinator
            .add_event(EventDraft::new("Standup", "03/05/2024", "9:00AM"))
            .await
            .unwrap();

        coordinator
            .edit_event_field(&event.id, EventField::Time, "10:30AM")
            .await
            .unwrap();

        let view = coordinator
            .subscribe()
            .wait_for(|view| view.get(&event.id).is_some_and(|e| e.time == "10:30AM"))
            .await
            .unwrap()
            .clone();
        assert_eq!(view.get(&event.id).unwrap().date, "03/05/2024");
    }

    #[tokio::test]
    async fn list_keeps_creation_order() {
        let coordinator = SyncCoordinator::start(open_store(), None, CachePolicy::Detached)
            .await
            .unwrap();
        let late = coordinator
            .add_event(EventDraft::new("Later", "12/31/2030", "9:00AM"))
            .await
            .unwrap();
        let early = coordinator
            .add_event(EventDraft::new("Sooner", "01/01/2020", "9:00AM"))
            .await
            .unwrap();

        let view = wait_for_count(&coordinator, 2).await;
        let ids: Vec<_> = view.events.iter().map(|e| e.id.clone()).collect();
        assert_eq!(ids, vec![late.id, early.id]);
    }

    #[tokio::test]
    async fn detached_cache_is_untouched_until_mirrored() {
        let cache = LocalCache::open_in_memory(1).await.unwrap();
        let coordinator =
            SyncCoordinator::start(open_store(), Some(cache.clone()), CachePolicy::Detached)
                .await
                .unwrap();
        coordinator
            .add_event(EventDraft::new("Standup", "03/05/2024", "9:00AM"))
            .await
            .unwrap();
        wait_for_count(&coordinator, 1).await;

        assert!(cache.get_events().await.unwrap().is_empty());
        assert_eq!(coordinator.mirror_to_cache().await.unwrap(), 1);
        assert!(cache.get_event("Standup").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn mirror_policy_follows_snapshots() {
        let cache = LocalCache::open_in_memory(1).await.unwrap();
        let coordinator =
            SyncCoordinator::start(open_store(), Some(cache.clone()), CachePolicy::Mirror)
                .await
                .unwrap();
        let event = coordinator
            .add_event(EventDraft::new("Standup", "03/05/2024", "9:00AM"))
            .await
            .unwrap();
        wait_for_count(&coordinator, 1).await;
        assert_eq!(cache.get_events().await.unwrap(), vec![event.clone()]);

        coordinator.delete_event(&event.id).await.unwrap();
        coordinator
            .subscribe()
            .wait_for(|view| view.revision == 2)
            .await
            .unwrap();
        assert!(cache.get_events().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn deleted_event_stays_gone_while_older_snapshots_drain() {
        let coordinator = SyncCoordinator::start(open_store(), None, CachePolicy::Detached)
            .await
            .unwrap();
        let event = coordinator
            .add_event(EventDraft::new("Standup", "03/05/2024", "9:00AM"))
            .await
            .unwrap();
        wait_for_count(&coordinator, 1).await;

        // The edit's snapshot is still queued when the delete returns.
        coordinator
            .edit_event_field(&event.id, EventField::Time, "10:30AM")
            .await
            .unwrap();
        coordinator.delete_event(&event.id).await.unwrap();

        let mut views = coordinator.subscribe();
        for _ in 0..20 {
            assert!(views.borrow_and_update().get(&event.id).is_none());
            tokio::task::yield_now().await;
        }

        let view = views.wait_for(|view| view.revision == 3).await.unwrap().clone();
        assert!(view.events.is_empty());
        assert!(coordinator.removed.lock().is_empty());
    }

    #[tokio::test]
    async fn mirror_without_cache_is_a_config_error() {
        let coordinator = SyncCoordinator::start(open_store(), None, CachePolicy::Detached)
            .await
            .unwrap();
        assert!(matches!(
            coordinator.mirror_to_cache().await,
            Err(TrackerError::Config(_))
        ));
    }

    #[tokio::test]
    async fn start_fails_without_permission() {
        let store = Arc::new(RealtimeStore::in_memory(
            RootPath::default(),
            AccessRules::default(),
        ));
        let result = SyncCoordinator::start(store, None, CachePolicy::Detached).await;
        assert!(matches!(result, Err(RemoteReadError::PermissionDenied)));
    }
}
