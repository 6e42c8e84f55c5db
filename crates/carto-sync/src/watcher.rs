//! Debounced write-behind from a live feature collection to the feature store.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use carto_entities::FeatureStore;
use carto_store::{ConnectionToken, StorageClient, StoreError};
use carto_types::{Feature, FeatureId, LayerId};

use crate::collection::{CollectionEvent, CollectionEvents, FeatureCollection};
use crate::error::{SyncError, SyncResult};
use crate::task::{request_flush, sleep_until, Control, TaskHandle};

/// Default batch window.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// Keeps the feature store in step with live [`FeatureCollection`]s.
///
/// Each watched collection gets its own task that buffers mutations and
/// writes them in one batch once no event has arrived for the debounce
/// window. [`unwatch`](Self::unwatch) stops the task without writing the
/// buffer; call [`flush`](Self::flush) first to keep it.
pub struct FeatureWatcher {
    client: Arc<StorageClient>,
    store: FeatureStore,
    debounce: Duration,
    watches: Mutex<HashMap<LayerId, TaskHandle>>,
}

impl FeatureWatcher {
    pub fn new(client: Arc<StorageClient>, debounce: Duration) -> Self {
        Self {
            store: FeatureStore::new(Arc::clone(&client)),
            client,
            debounce,
            watches: Mutex::new(HashMap::new()),
        }
    }

    pub fn debounce(&self) -> Duration {
        self.debounce
    }

    /// Start persisting mutations of `collection` against the currently
    /// connected database.
    ///
    /// The collection is reconciled with what is stored for its layer: any
    /// difference is scheduled like a fresh mutation. Watching a layer that
    /// is already watched replaces the previous watch.
    pub async fn watch(&self, collection: Arc<FeatureCollection>) -> SyncResult<()> {
        let layer_id = collection.layer_id().clone();
        self.unwatch_layer(&layer_id).await?;

        let token = self.client.token().ok_or(StoreError::NotConnected)?;
        let events = collection.subscribe();
        let persisted = self
            .store
            .get_all_by_layer_id(&layer_id)
            .await?
            .into_iter()
            .map(|f| (f.id.clone(), f))
            .collect();

        let mut task = WatchTask {
            collection,
            store: self.store.clone(),
            token,
            debounce: self.debounce,
            pending: BTreeMap::new(),
            persisted,
            deadline: None,
        };
        task.resync();

        let (control, control_rx) = mpsc::channel(8);
        let handle = TaskHandle {
            control,
            task: tokio::spawn(task.run(events, control_rx)),
        };
        self.watches
            .lock()
            .expect("lock poisoned")
            .insert(layer_id.clone(), handle);
        info!(layer = %layer_id, "watching feature collection");
        Ok(())
    }

    /// Stop watching `collection`, dropping any buffered mutation.
    ///
    /// When this returns, the watch task has terminated and will not write.
    pub async fn unwatch(&self, collection: &FeatureCollection) -> SyncResult<bool> {
        self.unwatch_layer(collection.layer_id()).await
    }

    pub async fn unwatch_layer(&self, layer_id: &LayerId) -> SyncResult<bool> {
        let handle = self.watches.lock().expect("lock poisoned").remove(layer_id);
        match handle {
            Some(handle) => {
                handle.stop().await?;
                info!(layer = %layer_id, "stopped watching feature collection");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Stop every watch. Returns how many were running.
    ///
    /// Every task is stopped even if one of them failed; the first failure
    /// is returned.
    pub async fn unwatch_all(&self) -> SyncResult<usize> {
        let handles: Vec<_> = self
            .watches
            .lock()
            .expect("lock poisoned")
            .drain()
            .collect();
        let count = handles.len();
        let mut first = None;
        for (layer_id, handle) in handles {
            if let Err(err) = handle.stop().await {
                error!(layer = %layer_id, error = %err, "watch task failed");
                first.get_or_insert(err);
            }
        }
        match first {
            Some(err) => Err(err),
            None => Ok(count),
        }
    }

    /// Write the buffer of `layer_id` now. Returns the number of features
    /// written or deleted.
    pub async fn flush(&self, layer_id: &LayerId) -> SyncResult<usize> {
        let control = self
            .watches
            .lock()
            .expect("lock poisoned")
            .get(layer_id)
            .map(|h| h.control.clone())
            .ok_or_else(|| SyncError::NotWatching(format!("layer {layer_id}")))?;
        request_flush(&control).await
    }

    /// Flush every watched layer.
    pub async fn flush_all(&self) -> SyncResult<usize> {
        let controls: Vec<_> = self
            .watches
            .lock()
            .expect("lock poisoned")
            .values()
            .map(|h| h.control.clone())
            .collect();
        let mut total = 0;
        for control in controls {
            total += request_flush(&control).await?;
        }
        Ok(total)
    }

    pub fn is_watching(&self, layer_id: &LayerId) -> bool {
        self.watches
            .lock()
            .expect("lock poisoned")
            .contains_key(layer_id)
    }

    pub fn watched(&self) -> Vec<LayerId> {
        let mut layers: Vec<LayerId> = self
            .watches
            .lock()
            .expect("lock poisoned")
            .keys()
            .cloned()
            .collect();
        layers.sort();
        layers
    }
}

impl Drop for FeatureWatcher {
    fn drop(&mut self) {
        if let Ok(watches) = self.watches.get_mut() {
            for (_, handle) in watches.drain() {
                handle.task.abort();
            }
        }
    }
}

impl std::fmt::Debug for FeatureWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureWatcher")
            .field("debounce", &self.debounce)
            .field("watched", &self.watched())
            .finish()
    }
}

#[derive(Clone, Debug, PartialEq)]
enum Pending {
    Put(Feature),
    Delete,
}

struct WatchTask {
    collection: Arc<FeatureCollection>,
    store: FeatureStore,
    token: ConnectionToken,
    debounce: Duration,
    /// Net effect of the mutations since the last successful flush.
    pending: BTreeMap<FeatureId, Pending>,
    /// Normalized features as last written for this layer.
    persisted: HashMap<FeatureId, Feature>,
    deadline: Option<Instant>,
}

impl WatchTask {
    async fn run(mut self, mut events: CollectionEvents, mut control: mpsc::Receiver<Control>) {
        loop {
            tokio::select! {
                biased;

                msg = control.recv() => match msg {
                    Some(Control::Flush(reply)) => {
                        self.drain(&mut events);
                        let result = self.flush().await;
                        if let Err(err) = &result {
                            self.on_failure(err);
                        }
                        let _ = reply.send(result);
                    }
                    Some(Control::Stop) | None => break,
                },

                event = events.recv() => match event {
                    Ok(event) => self.on_event(event),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(layer = %self.collection.layer_id(), skipped, "feature events lagged, resynchronizing");
                        self.resync();
                    }
                    Err(RecvError::Closed) => break,
                },

                _ = sleep_until(self.deadline) => {
                    self.deadline = None;
                    if let Err(err) = self.flush().await {
                        self.on_failure(&err);
                    }
                }
            }
        }
        debug!(
            layer = %self.collection.layer_id(),
            dropped = self.pending.len(),
            "watch task finished"
        );
    }

    /// Apply every event already published, without waiting.
    fn drain(&mut self, events: &mut CollectionEvents) {
        loop {
            match events.try_recv() {
                Ok(event) => self.on_event(event),
                Err(TryRecvError::Lagged(_)) => self.resync(),
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }
    }

    fn arm(&mut self) {
        self.deadline = Some(Instant::now() + self.debounce);
    }

    /// Fold one event into the pending buffer and restart the batch window.
    fn on_event(&mut self, event: CollectionEvent) {
        let changed = match event {
            CollectionEvent::Added(feature) | CollectionEvent::Updated(feature) => {
                self.stage_put(feature.normalized())
            }
            CollectionEvent::Removed(id) => self.stage_delete(id),
        };
        if changed {
            self.arm();
        }
    }

    fn stage_put(&mut self, feature: Feature) -> bool {
        let current = match self.pending.get(&feature.id) {
            Some(Pending::Put(f)) => Some(f),
            Some(Pending::Delete) => None,
            None => self.persisted.get(&feature.id),
        };
        if current == Some(&feature) {
            return false;
        }
        if self.persisted.get(&feature.id) == Some(&feature) {
            self.pending.remove(&feature.id);
        } else {
            self.pending.insert(feature.id.clone(), Pending::Put(feature));
        }
        true
    }

    fn stage_delete(&mut self, id: FeatureId) -> bool {
        if self.persisted.contains_key(&id) {
            self.pending.insert(id, Pending::Delete) != Some(Pending::Delete)
        } else {
            // Never written: the add and the remove cancel out.
            self.pending.remove(&id).is_some()
        }
    }

    /// Rebuild the buffer from the collection's current membership.
    fn resync(&mut self) {
        let live = self.collection.features();
        self.pending.clear();
        for feature in &live {
            let normalized = feature.normalized();
            if self.persisted.get(&normalized.id) != Some(&normalized) {
                self.pending
                    .insert(normalized.id.clone(), Pending::Put(normalized));
            }
        }
        for id in self.persisted.keys() {
            if !live.iter().any(|f| &f.id == id) {
                self.pending.insert(id.clone(), Pending::Delete);
            }
        }
        if !self.pending.is_empty() {
            self.arm();
        }
    }

    async fn flush(&mut self) -> SyncResult<usize> {
        if self.pending.is_empty() {
            return Ok(0);
        }
        let batch = std::mem::take(&mut self.pending);
        let mut puts = Vec::new();
        let mut deletes = Vec::new();
        for (id, op) in &batch {
            match op {
                Pending::Put(feature) => puts.push(feature.clone()),
                Pending::Delete => deletes.push(id.clone()),
            }
        }

        let layer_id = self.collection.layer_id().clone();
        let written = async {
            if !puts.is_empty() {
                self.store
                    .put_all_for_layer_as(&self.token, &layer_id, &puts)
                    .await?;
            }
            if !deletes.is_empty() {
                self.store.delete_all_as(&self.token, &deletes).await?;
            }
            Ok::<_, SyncError>(())
        }
        .await;

        if let Err(err) = written {
            self.pending = batch;
            return Err(err);
        }

        for feature in puts.iter() {
            self.persisted.insert(feature.id.clone(), feature.clone());
        }
        for id in &deletes {
            self.persisted.remove(id);
        }
        debug!(
            layer = %layer_id,
            written = puts.len(),
            deleted = deletes.len(),
            "feature batch flushed"
        );
        Ok(puts.len() + deletes.len())
    }

    fn on_failure(&mut self, err: &SyncError) {
        let layer = self.collection.layer_id();
        if err.is_disconnect() {
            warn!(layer = %layer, error = %err, dropped = self.pending.len(), "discarding flush against a closed database");
            self.pending.clear();
        } else {
            error!(layer = %layer, error = %err, "feature flush failed, retrying");
            self.arm();
        }
    }
}
