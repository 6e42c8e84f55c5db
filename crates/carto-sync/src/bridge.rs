//! Throttled persistence of store-driven aggregates.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use carto_entities::{Entity, EntityStore};
use carto_store::{ConnectionToken, StorageClient, StoreError};

use crate::diff::{diff, diff_removed};
use crate::error::{SyncError, SyncResult};
use crate::snapshot::{SnapshotReceiver, SnapshotStore};
use crate::task::{request_flush, sleep_until, Control, TaskHandle};

/// Default throttle interval.
pub const DEFAULT_THROTTLE: Duration = Duration::from_millis(1000);

/// Tuning of a [`PersistenceBridge`].
#[derive(Clone, Debug)]
pub struct BridgeOptions {
    /// Minimum spacing between two comparisons.
    pub throttle: Duration,
    /// Delete stored entities that the selector no longer returns.
    pub prune_removed: bool,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            throttle: DEFAULT_THROTTLE,
            prune_removed: false,
        }
    }
}

/// Persists the entities a selector picks out of a [`SnapshotStore`].
///
/// On [`watch`](Self::watch) the current snapshot is compared and written
/// before returning. After that, a change notification opens a throttle
/// interval; when it closes, the latest snapshot is compared against what
/// was last written and only entities whose content differs are stored.
pub struct PersistenceBridge<E: Entity> {
    client: Arc<StorageClient>,
    store: EntityStore<E>,
    options: BridgeOptions,
    handle: Mutex<Option<TaskHandle>>,
}

impl<E: Entity> PersistenceBridge<E> {
    pub fn new(client: Arc<StorageClient>, options: BridgeOptions) -> Self {
        Self {
            store: EntityStore::new(Arc::clone(&client)),
            client,
            options,
            handle: Mutex::new(None),
        }
    }

    pub fn options(&self) -> &BridgeOptions {
        &self.options
    }

    /// Start persisting `selector(snapshot)` of `source`.
    ///
    /// Returns once the leading write has been committed. A bridge follows
    /// one source at a time; watching again replaces the previous source.
    pub async fn watch<S, F>(&self, source: &SnapshotStore<S>, selector: F) -> SyncResult<()>
    where
        S: Send + Sync + 'static,
        F: Fn(&S) -> Vec<E> + Send + Sync + 'static,
    {
        self.unwatch().await?;

        let token = self.client.token().ok_or(StoreError::NotConnected)?;
        let snapshots = source.subscribe();

        let mut task = BridgeTask {
            store: self.store.clone(),
            token,
            options: self.options.clone(),
            selector: Box::new(selector),
            saved: BTreeMap::new(),
            deadline: None,
        };
        let written = task.sync(&source.snapshot()).await?;
        info!(store = E::STORE, written, "bridge watching");

        let (control, control_rx) = mpsc::channel(8);
        let handle = TaskHandle {
            control,
            task: tokio::spawn(task.run(snapshots, control_rx)),
        };
        *self.handle.lock().expect("lock poisoned") = Some(handle);
        Ok(())
    }

    /// Stop following the source. No write happens after this returns.
    pub async fn unwatch(&self) -> SyncResult<bool> {
        let handle = self.handle.lock().expect("lock poisoned").take();
        match handle {
            Some(handle) => {
                handle.stop().await?;
                info!(store = E::STORE, "bridge stopped");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Compare and write the latest snapshot now.
    pub async fn flush(&self) -> SyncResult<usize> {
        let control = self
            .handle
            .lock()
            .expect("lock poisoned")
            .as_ref()
            .map(|h| h.control.clone())
            .ok_or_else(|| SyncError::NotWatching(format!("store {}", E::STORE)))?;
        request_flush(&control).await
    }

    pub fn is_watching(&self) -> bool {
        self.handle.lock().expect("lock poisoned").is_some()
    }
}

impl<E: Entity> Drop for PersistenceBridge<E> {
    fn drop(&mut self) {
        if let Ok(Some(handle)) = self.handle.get_mut().map(Option::take) {
            handle.task.abort();
        }
    }
}

impl<E: Entity> std::fmt::Debug for PersistenceBridge<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceBridge")
            .field("store", &E::STORE)
            .field("options", &self.options)
            .field("watching", &self.is_watching())
            .finish()
    }
}

type Selector<S, E> = Box<dyn Fn(&S) -> Vec<E> + Send + Sync>;

struct BridgeTask<S, E: Entity> {
    store: EntityStore<E>,
    token: ConnectionToken,
    options: BridgeOptions,
    selector: Selector<S, E>,
    /// Entities as last written, by key.
    saved: BTreeMap<String, E>,
    deadline: Option<Instant>,
}

impl<S, E> BridgeTask<S, E>
where
    S: Send + Sync + 'static,
    E: Entity,
{
    async fn run(mut self, mut snapshots: SnapshotReceiver<S>, mut control: mpsc::Receiver<Control>) {
        loop {
            tokio::select! {
                biased;

                msg = control.recv() => match msg {
                    Some(Control::Flush(reply)) => {
                        let snapshot = Arc::clone(&snapshots.borrow_and_update());
                        self.deadline = None;
                        let result = self.sync(&snapshot).await;
                        if let Err(err) = &result {
                            self.on_failure(err);
                        }
                        let _ = reply.send(result);
                    }
                    Some(Control::Stop) | None => break,
                },

                changed = snapshots.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    if self.deadline.is_none() {
                        self.deadline = Some(Instant::now() + self.options.throttle);
                    }
                },

                _ = sleep_until(self.deadline) => {
                    self.deadline = None;
                    let snapshot = Arc::clone(&snapshots.borrow_and_update());
                    if let Err(err) = self.sync(&snapshot).await {
                        self.on_failure(&err);
                    }
                }
            }
        }
        debug!(store = E::STORE, "bridge task finished");
    }

    /// Write the entities of `snapshot` that differ from the last write.
    async fn sync(&mut self, snapshot: &S) -> SyncResult<usize> {
        let candidates = (self.selector)(snapshot);
        let changed: Vec<E> = diff(&candidates, &self.saved, E::key)
            .into_iter()
            .cloned()
            .collect();
        let removed = if self.options.prune_removed {
            diff_removed(&candidates, &self.saved, E::key)
        } else {
            Vec::new()
        };
        if changed.is_empty() && removed.is_empty() {
            return Ok(0);
        }

        if !changed.is_empty() {
            self.store.put_all_as(&self.token, &changed).await?;
        }
        for entity in &changed {
            self.saved.insert(entity.key(), entity.clone());
        }
        if !removed.is_empty() {
            self.store.delete_all_as(&self.token, removed.clone()).await?;
            for key in &removed {
                self.saved.remove(key);
            }
        }

        debug!(
            store = E::STORE,
            written = changed.len(),
            removed = removed.len(),
            "bridge write committed"
        );
        Ok(changed.len() + removed.len())
    }

    fn on_failure(&mut self, err: &SyncError) {
        if err.is_disconnect() {
            warn!(store = E::STORE, error = %err, "discarding bridge write against a closed database");
        } else {
            error!(store = E::STORE, error = %err, "bridge write failed, retrying");
            self.deadline = Some(Instant::now() + self.options.throttle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use carto_entities::{connect_project_database, LayoutStore};
    use carto_store::MemoryEngine;
    use carto_types::{Dimensions, Layout, MapView};

    const INTERVAL: Duration = Duration::from_millis(1000);

    #[derive(Clone, Default)]
    struct State {
        layouts: Vec<Layout>,
    }

    fn layouts(state: &State) -> Vec<Layout> {
        state.layouts.clone()
    }

    fn layout(name: &str) -> Layout {
        Layout::new(
            name,
            MapView::default(),
            Dimensions {
                width: 100,
                height: 100,
            },
        )
    }

    struct Fixture {
        engine: Arc<MemoryEngine>,
        layouts: LayoutStore,
        bridge: PersistenceBridge<Layout>,
        client: Arc<StorageClient>,
    }

    async fn fixture(options: BridgeOptions) -> Fixture {
        let engine = Arc::new(MemoryEngine::new());
        let client = Arc::new(StorageClient::new(engine.clone()));
        connect_project_database(&client, "carto-project-p1")
            .await
            .unwrap();
        Fixture {
            engine,
            layouts: LayoutStore::new(Arc::clone(&client)),
            bridge: PersistenceBridge::new(Arc::clone(&client), options),
            client,
        }
    }

    fn throttled() -> BridgeOptions {
        BridgeOptions {
            throttle: INTERVAL,
            prune_removed: false,
        }
    }

    async fn wait(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    fn rename(state: &State, index: usize, name: &str) -> State {
        let mut next = state.clone();
        next.layouts[index].name = name.to_string();
        next
    }

    #[tokio::test(start_paused = true)]
    async fn watch_writes_before_first_interval() {
        let fx = fixture(throttled()).await;
        let source = SnapshotStore::new(State {
            layouts: vec![layout("A4"), layout("A3")],
        });

        let started = Instant::now();
        fx.bridge.watch(&source, layouts).await.unwrap();
        assert!(started.elapsed() < INTERVAL);
        assert_eq!(fx.layouts.count().await.unwrap(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn storm_collapses_to_one_trailing_write() {
        let fx = fixture(throttled()).await;
        let source = SnapshotStore::new(State {
            layouts: vec![layout("A4")],
        });
        fx.bridge.watch(&source, layouts).await.unwrap();
        let id = source.snapshot().layouts[0].id.to_string();

        for i in 0..50 {
            source.dispatch(|s| rename(s, 0, &format!("v{i}")));
            wait(10).await;
        }
        // 500ms into the interval: nothing written yet.
        assert_eq!(fx.layouts.get(&id).await.unwrap().unwrap().name, "A4");

        wait(600).await;
        assert_eq!(fx.layouts.get(&id).await.unwrap().unwrap().name, "v49");
    }

    #[tokio::test(start_paused = true)]
    async fn continuous_change_is_saved_every_interval() {
        let fx = fixture(throttled()).await;
        let source = SnapshotStore::new(State {
            layouts: vec![layout("A4")],
        });
        fx.bridge.watch(&source, layouts).await.unwrap();
        let id = source.snapshot().layouts[0].id.to_string();

        // Changes every 100ms for 2.5s never go unsaved for a full interval.
        let mut last_saved = String::new();
        for i in 0..25 {
            source.dispatch(|s| rename(s, 0, &format!("v{i}")));
            wait(100).await;
            if i == 14 {
                last_saved = fx.layouts.get(&id).await.unwrap().unwrap().name;
            }
        }
        assert_ne!(last_saved, "A4");
    }

    #[tokio::test(start_paused = true)]
    async fn unchanged_content_is_not_rewritten() {
        let fx = fixture(throttled()).await;
        let source = SnapshotStore::new(State {
            layouts: vec![layout("A4")],
        });
        fx.bridge.watch(&source, layouts).await.unwrap();

        // A new snapshot with equal content.
        source.dispatch(|s| s.clone());
        wait(10).await;
        assert_eq!(fx.bridge.flush().await.unwrap(), 0);

        source.dispatch(|s| rename(s, 0, "A5"));
        wait(10).await;
        assert_eq!(fx.bridge.flush().await.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unwatch_cancels_pending_interval() {
        let fx = fixture(throttled()).await;
        let source = SnapshotStore::new(State {
            layouts: vec![layout("A4")],
        });
        fx.bridge.watch(&source, layouts).await.unwrap();
        let id = source.snapshot().layouts[0].id.to_string();

        source.dispatch(|s| rename(s, 0, "changed"));
        wait(100).await;
        assert!(fx.bridge.unwatch().await.unwrap());
        wait(5_000).await;
        assert_eq!(fx.layouts.get(&id).await.unwrap().unwrap().name, "A4");
        assert!(!fx.bridge.is_watching());
    }

    #[tokio::test(start_paused = true)]
    async fn removed_entities_are_kept_by_default() {
        let fx = fixture(throttled()).await;
        let source = SnapshotStore::new(State {
            layouts: vec![layout("A4"), layout("A3")],
        });
        fx.bridge.watch(&source, layouts).await.unwrap();

        source.dispatch(|s| State {
            layouts: s.layouts[..1].to_vec(),
        });
        wait(1_100).await;
        assert_eq!(fx.layouts.count().await.unwrap(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn prune_removed_deletes_dropped_entities() {
        let fx = fixture(BridgeOptions {
            prune_removed: true,
            ..throttled()
        })
        .await;
        let source = SnapshotStore::new(State {
            layouts: vec![layout("A4"), layout("A3")],
        });
        fx.bridge.watch(&source, layouts).await.unwrap();

        source.dispatch(|s| State {
            layouts: s.layouts[..1].to_vec(),
        });
        wait(1_100).await;
        assert_eq!(fx.layouts.count().await.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_write_is_retried() {
        let fx = fixture(throttled()).await;
        let source = SnapshotStore::new(State::default());
        fx.bridge.watch(&source, layouts).await.unwrap();

        fx.engine.set_fail_commits(true);
        source.dispatch(|_| State {
            layouts: vec![layout("A4")],
        });
        wait(1_100).await;
        assert_eq!(fx.layouts.count().await.unwrap(), 0);

        fx.engine.set_fail_commits(false);
        wait(1_000).await;
        assert_eq!(fx.layouts.count().await.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_interval_after_switch_is_discarded() {
        let fx = fixture(throttled()).await;
        let source = SnapshotStore::new(State::default());
        fx.bridge.watch(&source, layouts).await.unwrap();

        source.dispatch(|_| State {
            layouts: vec![layout("A4")],
        });
        wait(100).await;
        connect_project_database(&fx.client, "carto-project-p2")
            .await
            .unwrap();
        wait(2_000).await;
        assert_eq!(fx.layouts.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn flush_without_watch_fails() {
        let fx = fixture(BridgeOptions::default()).await;
        let err = fx.bridge.flush().await.unwrap_err();
        assert!(matches!(err, SyncError::NotWatching(_)));
    }
}
