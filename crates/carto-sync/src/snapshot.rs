use std::sync::Arc;

use tokio::sync::watch;

/// Receiver of snapshot notifications.
pub type SnapshotReceiver<S> = watch::Receiver<Arc<S>>;

/// A minimal reactive store holding an immutable snapshot.
///
/// Every [`dispatch`](Self::dispatch) produces a new snapshot and notifies
/// subscribers. Subscribers only ever see the latest snapshot; intermediate
/// ones may be skipped.
pub struct SnapshotStore<S> {
    sender: watch::Sender<Arc<S>>,
}

impl<S> SnapshotStore<S> {
    pub fn new(initial: S) -> Self {
        let (sender, _) = watch::channel(Arc::new(initial));
        Self { sender }
    }

    /// The current snapshot.
    pub fn snapshot(&self) -> Arc<S> {
        Arc::clone(&self.sender.borrow())
    }

    /// Replace the snapshot with `reducer(current)`.
    pub fn dispatch<F>(&self, reducer: F)
    where
        F: FnOnce(&S) -> S,
    {
        self.sender.send_modify(|state| {
            let next = reducer(state);
            *state = Arc::new(next);
        });
    }

    /// Replace the snapshot outright.
    pub fn replace(&self, state: S) {
        self.sender.send_replace(Arc::new(state));
    }

    pub fn subscribe(&self) -> SnapshotReceiver<S> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl<S: Default> Default for SnapshotStore<S> {
    fn default() -> Self {
        Self::new(S::default())
    }
}

impl<S> std::fmt::Debug for SnapshotStore<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotStore")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
