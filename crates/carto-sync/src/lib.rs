//! Synchronization adapters between live editing state and the entity
//! stores of the Carto workspace.
//!
//! Two sources of truth are reconciled with storage:
//!
//! - [`FeatureWatcher`] follows a live [`FeatureCollection`] through its
//!   add/remove/update events and writes debounced batches to the feature
//!   store.
//! - [`PersistenceBridge`] follows a [`SnapshotStore`], diffs the selected
//!   entities against the last write with [`diff`] and writes on a throttle.
//!
//! # Design Rules
//!
//! 1. Adapters only observe their sources; they never mutate them.
//! 2. A watch is bound to the connection that was open when it started.
//!    Writes against a later connection are discarded and logged.
//! 3. Stopping a watch waits for its task, so nothing is written afterwards.
//! 4. Writes of one adapter are committed one batch at a time, in order.

pub mod bridge;
pub mod collection;
pub mod diff;
pub mod error;
pub mod snapshot;
mod task;
pub mod watcher;

pub use bridge::{BridgeOptions, PersistenceBridge, DEFAULT_THROTTLE};
pub use collection::{CollectionEvent, CollectionEvents, FeatureCollection};
pub use diff::{diff, diff_removed};
pub use error::{SyncError, SyncResult};
pub use snapshot::{SnapshotReceiver, SnapshotStore};
pub use watcher::{FeatureWatcher, DEFAULT_DEBOUNCE};
