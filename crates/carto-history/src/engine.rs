use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use carto_types::HistoryKey;

use crate::changeset::{Changeset, ChangesetId, ChangesetState};
use crate::error::{HistoryAction, HistoryError, HistoryResult};

/// Default maximum number of undoable changesets per key.
pub const DEFAULT_HISTORY_LIMIT: usize = 100;

struct Entry {
    id: ChangesetId,
    changeset: Arc<dyn Changeset>,
}

struct InFlight {
    id: ChangesetId,
    removed: bool,
}

#[derive(Default)]
struct Stacks {
    undo: Vec<Entry>,
    redo: Vec<Entry>,
    /// Bumped by every registration and clear; a redo stack built before a
    /// bump is obsolete.
    generation: u64,
    in_flight: Option<InFlight>,
}

impl Stacks {
    fn stack_mut(&mut self, action: HistoryAction) -> &mut Vec<Entry> {
        match action {
            HistoryAction::Redo => &mut self.redo,
            HistoryAction::Apply | HistoryAction::Undo => &mut self.undo,
        }
    }

    /// Trim the undo stack to `limit`, returning the evicted entries.
    fn evict(&mut self, limit: usize) -> Vec<Entry> {
        let excess = self.undo.len().saturating_sub(limit);
        self.undo.drain(..excess).collect()
    }
}

/// Key-scoped undo/redo engine.
///
/// Each [`HistoryKey`] owns an undo stack and a redo stack, both ordered
/// most-recent-last. Undo and redo of one key run one at a time; distinct
/// keys never wait on each other. The engine only tracks reversibility:
/// [`register`](Self::register) records a changeset whose forward effect the
/// caller has already performed.
pub struct HistoryEngine {
    stacks: Mutex<HashMap<HistoryKey, Stacks>>,
    turns: Mutex<HashMap<HistoryKey, Arc<tokio::sync::Mutex<()>>>>,
    next_id: AtomicU64,
    limit: usize,
}

impl HistoryEngine {
    pub fn new() -> Self {
        Self::with_limit(DEFAULT_HISTORY_LIMIT)
    }

    /// An engine keeping at most `limit` undoable changesets per key.
    /// A limit of zero is treated as one.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            stacks: Mutex::new(HashMap::new()),
            turns: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            limit: limit.max(1),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Push an applied changeset onto the undo stack of `key` and clear the
    /// redo stack. Cleared and evicted changesets are disposed.
    pub async fn register(&self, key: &HistoryKey, changeset: Arc<dyn Changeset>) -> ChangesetId {
        let id = self.next_id();
        self.push(key, id, changeset).await;
        id
    }

    /// Apply `changeset`, then register it. Nothing is registered if the
    /// forward effect fails.
    pub async fn perform(
        &self,
        key: &HistoryKey,
        changeset: Arc<dyn Changeset>,
    ) -> HistoryResult<ChangesetId> {
        let id = self.next_id();
        if let Err(source) = changeset.apply().await {
            warn!(key = %key, id = %id, changeset = %changeset.describe(), error = %source, "changeset failed to apply");
            return Err(HistoryError::Changeset {
                key: key.clone(),
                id,
                source,
            });
        }
        self.push(key, id, changeset).await;
        Ok(id)
    }

    /// Reverse the most recent changeset of `key` and move it to the redo
    /// stack. Returns `Ok(false)` if there was nothing to undo.
    pub async fn undo(&self, key: &HistoryKey) -> HistoryResult<bool> {
        self.step(key, HistoryAction::Undo).await
    }

    /// Re-apply the most recently undone changeset of `key`. Returns
    /// `Ok(false)` if there was nothing to redo.
    pub async fn redo(&self, key: &HistoryKey) -> HistoryResult<bool> {
        self.step(key, HistoryAction::Redo).await
    }

    pub fn can_undo(&self, key: &HistoryKey) -> bool {
        self.depths(key).0 > 0
    }

    pub fn can_redo(&self, key: &HistoryKey) -> bool {
        self.depths(key).1 > 0
    }

    /// Number of undoable and redoable changesets of `key`.
    pub fn depths(&self, key: &HistoryKey) -> (usize, usize) {
        let stacks = self.stacks.lock().expect("lock poisoned");
        stacks
            .get(key)
            .map(|s| (s.undo.len(), s.redo.len()))
            .unwrap_or((0, 0))
    }

    /// Where changeset `id` of `key` sits, if it is still tracked.
    pub fn state(&self, key: &HistoryKey, id: ChangesetId) -> Option<ChangesetState> {
        let stacks = self.stacks.lock().expect("lock poisoned");
        let s = stacks.get(key)?;
        if s.undo.iter().any(|e| e.id == id) {
            Some(ChangesetState::Applied)
        } else if s.redo.iter().any(|e| e.id == id) {
            Some(ChangesetState::Undone)
        } else {
            None
        }
    }

    /// Excise changeset `id` from either stack of `key` and dispose it.
    ///
    /// A changeset that is being undone or redone is disposed as soon as the
    /// operation settles. Returns `false` if `id` is unknown.
    pub async fn remove(&self, key: &HistoryKey, id: ChangesetId) -> bool {
        let entry = {
            let mut stacks = self.stacks.lock().expect("lock poisoned");
            let Some(s) = stacks.get_mut(key) else {
                return false;
            };
            if let Some(pos) = s.undo.iter().position(|e| e.id == id) {
                Some(s.undo.remove(pos))
            } else if let Some(pos) = s.redo.iter().position(|e| e.id == id) {
                Some(s.redo.remove(pos))
            } else {
                match s.in_flight.as_mut() {
                    Some(flight) if flight.id == id => {
                        flight.removed = true;
                        None
                    }
                    _ => return false,
                }
            }
        };
        debug!(key = %key, id = %id, "changeset removed");
        if let Some(entry) = entry {
            entry.changeset.dispose().await;
        }
        true
    }

    /// Dispose every changeset of `key`. Returns how many were dropped.
    pub async fn clear(&self, key: &HistoryKey) -> usize {
        let dropped = {
            let mut stacks = self.stacks.lock().expect("lock poisoned");
            stacks.get_mut(key).map(clear_stacks).unwrap_or_default()
        };
        let count = dropped.len();
        dispose_all(dropped).await;
        if count > 0 {
            debug!(key = %key, count, "history cleared");
        }
        count
    }

    /// Dispose the history of every key.
    pub async fn clear_all(&self) -> usize {
        let dropped: Vec<Entry> = {
            let mut stacks = self.stacks.lock().expect("lock poisoned");
            stacks.values_mut().flat_map(clear_stacks).collect()
        };
        let count = dropped.len();
        dispose_all(dropped).await;
        debug!(count, "all history cleared");
        count
    }

    fn next_id(&self) -> ChangesetId {
        ChangesetId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn turn(&self, key: &HistoryKey) -> Arc<tokio::sync::Mutex<()>> {
        let mut turns = self.turns.lock().expect("lock poisoned");
        Arc::clone(turns.entry(key.clone()).or_default())
    }

    async fn push(&self, key: &HistoryKey, id: ChangesetId, changeset: Arc<dyn Changeset>) {
        let describe = changeset.describe();
        let dropped = {
            let mut stacks = self.stacks.lock().expect("lock poisoned");
            let s = stacks.entry(key.clone()).or_default();
            s.generation += 1;
            let mut dropped: Vec<Entry> = s.redo.drain(..).collect();
            s.undo.push(Entry { id, changeset });
            dropped.extend(s.evict(self.limit));
            dropped
        };
        debug!(
            key = %key,
            id = %id,
            changeset = %describe,
            disposed = dropped.len(),
            "changeset registered"
        );
        dispose_all(dropped).await;
    }

    async fn step(&self, key: &HistoryKey, action: HistoryAction) -> HistoryResult<bool> {
        let turn = self.turn(key);
        let _turn = turn.lock().await;

        let (entry, generation, position) = {
            let mut stacks = self.stacks.lock().expect("lock poisoned");
            let Some(s) = stacks.get_mut(key) else {
                return Ok(false);
            };
            let Some(entry) = s.stack_mut(action).pop() else {
                return Ok(false);
            };
            s.in_flight = Some(InFlight {
                id: entry.id,
                removed: false,
            });
            let position = s.stack_mut(action).len();
            (entry, s.generation, position)
        };

        let id = entry.id;
        let changeset = Arc::clone(&entry.changeset);
        let result = match action {
            HistoryAction::Redo => changeset.apply().await,
            HistoryAction::Apply | HistoryAction::Undo => changeset.undo().await,
        };

        let mut dropped = Vec::new();
        {
            let mut stacks = self.stacks.lock().expect("lock poisoned");
            let s = stacks.entry(key.clone()).or_default();
            let removed = s.in_flight.take().is_some_and(|f| f.removed);
            // Undone entries live on the redo stack, which a newer
            // registration has invalidated.
            let lands_on_redo = matches!(
                (&result, action),
                (Ok(()), HistoryAction::Undo) | (Err(_), HistoryAction::Redo)
            );
            let obsolete = lands_on_redo && s.generation != generation;

            if removed || obsolete {
                dropped.push(entry);
            } else {
                match (&result, action) {
                    (Ok(()), HistoryAction::Redo) => {
                        s.undo.push(entry);
                        dropped.extend(s.evict(self.limit));
                    }
                    (Ok(()), _) => s.redo.push(entry),
                    (Err(_), _) => {
                        let stack = s.stack_mut(action);
                        let at = position.min(stack.len());
                        stack.insert(at, entry);
                    }
                }
            }
        }
        dispose_all(dropped).await;

        match result {
            Ok(()) => {
                debug!(key = %key, id = %id, action = %action, changeset = %changeset.describe(), "history step");
                Ok(true)
            }
            Err(source) => {
                warn!(key = %key, id = %id, action = %action, changeset = %changeset.describe(), error = %source, "changeset reversal failed");
                Err(HistoryError::Reversal {
                    key: key.clone(),
                    id,
                    action,
                    source,
                })
            }
        }
    }
}

impl Default for HistoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for HistoryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let keys = self.stacks.lock().map(|s| s.len()).unwrap_or_default();
        f.debug_struct("HistoryEngine")
            .field("limit", &self.limit)
            .field("keys", &keys)
            .finish()
    }
}

fn clear_stacks(s: &mut Stacks) -> Vec<Entry> {
    s.generation += 1;
    if let Some(flight) = s.in_flight.as_mut() {
        flight.removed = true;
    }
    let mut dropped: Vec<Entry> = s.undo.drain(..).collect();
    dropped.extend(s.redo.drain(..));
    dropped
}

async fn dispose_all(entries: Vec<Entry>) {
    for entry in entries {
        entry.changeset.dispose().await;
    }
}
