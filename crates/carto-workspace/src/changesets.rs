//! Changesets over the live sources of an open project.
//!
//! Both kinds mutate the same externally-owned sources that UI handlers
//! mutate, so the watcher and the bridges persist undo and redo exactly like
//! a fresh edit.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use carto_history::{Changeset, ChangesetError};
use carto_sync::{FeatureCollection, SnapshotStore};
use carto_types::{Feature, FeatureId};

/// The recorded effect of a [`FeatureChangeset`].
#[derive(Clone, Debug, PartialEq)]
pub enum FeatureEdit {
    Add(Vec<Feature>),
    Remove(Vec<Feature>),
    Update { before: Feature, after: Feature },
}

/// Adds, removes or updates features of one live collection.
///
/// Removed and replaced features are captured whole at construction, so
/// ids stay stable across any number of undo/redo cycles.
pub struct FeatureChangeset {
    collection: Arc<FeatureCollection>,
    edit: FeatureEdit,
}

impl FeatureChangeset {
    pub fn add(collection: Arc<FeatureCollection>, features: Vec<Feature>) -> Self {
        Self {
            collection,
            edit: FeatureEdit::Add(features),
        }
    }

    /// Remove the features with `ids` that are currently in the collection.
    /// Unknown ids are ignored.
    pub fn remove(collection: Arc<FeatureCollection>, ids: &[FeatureId]) -> Self {
        let captured = ids.iter().filter_map(|id| collection.get(id)).collect();
        Self {
            collection,
            edit: FeatureEdit::Remove(captured),
        }
    }

    /// Replace a feature with `after`. Returns `None` if no feature with that
    /// id is in the collection.
    pub fn update(collection: Arc<FeatureCollection>, after: Feature) -> Option<Self> {
        let before = collection.get(&after.id)?;
        Some(Self {
            collection,
            edit: FeatureEdit::Update { before, after },
        })
    }

    pub fn edit(&self) -> &FeatureEdit {
        &self.edit
    }

    fn insert(&self, features: &[Feature]) {
        for feature in features {
            self.collection.add(feature.clone());
        }
    }

    fn delete(&self, features: &[Feature]) {
        for feature in features {
            self.collection.remove(&feature.id);
        }
    }

    fn replace(&self, feature: &Feature) -> Result<(), ChangesetError> {
        if self.collection.update(feature.clone()) {
            Ok(())
        } else {
            Err(format!(
                "feature {} is no longer in layer {}",
                feature.id,
                self.collection.layer_id()
            )
            .into())
        }
    }
}

#[async_trait]
impl Changeset for FeatureChangeset {
    async fn apply(&self) -> Result<(), ChangesetError> {
        match &self.edit {
            FeatureEdit::Add(features) => self.insert(features),
            FeatureEdit::Remove(features) => self.delete(features),
            FeatureEdit::Update { after, .. } => self.replace(after)?,
        }
        Ok(())
    }

    async fn undo(&self) -> Result<(), ChangesetError> {
        match &self.edit {
            FeatureEdit::Add(features) => self.delete(features),
            FeatureEdit::Remove(features) => self.insert(features),
            FeatureEdit::Update { before, .. } => self.replace(before)?,
        }
        Ok(())
    }

    fn describe(&self) -> String {
        let layer = self.collection.layer_id();
        match &self.edit {
            FeatureEdit::Add(f) => format!("add {} feature(s) to {layer}", f.len()),
            FeatureEdit::Remove(f) => format!("remove {} feature(s) from {layer}", f.len()),
            FeatureEdit::Update { after, .. } => format!("update {} in {layer}", after.id),
        }
    }
}

impl fmt::Debug for FeatureChangeset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureChangeset")
            .field("layer", self.collection.layer_id())
            .field("edit", &self.edit)
            .finish()
    }
}

type Reducer<S> = Box<dyn Fn(&S) -> S + Send + Sync>;

/// Dispatches a forward reducer on apply and a backward reducer on undo.
pub struct DispatchChangeset<S> {
    store: Arc<SnapshotStore<S>>,
    label: String,
    forward: Reducer<S>,
    backward: Reducer<S>,
}

impl<S: Send + Sync + 'static> DispatchChangeset<S> {
    pub fn new<F, B>(
        store: Arc<SnapshotStore<S>>,
        label: impl Into<String>,
        forward: F,
        backward: B,
    ) -> Self
    where
        F: Fn(&S) -> S + Send + Sync + 'static,
        B: Fn(&S) -> S + Send + Sync + 'static,
    {
        Self {
            store,
            label: label.into(),
            forward: Box::new(forward),
            backward: Box::new(backward),
        }
    }

    /// Swap whole snapshots: `after` on apply, `before` on undo.
    pub fn replace(
        store: Arc<SnapshotStore<S>>,
        label: impl Into<String>,
        before: S,
        after: S,
    ) -> Self
    where
        S: Clone,
    {
        Self::new(store, label, move |_| after.clone(), move |_| before.clone())
    }
}

#[async_trait]
impl<S: Send + Sync + 'static> Changeset for DispatchChangeset<S> {
    async fn apply(&self) -> Result<(), ChangesetError> {
        self.store.dispatch(|state| (self.forward)(state));
        Ok(())
    }

    async fn undo(&self) -> Result<(), ChangesetError> {
        self.store.dispatch(|state| (self.backward)(state));
        Ok(())
    }

    fn describe(&self) -> String {
        self.label.clone()
    }
}

impl<S> fmt::Debug for DispatchChangeset<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchChangeset")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}
