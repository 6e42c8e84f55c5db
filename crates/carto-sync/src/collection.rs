use std::sync::RwLock;

use tokio::sync::broadcast;

use carto_types::{Feature, FeatureId, LayerId};

/// Default capacity of the event channel of a collection.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// A mutation of a [`FeatureCollection`], carrying its payload.
#[derive(Clone, Debug, PartialEq)]
pub enum CollectionEvent {
    Added(Feature),
    Removed(FeatureId),
    Updated(Feature),
}

impl CollectionEvent {
    pub fn feature_id(&self) -> &FeatureId {
        match self {
            Self::Added(f) | Self::Updated(f) => &f.id,
            Self::Removed(id) => id,
        }
    }
}

/// Receiver side of a collection's event channel.
pub type CollectionEvents = broadcast::Receiver<CollectionEvent>;

/// The live, mutable feature set of one vector layer.
///
/// Iteration order is insertion order and stays stable across updates.
/// Every mutation is published to subscribers while the write lock is held,
/// so subscribers observe events in the order the mutations were applied.
pub struct FeatureCollection {
    layer_id: LayerId,
    features: RwLock<Vec<Feature>>,
    sender: broadcast::Sender<CollectionEvent>,
}

impl FeatureCollection {
    pub fn new(layer_id: LayerId) -> Self {
        Self::with_features(layer_id, Vec::new())
    }

    /// A collection pre-populated with `features`, without emitting events.
    pub fn with_features(layer_id: LayerId, features: Vec<Feature>) -> Self {
        Self::with_capacity(layer_id, features, DEFAULT_EVENT_CAPACITY)
    }

    pub fn with_capacity(layer_id: LayerId, features: Vec<Feature>, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            layer_id,
            features: RwLock::new(features),
            sender,
        }
    }

    pub fn layer_id(&self) -> &LayerId {
        &self.layer_id
    }

    pub fn subscribe(&self) -> CollectionEvents {
        self.sender.subscribe()
    }

    /// Insert a feature. A feature whose id is already present replaces the
    /// existing one in place and is published as an update.
    pub fn add(&self, feature: Feature) -> FeatureId {
        let id = feature.id.clone();
        let mut features = self.features.write().expect("lock poisoned");
        let event = match features.iter_mut().find(|f| f.id == id) {
            Some(existing) => {
                *existing = feature.clone();
                CollectionEvent::Updated(feature)
            }
            None => {
                features.push(feature.clone());
                CollectionEvent::Added(feature)
            }
        };
        self.publish(event);
        id
    }

    pub fn remove(&self, id: &FeatureId) -> Option<Feature> {
        let mut features = self.features.write().expect("lock poisoned");
        let index = features.iter().position(|f| &f.id == id)?;
        let removed = features.remove(index);
        self.publish(CollectionEvent::Removed(id.clone()));
        Some(removed)
    }

    /// Replace an existing feature. Returns `false` if the id is unknown.
    pub fn update(&self, feature: Feature) -> bool {
        let mut features = self.features.write().expect("lock poisoned");
        let Some(existing) = features.iter_mut().find(|f| f.id == feature.id) else {
            return false;
        };
        *existing = feature.clone();
        self.publish(CollectionEvent::Updated(feature));
        true
    }

    pub fn set_selected(&self, id: &FeatureId, selected: bool) -> bool {
        let mut features = self.features.write().expect("lock poisoned");
        let Some(existing) = features.iter_mut().find(|f| &f.id == id) else {
            return false;
        };
        if existing.selected == selected {
            return true;
        }
        existing.selected = selected;
        let event = CollectionEvent::Updated(existing.clone());
        self.publish(event);
        true
    }

    pub fn get(&self, id: &FeatureId) -> Option<Feature> {
        let features = self.features.read().expect("lock poisoned");
        features.iter().find(|f| &f.id == id).cloned()
    }

    pub fn contains(&self, id: &FeatureId) -> bool {
        let features = self.features.read().expect("lock poisoned");
        features.iter().any(|f| &f.id == id)
    }

    /// Snapshot of every feature, in iteration order.
    pub fn features(&self) -> Vec<Feature> {
        self.features.read().expect("lock poisoned").clone()
    }

    pub fn len(&self) -> usize {
        self.features.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn publish(&self, event: CollectionEvent) {
        // No subscriber is not an error.
        let _ = self.sender.send(event);
    }
}

impl std::fmt::Debug for FeatureCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureCollection")
            .field("layer_id", &self.layer_id)
            .field("len", &self.len())
            .field("subscribers", &self.sender.receiver_count())
            .finish()
    }
}
