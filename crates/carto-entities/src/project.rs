//! The project row and the manifest join.

use std::sync::Arc;

use tracing::{debug, info};

use carto_store::StorageClient;
use carto_types::{
    Layer, LayerDocument, Layout, ProjectDocument, ProjectId, ProjectRecord, SharedView,
};

use crate::entity::{EntityStore, LayerStore, LayoutStore, SharedViewStore};
use crate::error::EntityResult;
use crate::features::FeatureStore;

/// Top-level store: project rows plus the stores their foreign keys point at.
#[derive(Clone)]
pub struct ProjectStore {
    projects: EntityStore<ProjectRecord>,
    layers: LayerStore,
    layouts: LayoutStore,
    shared_views: SharedViewStore,
    features: FeatureStore,
}

impl ProjectStore {
    pub fn new(client: Arc<StorageClient>) -> Self {
        Self {
            projects: EntityStore::new(Arc::clone(&client)),
            layers: LayerStore::new(Arc::clone(&client)),
            layouts: LayoutStore::new(Arc::clone(&client)),
            shared_views: SharedViewStore::new(Arc::clone(&client)),
            features: FeatureStore::new(client),
        }
    }

    /// The normalized project row, without joining children.
    pub async fn get(&self, id: &ProjectId) -> EntityResult<Option<ProjectRecord>> {
        self.projects.get(id.as_str()).await
    }

    pub async fn exists(&self, id: &ProjectId) -> EntityResult<bool> {
        self.projects.exists(id.as_str()).await
    }

    /// Rewrite only the project row.
    pub async fn put_record(&self, record: &ProjectRecord) -> EntityResult<()> {
        self.projects.put(record).await
    }

    /// Normalize a full document into its object stores.
    ///
    /// Children are written before the project row so that the row never
    /// references ids that were not stored. Features of vector layers
    /// replace whatever the layer held before; selection is stripped.
    pub async fn put(&self, document: &ProjectDocument) -> EntityResult<()> {
        let layers: Vec<Layer> = document.layers.iter().map(|l| l.layer.clone()).collect();
        self.layers.put_all(&layers).await?;
        for layer in document.layers.iter().filter(|l| l.layer.is_vector()) {
            self.features
                .replace_layer(&layer.layer.id, &layer.features)
                .await?;
        }
        self.layouts.put_all(&document.layouts).await?;
        self.shared_views.put_all(&document.shared_views).await?;
        self.projects.put(&document.record()).await?;

        info!(
            project = %document.id(),
            layers = layers.len(),
            features = document.feature_count(),
            "project stored"
        );
        Ok(())
    }

    /// Reassemble the denormalized document of project `id`.
    ///
    /// Returns `Ok(None)` if the project row does not exist. Dangling
    /// layer, layout or shared view ids are skipped; a vector layer without
    /// stored features gets an empty feature list.
    pub async fn get_manifest(&self, id: &ProjectId) -> EntityResult<Option<ProjectDocument>> {
        let Some(record) = self.get(id).await? else {
            return Ok(None);
        };

        let layer_keys = keys_of(&record.layer_ids);
        let stored_layers = self.layers.get_all(&layer_keys).await?;
        let missing_layers = stored_layers.iter().filter(|l| l.is_none()).count();

        let mut layers = Vec::with_capacity(stored_layers.len());
        for layer in stored_layers.into_iter().flatten() {
            let features = if layer.is_vector() {
                self.features.get_all_by_layer_id(&layer.id).await?
            } else {
                Vec::new()
            };
            layers.push(LayerDocument::with_features(layer, features));
        }

        let layouts: Vec<Layout> = self
            .layouts
            .get_all(&keys_of(&record.layout_ids))
            .await?
            .into_iter()
            .flatten()
            .collect();
        let shared_views: Vec<SharedView> = self
            .shared_views
            .get_all(&keys_of(&record.shared_view_ids))
            .await?
            .into_iter()
            .flatten()
            .collect();

        if missing_layers > 0 {
            debug!(project = %id, missing_layers, "skipped dangling layer ids");
        }

        Ok(Some(ProjectDocument {
            metadata: record.metadata,
            layers,
            layouts,
            shared_views,
        }))
    }

    /// Every project row in the connected database.
    pub async fn list(&self) -> EntityResult<Vec<ProjectRecord>> {
        self.projects.list().await
    }
}

fn keys_of<T: ToString>(ids: &[T]) -> Vec<String> {
    ids.iter().map(ToString::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::connect_project_database;
    use carto_store::MemoryEngine;
    use carto_types::{Dimensions, Feature, LayerId, LayerKind, MapView, PredefinedModel};
    use serde_json::json;

    async fn connected() -> (Arc<StorageClient>, ProjectStore) {
        let client = Arc::new(StorageClient::new(Arc::new(MemoryEngine::new())));
        connect_project_database(&client, "carto-project-p1")
            .await
            .unwrap();
        let store = ProjectStore::new(Arc::clone(&client));
        (client, store)
    }

    fn point(x: i64) -> Feature {
        Feature::new(json!({"type": "Point", "coordinates": [x, 0]}))
            .with_property("n", json!(x))
    }

    fn sample(layers: usize, features_per_layer: usize) -> ProjectDocument {
        let mut doc = ProjectDocument::new("Round trip");
        for i in 0..layers {
            let features = (0..features_per_layer).map(|j| point(j as i64)).collect();
            doc.layers.push(LayerDocument::with_features(
                Layer::vector(format!("Layer {i}")),
                features,
            ));
        }
        doc.layers.push(LayerDocument::new(Layer::new(
            LayerId::generate(),
            "Basemap",
            LayerKind::Predefined {
                model: PredefinedModel::OpenStreetMap,
            },
        )));
        doc.layouts.push(Layout::new(
            "A4",
            MapView::default(),
            Dimensions {
                width: 210,
                height: 297,
            },
        ));
        doc.shared_views
            .push(SharedView::new("Overview", MapView::default()));
        doc
    }

    fn sorted_ids(features: &[Feature]) -> Vec<String> {
        let mut ids: Vec<String> = features.iter().map(|f| f.id.to_string()).collect();
        ids.sort();
        ids
    }

    #[tokio::test]
    async fn put_then_get_manifest_round_trips() {
        let (_client, store) = connected().await;
        let doc = sample(3, 4);
        store.put(&doc).await.unwrap();

        let loaded = store.get_manifest(doc.id()).await.unwrap().unwrap();
        assert_eq!(loaded.metadata, doc.metadata);
        assert_eq!(loaded.layers.len(), doc.layers.len());
        for (got, want) in loaded.layers.iter().zip(&doc.layers) {
            assert_eq!(got.layer, want.layer);
            assert_eq!(sorted_ids(&got.features), sorted_ids(&want.features));
        }
        assert_eq!(loaded.layouts, doc.layouts);
        assert_eq!(loaded.shared_views, doc.shared_views);
        assert_eq!(loaded.feature_count(), 12);
    }

    #[tokio::test]
    async fn missing_project_is_none() {
        let (_client, store) = connected().await;
        let id = ProjectId::generate();
        assert!(store.get_manifest(&id).await.unwrap().is_none());
        assert!(!store.exists(&id).await.unwrap());
    }

    #[tokio::test]
    async fn dangling_layer_ids_are_skipped() {
        let (client, store) = connected().await;
        let doc = sample(2, 1);
        store.put(&doc).await.unwrap();

        let gone = doc.layers[0].layer.id.clone();
        client
            .delete_all(crate::schema::LAYERS, vec![gone.to_string()])
            .await
            .unwrap();

        let loaded = store.get_manifest(doc.id()).await.unwrap().unwrap();
        assert_eq!(loaded.layers.len(), doc.layers.len() - 1);
        assert!(loaded.layer(&gone).is_none());
    }

    #[tokio::test]
    async fn vector_layer_without_features_is_empty() {
        let (_client, store) = connected().await;
        let doc = sample(1, 0);
        store.put(&doc).await.unwrap();

        let loaded = store.get_manifest(doc.id()).await.unwrap().unwrap();
        assert!(loaded.layers[0].features.is_empty());
    }

    #[tokio::test]
    async fn put_strips_selection_and_replaces_features() {
        let (_client, store) = connected().await;
        let mut doc = sample(1, 2);
        doc.layers[0].features[0].selected = true;
        store.put(&doc).await.unwrap();

        doc.layers[0].features.pop();
        store.put(&doc).await.unwrap();

        let loaded = store.get_manifest(doc.id()).await.unwrap().unwrap();
        assert_eq!(loaded.layers[0].features.len(), 1);
        assert!(!loaded.layers[0].features[0].selected);
    }

    #[tokio::test]
    async fn layer_order_follows_record() {
        let (_client, store) = connected().await;
        let mut doc = sample(3, 0);
        doc.layers.reverse();
        store.put(&doc).await.unwrap();

        let loaded = store.get_manifest(doc.id()).await.unwrap().unwrap();
        let want: Vec<_> = doc.layers.iter().map(|l| l.layer.id.clone()).collect();
        let got: Vec<_> = loaded.layers.iter().map(|l| l.layer.id.clone()).collect();
        assert_eq!(got, want);
    }
}
