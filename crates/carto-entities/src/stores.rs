use std::sync::Arc;

use carto_store::StorageClient;

use crate::entity::{LayerStore, LayoutStore, SharedViewStore};
use crate::features::FeatureStore;
use crate::project::ProjectStore;
use crate::tiles::TileStore;

/// Every entity store of a project database, sharing one client.
#[derive(Clone)]
pub struct EntityStores {
    pub projects: ProjectStore,
    pub layers: LayerStore,
    pub layouts: LayoutStore,
    pub shared_views: SharedViewStore,
    pub features: FeatureStore,
    pub tiles: TileStore,
}

impl EntityStores {
    pub fn new(client: Arc<StorageClient>) -> Self {
        Self {
            projects: ProjectStore::new(Arc::clone(&client)),
            layers: LayerStore::new(Arc::clone(&client)),
            layouts: LayoutStore::new(Arc::clone(&client)),
            shared_views: SharedViewStore::new(Arc::clone(&client)),
            features: FeatureStore::new(Arc::clone(&client)),
            tiles: TileStore::new(client),
        }
    }
}
