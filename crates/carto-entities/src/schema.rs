//! Object stores and indices of a project database.

use carto_store::{ConnectionToken, StorageClient, StoreResult, UpgradeTx};

/// Schema version of project databases written by this crate.
pub const SCHEMA_VERSION: u32 = 1;

/// Project rows (one per database).
pub const PROJECTS: &str = "projects";
/// Layer metadata, features excluded.
pub const LAYERS: &str = "layers";
/// Export layouts.
pub const LAYOUTS: &str = "layouts";
/// Shared views.
pub const SHARED_VIEWS: &str = "shared_views";
/// Features of vector layers, indexed by [`LAYER_ID_INDEX`].
pub const FEATURES: &str = "features";
/// Cached remote tiles keyed by request URL.
pub const TILES: &str = "tiles";

/// Index of [`FEATURES`] on the owning layer id.
pub const LAYER_ID_INDEX: &str = "layer_id";

/// Upgrade callback for project databases.
pub fn workspace_schema(tx: &mut UpgradeTx<'_>) -> StoreResult<()> {
    if tx.old_version() < 1 {
        for store in [PROJECTS, LAYERS, LAYOUTS, SHARED_VIEWS, FEATURES, TILES] {
            tx.create_store(store)?;
        }
        tx.create_index(FEATURES, LAYER_ID_INDEX, "layer_id")?;
    }
    Ok(())
}

/// Connect `client` to a project database at the current schema version.
pub async fn connect_project_database(
    client: &StorageClient,
    name: &str,
) -> StoreResult<ConnectionToken> {
    client.connect(name, SCHEMA_VERSION, &workspace_schema).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use carto_store::MemoryEngine;
    use std::sync::Arc;

    #[tokio::test]
    async fn schema_creates_every_store() {
        let client = StorageClient::new(Arc::new(MemoryEngine::new()));
        connect_project_database(&client, "carto-project-p1")
            .await
            .unwrap();
        for store in [PROJECTS, LAYERS, LAYOUTS, SHARED_VIEWS, FEATURES, TILES] {
            assert_eq!(client.count(store).await.unwrap(), 0, "{store}");
        }
        let none = client
            .get_all_by_index(FEATURES, LAYER_ID_INDEX, &serde_json::json!("l1"))
            .await
            .unwrap();
        assert!(none.is_empty());
    }
}
