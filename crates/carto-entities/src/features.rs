//! Feature storage, normalized out of the layer records.
//!
//! Features are stored one record per feature with the owning layer id as a
//! foreign key. The `layer_id` index answers "all features of a layer"
//! without scanning the store.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use carto_store::{ConnectionToken, StorageClient};
use carto_types::{Feature, FeatureId, LayerId};

use crate::entity::{decode, encode};
use crate::error::EntityResult;
use crate::schema::{FEATURES, LAYER_ID_INDEX};

/// A feature as persisted: the feature plus its owning layer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    pub layer_id: LayerId,
    #[serde(flatten)]
    pub feature: Feature,
}

impl FeatureRecord {
    /// Build a record, clearing the selection flag.
    pub fn new(layer_id: LayerId, feature: &Feature) -> Self {
        Self {
            layer_id,
            feature: feature.normalized(),
        }
    }
}

fn records(layer_id: &LayerId, features: &[Feature]) -> EntityResult<Vec<(String, Value)>> {
    features
        .iter()
        .map(|f| {
            let record = FeatureRecord::new(layer_id.clone(), f);
            Ok((f.id.to_string(), encode(FEATURES, &record)?))
        })
        .collect()
}

/// Store of features keyed by feature id, indexed by layer id.
#[derive(Clone)]
pub struct FeatureStore {
    client: Arc<StorageClient>,
}

impl FeatureStore {
    pub fn new(client: Arc<StorageClient>) -> Self {
        Self { client }
    }

    pub async fn get(&self, id: &FeatureId) -> EntityResult<Option<FeatureRecord>> {
        match self.client.get(FEATURES, id.as_str()).await? {
            Some(value) => Ok(Some(decode(FEATURES, id.as_str(), value)?)),
            None => Ok(None),
        }
    }

    /// All features of a layer. An unknown layer yields an empty list.
    pub async fn get_all_by_layer_id(&self, layer_id: &LayerId) -> EntityResult<Vec<Feature>> {
        let values = self
            .client
            .get_all_by_index(FEATURES, LAYER_ID_INDEX, &Value::from(layer_id.as_str()))
            .await?;
        values
            .into_iter()
            .map(|value| {
                let key = value
                    .get("id")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                decode::<FeatureRecord>(FEATURES, &key, value).map(|r| r.feature)
            })
            .collect()
    }

    /// Write features of one layer in a single batch. Selection is stripped.
    pub async fn put_all_for_layer(
        &self,
        layer_id: &LayerId,
        features: &[Feature],
    ) -> EntityResult<()> {
        let entries = records(layer_id, features)?;
        self.client.put_all(FEATURES, entries).await?;
        Ok(())
    }

    /// [`put_all_for_layer`](Self::put_all_for_layer), rejected with
    /// `StaleConnection` if `token` no longer names the open connection.
    pub async fn put_all_for_layer_as(
        &self,
        token: &ConnectionToken,
        layer_id: &LayerId,
        features: &[Feature],
    ) -> EntityResult<()> {
        let entries = records(layer_id, features)?;
        self.client.put_all_as(token, FEATURES, entries).await?;
        Ok(())
    }

    /// Delete features by id. Returns how many existed.
    pub async fn delete_all(&self, ids: &[FeatureId]) -> EntityResult<usize> {
        let keys = ids.iter().map(ToString::to_string).collect();
        Ok(self.client.delete_all(FEATURES, keys).await?)
    }

    pub async fn delete_all_as(
        &self,
        token: &ConnectionToken,
        ids: &[FeatureId],
    ) -> EntityResult<usize> {
        let keys = ids.iter().map(ToString::to_string).collect();
        Ok(self.client.delete_all_as(token, FEATURES, keys).await?)
    }

    /// Delete every feature of a layer.
    pub async fn delete_by_layer_id(&self, layer_id: &LayerId) -> EntityResult<usize> {
        Ok(self
            .client
            .delete_by_index(FEATURES, LAYER_ID_INDEX, &Value::from(layer_id.as_str()))
            .await?)
    }

    /// Make the stored features of `layer_id` exactly `features`.
    ///
    /// Stored features that are not in `features` are deleted after the new
    /// set has been written.
    pub async fn replace_layer(&self, layer_id: &LayerId, features: &[Feature]) -> EntityResult<()> {
        let keep: HashSet<&FeatureId> = features.iter().map(|f| &f.id).collect();
        let stale: Vec<FeatureId> = self
            .get_all_by_layer_id(layer_id)
            .await?
            .into_iter()
            .map(|f| f.id)
            .filter(|id| !keep.contains(id))
            .collect();

        self.put_all_for_layer(layer_id, features).await?;
        let removed = self.delete_all(&stale).await?;
        debug!(layer = %layer_id, written = features.len(), removed, "layer features replaced");
        Ok(())
    }

    pub async fn count(&self) -> EntityResult<usize> {
        Ok(self.client.count(FEATURES).await?)
    }
}
