use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use carto_store::{ConnectionToken, StorageClient};
use carto_types::{Layer, Layout, ProjectRecord, SharedView};

use crate::error::{EntityError, EntityResult};
use crate::schema::{LAYERS, LAYOUTS, PROJECTS, SHARED_VIEWS};

/// A record type that lives in its own object store under a string key.
pub trait Entity: Clone + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Name of the object store holding this entity.
    const STORE: &'static str;

    /// Primary key.
    fn key(&self) -> String;
}

impl Entity for ProjectRecord {
    const STORE: &'static str = PROJECTS;

    fn key(&self) -> String {
        self.id().to_string()
    }
}

impl Entity for Layer {
    const STORE: &'static str = LAYERS;

    fn key(&self) -> String {
        self.id.to_string()
    }
}

impl Entity for Layout {
    const STORE: &'static str = LAYOUTS;

    fn key(&self) -> String {
        self.id.to_string()
    }
}

impl Entity for SharedView {
    const STORE: &'static str = SHARED_VIEWS;

    fn key(&self) -> String {
        self.id.to_string()
    }
}

pub(crate) fn encode<T: Serialize>(store: &'static str, value: &T) -> EntityResult<Value> {
    serde_json::to_value(value).map_err(|e| EntityError::Encode {
        store,
        reason: e.to_string(),
    })
}

pub(crate) fn decode<T: DeserializeOwned>(
    store: &'static str,
    key: &str,
    value: Value,
) -> EntityResult<T> {
    serde_json::from_value(value).map_err(|e| EntityError::Decode {
        store,
        key: key.to_string(),
        reason: e.to_string(),
    })
}

/// Typed view over the object store of entity `E`.
pub struct EntityStore<E> {
    client: Arc<StorageClient>,
    _entity: PhantomData<fn() -> E>,
}

impl<E> Clone for EntityStore<E> {
    fn clone(&self) -> Self {
        Self {
            client: Arc::clone(&self.client),
            _entity: PhantomData,
        }
    }
}

impl<E: Entity> EntityStore<E> {
    pub fn new(client: Arc<StorageClient>) -> Self {
        Self {
            client,
            _entity: PhantomData,
        }
    }

    /// Read one entity. Returns `Ok(None)` if it does not exist.
    pub async fn get(&self, key: &str) -> EntityResult<Option<E>> {
        match self.client.get(E::STORE, key).await? {
            Some(value) => Ok(Some(decode(E::STORE, key, value)?)),
            None => Ok(None),
        }
    }

    /// Read several entities, positionally. Missing keys yield `None`.
    pub async fn get_all(&self, keys: &[String]) -> EntityResult<Vec<Option<E>>> {
        let values = self.client.get_all(E::STORE, keys).await?;
        keys.iter()
            .zip(values)
            .map(|(key, value)| value.map(|v| decode(E::STORE, key, v)).transpose())
            .collect()
    }

    /// Every entity of the store, in key order.
    pub async fn list(&self) -> EntityResult<Vec<E>> {
        let keys = self.client.keys(E::STORE).await?;
        Ok(self.get_all(&keys).await?.into_iter().flatten().collect())
    }

    pub async fn put(&self, entity: &E) -> EntityResult<()> {
        self.put_all(std::slice::from_ref(entity)).await
    }

    /// Write a batch in one transaction.
    pub async fn put_all(&self, entities: &[E]) -> EntityResult<()> {
        self.client.put_all(E::STORE, Self::entries(entities)?).await?;
        Ok(())
    }

    /// Write a batch only if `token` still names the open connection.
    pub async fn put_all_as(&self, token: &ConnectionToken, entities: &[E]) -> EntityResult<()> {
        self.client
            .put_all_as(token, E::STORE, Self::entries(entities)?)
            .await?;
        Ok(())
    }

    fn entries(entities: &[E]) -> EntityResult<Vec<(String, Value)>> {
        entities
            .iter()
            .map(|e| Ok((e.key(), encode(E::STORE, e)?)))
            .collect()
    }

    pub async fn exists(&self, key: &str) -> EntityResult<bool> {
        Ok(self.client.exists(E::STORE, key).await?)
    }

    /// Delete a batch of keys. Returns how many existed.
    pub async fn delete_all(&self, keys: Vec<String>) -> EntityResult<usize> {
        Ok(self.client.delete_all(E::STORE, keys).await?)
    }

    pub async fn delete_all_as(
        &self,
        token: &ConnectionToken,
        keys: Vec<String>,
    ) -> EntityResult<usize> {
        Ok(self.client.delete_all_as(token, E::STORE, keys).await?)
    }

    pub async fn count(&self) -> EntityResult<usize> {
        Ok(self.client.count(E::STORE).await?)
    }
}

/// Layer metadata store.
pub type LayerStore = EntityStore<Layer>;
/// Export layout store.
pub type LayoutStore = EntityStore<Layout>;
/// Shared view store.
pub type SharedViewStore = EntityStore<SharedView>;
