use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use carto_store::{ClearOptions, StorageClient};

use crate::entity::{decode, encode};
use crate::error::{EntityError, EntityResult};
use crate::schema::TILES;

#[derive(Serialize, Deserialize)]
struct TileRecord {
    url: String,
    data: String,
}

/// Cache of remote tile payloads keyed by request URL.
#[derive(Clone)]
pub struct TileStore {
    client: Arc<StorageClient>,
}

impl TileStore {
    pub fn new(client: Arc<StorageClient>) -> Self {
        Self { client }
    }

    pub async fn get(&self, url: &str) -> EntityResult<Option<Bytes>> {
        let Some(value) = self.client.get(TILES, url).await? else {
            return Ok(None);
        };
        let record: TileRecord = decode(TILES, url, value)?;
        let data = hex::decode(&record.data).map_err(|e| EntityError::Decode {
            store: TILES,
            key: url.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Some(Bytes::from(data)))
    }

    pub async fn put(&self, url: &str, data: Bytes) -> EntityResult<()> {
        let record = TileRecord {
            url: url.to_string(),
            data: hex::encode(&data),
        };
        let value = encode(TILES, &record)?;
        self.client.put(TILES, url.to_string(), value).await?;
        Ok(())
    }

    pub async fn delete(&self, url: &str) -> EntityResult<bool> {
        Ok(self.client.delete_all(TILES, vec![url.to_string()]).await? > 0)
    }

    /// Drop every cached tile.
    pub async fn clear(&self) -> EntityResult<()> {
        self.client
            .clear_stores(ClearOptions::Only(vec![TILES.to_string()]))
            .await?;
        Ok(())
    }

    pub async fn count(&self) -> EntityResult<usize> {
        Ok(self.client.count(TILES).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::connect_project_database;
    use carto_store::MemoryEngine;

    const URL: &str = "https://tiles.example.org/3/4/2.png";

    async fn store() -> TileStore {
        let client = Arc::new(StorageClient::new(Arc::new(MemoryEngine::new())));
        connect_project_database(&client, "p1").await.unwrap();
        TileStore::new(client)
    }

    #[tokio::test]
    async fn binary_payload_survives() {
        let store = store().await;
        let payload = Bytes::from_static(&[0x89, b'P', b'N', b'G', 0x00, 0xff]);
        store.put(URL, payload.clone()).await.unwrap();
        assert_eq!(store.get(URL).await.unwrap(), Some(payload));
        assert!(store.get("https://other").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_and_clear() {
        let store = store().await;
        store.put(URL, Bytes::from_static(b"a")).await.unwrap();
        store.put("u2", Bytes::from_static(b"b")).await.unwrap();

        assert!(store.delete(URL).await.unwrap());
        assert!(!store.delete(URL).await.unwrap());
        store.clear().await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
    }
}
