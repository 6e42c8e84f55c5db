use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::engine::{Change, DatabaseEngine};
use crate::error::{StoreError, StoreResult};
use crate::schema::{validate_name, DatabaseImage, SchemaUpgrade, UpgradeTx};

/// Identifies one connection of a [`StorageClient`].
///
/// Every `connect` mints a new token. Committers capture the token when they
/// start and present it before writing, so a write scheduled against a
/// previous project is rejected instead of landing in the current one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionToken {
    database: Arc<str>,
    epoch: u64,
}

impl ConnectionToken {
    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }
}

/// Which object stores `clear_stores` empties.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum ClearOptions {
    #[default]
    All,
    Only(Vec<String>),
    Except(Vec<String>),
}

impl ClearOptions {
    fn selects(&self, store: &str) -> bool {
        match self {
            Self::All => true,
            Self::Only(names) => names.iter().any(|n| n == store),
            Self::Except(names) => !names.iter().any(|n| n == store),
        }
    }
}

struct Connection {
    token: ConnectionToken,
    image: DatabaseImage,
}

/// Async CRUD surface over the object stores of one project database.
///
/// Only one database is connected at a time: connecting to another one
/// first closes the current connection. All operations are serialized
/// through one async lock, so writes from a single committer are applied in
/// submission order and every batch is applied atomically: if the engine
/// rejects the commit, the in-memory image is rolled back and no key of the
/// batch becomes visible.
pub struct StorageClient {
    engine: Arc<dyn DatabaseEngine>,
    connection: Mutex<Option<Connection>>,
    current: RwLock<Option<ConnectionToken>>,
    epochs: AtomicU64,
}

impl StorageClient {
    pub fn new(engine: Arc<dyn DatabaseEngine>) -> Self {
        Self {
            engine,
            connection: Mutex::new(None),
            current: RwLock::new(None),
            epochs: AtomicU64::new(0),
        }
    }

    pub fn engine(&self) -> &Arc<dyn DatabaseEngine> {
        &self.engine
    }

    // -----------------------------------------------------------------------
    // Connection lifecycle
    // -----------------------------------------------------------------------

    /// Open database `name` at schema `version`.
    ///
    /// Reconnecting to the database that is already open returns the current
    /// token unchanged. Connecting to any other database closes the current
    /// one first. If the stored version is older than `version`, `upgrade`
    /// runs and the new schema is committed before the connection is
    /// published; if it is newer, the connection fails with
    /// [`StoreError::VersionConflict`].
    pub async fn connect(
        &self,
        name: &str,
        version: u32,
        upgrade: &SchemaUpgrade,
    ) -> StoreResult<ConnectionToken> {
        validate_name(name)?;
        let mut guard = self.connection.lock().await;

        if let Some(open) = guard.as_ref() {
            if open.token.database() == name && open.image.version == version {
                return Ok(open.token.clone());
            }
            info!(database = open.token.database(), "closing connection before switching database");
            self.close(&mut guard);
        }

        let mut image = self.engine.load(name).await?.unwrap_or_default();
        if image.version > version {
            return Err(StoreError::VersionConflict {
                database: name.to_string(),
                requested: version,
                found: image.version,
            });
        }
        if image.version < version {
            let old_version = image.version;
            let mut upgraded = image.clone();
            {
                let mut tx = UpgradeTx::new(&mut upgraded, old_version, version);
                upgrade(&mut tx)?;
            }
            upgraded.version = version;
            self.engine.commit(name, &upgraded, Change::Schema).await?;
            info!(database = name, from = old_version, to = version, "schema upgraded");
            image = upgraded;
        }
        image.rebuild_indices();

        let token = ConnectionToken {
            database: Arc::from(name),
            epoch: self.epochs.fetch_add(1, Ordering::SeqCst) + 1,
        };
        *self.current.write().expect("lock poisoned") = Some(token.clone());
        *guard = Some(Connection {
            token: token.clone(),
            image,
        });
        info!(database = name, epoch = token.epoch, "connected");
        Ok(token)
    }

    /// Close the current connection. Returns `false` if none was open.
    pub async fn disconnect(&self) -> bool {
        let mut guard = self.connection.lock().await;
        self.close(&mut guard)
    }

    fn close(&self, slot: &mut Option<Connection>) -> bool {
        let Some(open) = slot.take() else {
            return false;
        };
        *self.current.write().expect("lock poisoned") = None;
        info!(database = open.token.database(), epoch = open.token.epoch, "disconnected");
        true
    }

    /// Token of the current connection, if any.
    pub fn token(&self) -> Option<ConnectionToken> {
        self.current.read().expect("lock poisoned").clone()
    }

    pub fn is_connected(&self) -> bool {
        self.current.read().expect("lock poisoned").is_some()
    }

    /// Name of the connected database, if any.
    pub fn database_name(&self) -> Option<String> {
        self.token().map(|t| t.database().to_string())
    }

    /// Fail unless `token` belongs to the current connection.
    pub fn check(&self, token: &ConnectionToken) -> StoreResult<()> {
        match self.current.read().expect("lock poisoned").as_ref() {
            Some(current) if current == token => Ok(()),
            Some(_) => Err(StoreError::StaleConnection {
                database: token.database().to_string(),
                epoch: token.epoch,
            }),
            None => Err(StoreError::NotConnected),
        }
    }

    /// Delete a database. The connection is closed first if it is the one
    /// being dropped.
    pub async fn drop_database(&self, name: &str) -> StoreResult<bool> {
        let mut guard = self.connection.lock().await;
        if guard.as_ref().is_some_and(|c| c.token.database() == name) {
            self.close(&mut guard);
        }
        let existed = self.engine.drop_database(name).await?;
        info!(database = name, existed, "database dropped");
        Ok(existed)
    }

    pub async fn list_databases(&self) -> StoreResult<Vec<String>> {
        self.engine.list_databases().await
    }

    pub async fn database_exists(&self, name: &str) -> StoreResult<bool> {
        self.engine.database_exists(name).await
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    pub async fn get(&self, store: &str, key: &str) -> StoreResult<Option<Value>> {
        let guard = self.connection.lock().await;
        let conn = guard.as_ref().ok_or(StoreError::NotConnected)?;
        Ok(conn.image.store(store)?.get(key).cloned())
    }

    /// Read several keys. The result is positional: missing keys yield `None`.
    pub async fn get_all(&self, store: &str, keys: &[String]) -> StoreResult<Vec<Option<Value>>> {
        let guard = self.connection.lock().await;
        let conn = guard.as_ref().ok_or(StoreError::NotConnected)?;
        let image = conn.image.store(store)?;
        Ok(keys.iter().map(|k| image.get(k).cloned()).collect())
    }

    /// Records whose `index` field equals `value`, in primary-key order.
    pub async fn get_all_by_index(
        &self,
        store: &str,
        index: &str,
        value: &Value,
    ) -> StoreResult<Vec<Value>> {
        let guard = self.connection.lock().await;
        let conn = guard.as_ref().ok_or(StoreError::NotConnected)?;
        let image = conn.image.store(store)?;
        let keys = image
            .lookup(index, value)
            .ok_or_else(|| StoreError::UnknownIndex {
                store: store.to_string(),
                index: index.to_string(),
            })?;
        Ok(keys
            .into_iter()
            .filter_map(|k| image.get(k).cloned())
            .collect())
    }

    pub async fn exists(&self, store: &str, key: &str) -> StoreResult<bool> {
        let guard = self.connection.lock().await;
        let conn = guard.as_ref().ok_or(StoreError::NotConnected)?;
        Ok(conn.image.store(store)?.contains(key))
    }

    /// All primary keys of a store, sorted.
    pub async fn keys(&self, store: &str) -> StoreResult<Vec<String>> {
        let guard = self.connection.lock().await;
        let conn = guard.as_ref().ok_or(StoreError::NotConnected)?;
        Ok(conn.image.store(store)?.records.keys().cloned().collect())
    }

    pub async fn count(&self, store: &str) -> StoreResult<usize> {
        let guard = self.connection.lock().await;
        let conn = guard.as_ref().ok_or(StoreError::NotConnected)?;
        Ok(conn.image.store(store)?.len())
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    pub async fn put(&self, store: &str, key: String, value: Value) -> StoreResult<()> {
        self.put_all(store, vec![(key, value)]).await
    }

    /// Insert or replace a batch of records atomically.
    pub async fn put_all(&self, store: &str, entries: Vec<(String, Value)>) -> StoreResult<()> {
        self.put_all_inner(None, store, entries).await
    }

    /// [`put_all`](Self::put_all) on behalf of the connection `token` was
    /// minted for. The token is verified while the connection lock is held,
    /// so a batch queued behind a project switch fails with
    /// [`StoreError::StaleConnection`] instead of writing into the new
    /// database.
    pub async fn put_all_as(
        &self,
        token: &ConnectionToken,
        store: &str,
        entries: Vec<(String, Value)>,
    ) -> StoreResult<()> {
        self.put_all_inner(Some(token), store, entries).await
    }

    async fn put_all_inner(
        &self,
        token: Option<&ConnectionToken>,
        store: &str,
        entries: Vec<(String, Value)>,
    ) -> StoreResult<()> {
        if entries.is_empty() {
            return Ok(());
        }
        if let Some((key, _)) = entries.iter().find(|(k, _)| k.is_empty()) {
            return Err(StoreError::InvalidKey(key.clone()));
        }

        let mut guard = self.connection.lock().await;
        let conn = Self::open_as(&mut guard, token)?;
        let image = conn.image.store_mut(store)?;

        let mut previous = Vec::with_capacity(entries.len());
        for (key, value) in &entries {
            previous.push((key.clone(), image.put(key.clone(), value.clone())));
        }

        let change = Change::Put {
            store,
            entries: &entries,
        };
        if let Err(err) = self
            .engine
            .commit(conn.token.database(), &conn.image, change)
            .await
        {
            warn!(store, count = entries.len(), error = %err, "batch put rejected, rolling back");
            let image = conn.image.store_mut(store)?;
            for (key, old) in previous.into_iter().rev() {
                match old {
                    Some(value) => {
                        image.put(key, value);
                    }
                    None => {
                        image.delete(&key);
                    }
                }
            }
            return Err(err);
        }
        debug!(store, count = entries.len(), "batch put committed");
        Ok(())
    }

    /// Delete a batch of keys atomically. Missing keys are ignored.
    pub async fn delete_all(&self, store: &str, keys: Vec<String>) -> StoreResult<usize> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut guard = self.connection.lock().await;
        let conn = Self::open_as(&mut guard, None)?;
        Self::delete_locked(&self.engine, conn, store, keys).await
    }

    /// [`delete_all`](Self::delete_all), verifying `token` under the
    /// connection lock like [`put_all_as`](Self::put_all_as).
    pub async fn delete_all_as(
        &self,
        token: &ConnectionToken,
        store: &str,
        keys: Vec<String>,
    ) -> StoreResult<usize> {
        let mut guard = self.connection.lock().await;
        let conn = Self::open_as(&mut guard, Some(token))?;
        if keys.is_empty() {
            return Ok(0);
        }
        Self::delete_locked(&self.engine, conn, store, keys).await
    }

    /// The open connection, provided it is the one `token` names.
    fn open_as<'a>(
        slot: &'a mut Option<Connection>,
        token: Option<&ConnectionToken>,
    ) -> StoreResult<&'a mut Connection> {
        let conn = slot.as_mut().ok_or(StoreError::NotConnected)?;
        match token {
            Some(token) if *token != conn.token => Err(StoreError::StaleConnection {
                database: token.database().to_string(),
                epoch: token.epoch,
            }),
            _ => Ok(conn),
        }
    }

    /// Delete every record whose `index` field equals `value`.
    pub async fn delete_by_index(
        &self,
        store: &str,
        index: &str,
        value: &Value,
    ) -> StoreResult<usize> {
        let mut guard = self.connection.lock().await;
        let conn = guard.as_mut().ok_or(StoreError::NotConnected)?;
        let keys: Vec<String> = conn
            .image
            .store(store)?
            .lookup(index, value)
            .ok_or_else(|| StoreError::UnknownIndex {
                store: store.to_string(),
                index: index.to_string(),
            })?
            .into_iter()
            .map(str::to_string)
            .collect();
        if keys.is_empty() {
            return Ok(0);
        }
        Self::delete_locked(&self.engine, conn, store, keys).await
    }

    async fn delete_locked(
        engine: &Arc<dyn DatabaseEngine>,
        conn: &mut Connection,
        store: &str,
        keys: Vec<String>,
    ) -> StoreResult<usize> {
        let image = conn.image.store_mut(store)?;
        let mut removed = Vec::new();
        for key in &keys {
            if let Some(value) = image.delete(key) {
                removed.push((key.clone(), value));
            }
        }
        if removed.is_empty() {
            return Ok(0);
        }

        let change = Change::Delete {
            store,
            keys: &keys,
        };
        if let Err(err) = engine
            .commit(conn.token.database(), &conn.image, change)
            .await
        {
            warn!(store, count = keys.len(), error = %err, "batch delete rejected, rolling back");
            let image = conn.image.store_mut(store)?;
            for (key, value) in removed {
                image.put(key, value);
            }
            return Err(err);
        }
        debug!(store, count = removed.len(), "batch delete committed");
        Ok(removed.len())
    }

    /// Remove every record from the selected stores.
    pub async fn clear_stores(&self, options: ClearOptions) -> StoreResult<()> {
        let mut guard = self.connection.lock().await;
        let conn = guard.as_mut().ok_or(StoreError::NotConnected)?;
        if let ClearOptions::Only(names) = &options {
            for name in names {
                conn.image.store(name)?;
            }
        }

        let selected: Vec<String> = conn
            .image
            .stores
            .keys()
            .filter(|name| options.selects(name))
            .cloned()
            .collect();
        let mut taken = Vec::with_capacity(selected.len());
        for name in &selected {
            taken.push((name.clone(), conn.image.store_mut(name)?.clear()));
        }

        let change = Change::Clear { stores: &selected };
        if let Err(err) = self
            .engine
            .commit(conn.token.database(), &conn.image, change)
            .await
        {
            warn!(error = %err, "clear rejected, rolling back");
            for (name, records) in taken {
                conn.image.store_mut(&name)?.restore(records);
            }
            return Err(err);
        }
        info!(database = conn.token.database(), stores = ?selected, "stores cleared");
        Ok(())
    }
}

impl std::fmt::Debug for StorageClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageClient")
            .field("engine", &self.engine)
            .field("connection", &self.token())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryEngine;
    use serde_json::json;

    fn schema(tx: &mut UpgradeTx<'_>) -> StoreResult<()> {
        tx.create_store("layers")?;
        tx.create_store("features")?;
        tx.create_index("features", "layer_id", "layer_id")?;
        Ok(())
    }

    fn client() -> (Arc<MemoryEngine>, StorageClient) {
        let engine = Arc::new(MemoryEngine::new());
        let client = StorageClient::new(engine.clone());
        (engine, client)
    }

    fn feature(layer: &str) -> Value {
        json!({"layer_id": layer, "geometry": null})
    }

    #[tokio::test]
    async fn operations_require_connection() {
        let (_, client) = client();
        assert!(matches!(
            client.get("layers", "l1").await,
            Err(StoreError::NotConnected)
        ));
        assert!(matches!(
            client.put("layers", "l1".into(), json!({})).await,
            Err(StoreError::NotConnected)
        ));
        assert!(!client.disconnect().await);
    }

    #[tokio::test]
    async fn connect_runs_upgrade_once() {
        let (engine, client) = client();
        let token = client.connect("p1", 1, &schema).await.unwrap();
        assert_eq!(token.database(), "p1");
        assert!(engine.database_exists("p1").await.unwrap());

        // Same database, same version: idempotent.
        let again = client.connect("p1", 1, &schema).await.unwrap();
        assert_eq!(again, token);

        assert!(client.disconnect().await);
        let failing = |_: &mut UpgradeTx<'_>| -> StoreResult<()> {
            Err(StoreError::Upgrade("must not run".into()))
        };
        client.connect("p1", 1, &failing).await.unwrap();
    }

    #[tokio::test]
    async fn newer_stored_version_is_a_conflict() {
        let (_, client) = client();
        client.connect("p1", 2, &schema).await.unwrap();
        client.disconnect().await;
        let err = client.connect("p1", 1, &schema).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::VersionConflict {
                requested: 1,
                found: 2,
                ..
            }
        ));
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn upgrade_sees_old_version() {
        let (_, client) = client();
        client.connect("p1", 1, &schema).await.unwrap();
        client.disconnect().await;

        let v2 = |tx: &mut UpgradeTx<'_>| -> StoreResult<()> {
            assert_eq!(tx.old_version(), 1);
            tx.create_store("tiles")?;
            Ok(())
        };
        client.connect("p1", 2, &v2).await.unwrap();
        assert_eq!(client.count("tiles").await.unwrap(), 0);
        assert_eq!(client.count("layers").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn put_get_exists_round_trip() {
        let (_, client) = client();
        client.connect("p1", 1, &schema).await.unwrap();
        client
            .put_all(
                "layers",
                vec![
                    ("l1".into(), json!({"name": "a"})),
                    ("l2".into(), json!({"name": "b"})),
                ],
            )
            .await
            .unwrap();

        assert_eq!(
            client.get("layers", "l1").await.unwrap(),
            Some(json!({"name": "a"}))
        );
        assert!(client.get("layers", "nope").await.unwrap().is_none());
        assert!(client.exists("layers", "l2").await.unwrap());
        let all = client
            .get_all("layers", &["l2".into(), "zz".into()])
            .await
            .unwrap();
        assert_eq!(all, vec![Some(json!({"name": "b"})), None]);
        assert_eq!(client.keys("layers").await.unwrap(), vec!["l1", "l2"]);
    }

    #[tokio::test]
    async fn unknown_store_is_an_error() {
        let (_, client) = client();
        client.connect("p1", 1, &schema).await.unwrap();
        assert!(matches!(
            client.get("nope", "k").await,
            Err(StoreError::UnknownStore(_))
        ));
    }

    #[tokio::test]
    async fn empty_key_is_rejected() {
        let (_, client) = client();
        client.connect("p1", 1, &schema).await.unwrap();
        let err = client
            .put("layers", String::new(), json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidKey(_)));
    }

    #[tokio::test]
    async fn index_lookup_and_delete() {
        let (_, client) = client();
        client.connect("p1", 1, &schema).await.unwrap();
        client
            .put_all(
                "features",
                vec![
                    ("f1".into(), feature("l1")),
                    ("f2".into(), feature("l1")),
                    ("f3".into(), feature("l2")),
                ],
            )
            .await
            .unwrap();

        let l1 = client
            .get_all_by_index("features", "layer_id", &json!("l1"))
            .await
            .unwrap();
        assert_eq!(l1.len(), 2);

        let removed = client
            .delete_by_index("features", "layer_id", &json!("l1"))
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(client.count("features").await.unwrap(), 1);

        assert!(matches!(
            client
                .get_all_by_index("features", "missing", &json!("l1"))
                .await,
            Err(StoreError::UnknownIndex { .. })
        ));
    }

    #[tokio::test]
    async fn failed_put_is_rolled_back() {
        let (engine, client) = client();
        client.connect("p1", 1, &schema).await.unwrap();
        client
            .put("layers", "l1".into(), json!({"name": "original"}))
            .await
            .unwrap();

        engine.set_fail_commits(true);
        let err = client
            .put_all(
                "layers",
                vec![
                    ("l1".into(), json!({"name": "changed"})),
                    ("l2".into(), json!({"name": "new"})),
                ],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Io(_)));

        assert_eq!(
            client.get("layers", "l1").await.unwrap(),
            Some(json!({"name": "original"}))
        );
        assert!(!client.exists("layers", "l2").await.unwrap());
    }

    #[tokio::test]
    async fn failed_delete_is_rolled_back() {
        let (engine, client) = client();
        client.connect("p1", 1, &schema).await.unwrap();
        client
            .put_all("features", vec![("f1".into(), feature("l1"))])
            .await
            .unwrap();

        engine.set_fail_commits(true);
        assert!(client
            .delete_all("features", vec!["f1".into()])
            .await
            .is_err());
        engine.set_fail_commits(false);

        let by_layer = client
            .get_all_by_index("features", "layer_id", &json!("l1"))
            .await
            .unwrap();
        assert_eq!(by_layer.len(), 1);
    }

    #[tokio::test]
    async fn clear_stores_respects_options() {
        let (_, client) = client();
        client.connect("p1", 1, &schema).await.unwrap();
        client
            .put("layers", "l1".into(), json!({}))
            .await
            .unwrap();
        client
            .put("features", "f1".into(), feature("l1"))
            .await
            .unwrap();

        client
            .clear_stores(ClearOptions::Except(vec!["layers".into()]))
            .await
            .unwrap();
        assert_eq!(client.count("layers").await.unwrap(), 1);
        assert_eq!(client.count("features").await.unwrap(), 0);

        assert!(client
            .clear_stores(ClearOptions::Only(vec!["nope".into()]))
            .await
            .is_err());

        client.clear_stores(ClearOptions::All).await.unwrap();
        assert_eq!(client.count("layers").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn switching_databases_invalidates_tokens() {
        let (_, client) = client();
        let a = client.connect("a", 1, &schema).await.unwrap();
        assert!(client.check(&a).is_ok());

        let b = client.connect("b", 1, &schema).await.unwrap();
        assert_ne!(a, b);
        assert!(matches!(
            client.check(&a),
            Err(StoreError::StaleConnection { .. })
        ));
        assert_eq!(client.database_name().as_deref(), Some("b"));

        client.disconnect().await;
        assert!(matches!(client.check(&b), Err(StoreError::NotConnected)));
    }

    #[tokio::test]
    async fn writes_under_a_stale_token_are_rejected() {
        let (_, client) = client();
        let a = client.connect("a", 1, &schema).await.unwrap();
        client
            .put_all_as(&a, "layers", vec![("la".into(), json!({}))])
            .await
            .unwrap();

        let b = client.connect("b", 1, &schema).await.unwrap();
        let err = client
            .put_all_as(&a, "layers", vec![("stray".into(), json!({}))])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::StaleConnection { epoch, .. } if epoch == a.epoch()));
        assert!(matches!(
            client.delete_all_as(&a, "layers", vec!["lb".into()]).await,
            Err(StoreError::StaleConnection { .. })
        ));
        assert_eq!(client.count("layers").await.unwrap(), 0);

        client
            .put_all_as(&b, "layers", vec![("lb".into(), json!({}))])
            .await
            .unwrap();
        assert_eq!(client.delete_all_as(&b, "layers", vec!["lb".into()]).await.unwrap(), 1);

        client.disconnect().await;
        assert!(matches!(
            client.put_all_as(&b, "layers", vec![("lb".into(), json!({}))]).await,
            Err(StoreError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn reconnect_preserves_data_across_sessions() {
        let (_, client) = client();
        client.connect("a", 1, &schema).await.unwrap();
        client
            .put("layers", "la".into(), json!({"name": "from a"}))
            .await
            .unwrap();

        client.connect("b", 1, &schema).await.unwrap();
        client
            .put("layers", "lb".into(), json!({"name": "from b"}))
            .await
            .unwrap();
        assert!(!client.exists("layers", "la").await.unwrap());

        client.connect("a", 1, &schema).await.unwrap();
        assert_eq!(client.keys("layers").await.unwrap(), vec!["la"]);
    }

    #[tokio::test]
    async fn drop_connected_database_disconnects() {
        let (engine, client) = client();
        client.connect("p1", 1, &schema).await.unwrap();
        assert!(client.drop_database("p1").await.unwrap());
        assert!(!client.is_connected());
        assert!(engine.is_empty());
        assert!(client.list_databases().await.unwrap().is_empty());
    }
}
