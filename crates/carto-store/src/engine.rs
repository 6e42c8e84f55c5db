use async_trait::async_trait;
use serde_json::Value;

use crate::error::StoreResult;
use crate::schema::DatabaseImage;

/// A committed mutation, described to the engine that persists it.
///
/// The engine also receives the connected [`DatabaseImage`] with the change
/// already applied, so backends that rewrite whole stores can do so, while
/// backends that patch incrementally can replay the change itself.
#[derive(Clone, Copy, Debug)]
pub enum Change<'a> {
    /// Records inserted or replaced in one store.
    Put {
        store: &'a str,
        entries: &'a [(String, Value)],
    },
    /// Records deleted from one store.
    Delete { store: &'a str, keys: &'a [String] },
    /// Every record of the listed stores removed.
    Clear { stores: &'a [String] },
    /// Version, store set or index definitions changed.
    Schema,
}

/// Durable backend holding named databases.
///
/// Implementations must make each `commit` atomic per store: after a failed
/// commit, a subsequent `load` must not observe the change.
#[async_trait]
pub trait DatabaseEngine: Send + Sync + std::fmt::Debug {
    /// Load a database image. Returns `Ok(None)` if it does not exist.
    async fn load(&self, name: &str) -> StoreResult<Option<DatabaseImage>>;

    /// Persist a change made to the connected database.
    async fn commit(&self, name: &str, image: &DatabaseImage, change: Change<'_>)
        -> StoreResult<()>;

    /// Delete a database. Returns `true` if it existed.
    async fn drop_database(&self, name: &str) -> StoreResult<bool>;

    /// Names of all databases, sorted.
    async fn list_databases(&self) -> StoreResult<Vec<String>>;

    /// Check whether a database exists.
    async fn database_exists(&self, name: &str) -> StoreResult<bool> {
        Ok(self.list_databases().await?.iter().any(|n| n == name))
    }
}
