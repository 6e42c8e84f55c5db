use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;

use crate::engine::{Change, DatabaseEngine};
use crate::error::{StoreError, StoreResult};
use crate::schema::DatabaseImage;

/// In-memory, HashMap-based database engine.
///
/// Intended for tests and embedding. Databases outlive client connections,
/// so disconnecting and reconnecting within one process sees the same data.
/// Commits can be made to fail on demand to exercise error paths.
pub struct MemoryEngine {
    databases: RwLock<HashMap<String, DatabaseImage>>,
    fail_commits: AtomicBool,
}

impl MemoryEngine {
    /// Create a new engine with no databases.
    pub fn new() -> Self {
        Self {
            databases: RwLock::new(HashMap::new()),
            fail_commits: AtomicBool::new(false),
        }
    }

    /// Make every subsequent commit fail with an I/O error until reset.
    pub fn set_fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }

    /// Number of databases currently held.
    pub fn len(&self) -> usize {
        self.databases.read().expect("lock poisoned").len()
    }

    /// Returns `true` if no database exists.
    pub fn is_empty(&self) -> bool {
        self.databases.read().expect("lock poisoned").is_empty()
    }

    /// Number of records in `store` of database `name`, as last committed.
    pub fn record_count(&self, name: &str, store: &str) -> Option<usize> {
        let databases = self.databases.read().expect("lock poisoned");
        databases
            .get(name)
            .and_then(|db| db.stores.get(store))
            .map(|s| s.len())
    }
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DatabaseEngine for MemoryEngine {
    async fn load(&self, name: &str) -> StoreResult<Option<DatabaseImage>> {
        let databases = self.databases.read().expect("lock poisoned");
        Ok(databases.get(name).cloned())
    }

    async fn commit(
        &self,
        name: &str,
        image: &DatabaseImage,
        change: Change<'_>,
    ) -> StoreResult<()> {
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(StoreError::Io(std::io::Error::other(
                "injected commit failure",
            )));
        }

        let mut databases = self.databases.write().expect("lock poisoned");
        // Schema changes replace the whole image; record changes are replayed.
        if matches!(change, Change::Schema) || !databases.contains_key(name) {
            databases.insert(name.to_string(), image.clone());
            return Ok(());
        }
        let Some(db) = databases.get_mut(name) else {
            return Ok(());
        };

        match change {
            Change::Put { store, entries } => {
                let target = db.store_mut(store)?;
                for (key, value) in entries {
                    target.put(key.clone(), value.clone());
                }
            }
            Change::Delete { store, keys } => {
                let target = db.store_mut(store)?;
                for key in keys {
                    target.delete(key);
                }
            }
            Change::Clear { stores } => {
                for store in stores {
                    db.store_mut(store)?.clear();
                }
            }
            Change::Schema => {}
        }
        Ok(())
    }

    async fn drop_database(&self, name: &str) -> StoreResult<bool> {
        let mut databases = self.databases.write().expect("lock poisoned");
        Ok(databases.remove(name).is_some())
    }

    async fn list_databases(&self) -> StoreResult<Vec<String>> {
        let databases = self.databases.read().expect("lock poisoned");
        let mut names: Vec<String> = databases.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn database_exists(&self, name: &str) -> StoreResult<bool> {
        let databases = self.databases.read().expect("lock poisoned");
        Ok(databases.contains_key(name))
    }
}

impl std::fmt::Debug for MemoryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryEngine")
            .field("database_count", &self.len())
            .finish()
    }
}
