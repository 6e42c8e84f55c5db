use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{StoreError, StoreResult};

/// Definition of a secondary index: equality lookups on one record field.
///
/// `field` is a dot-separated path into the JSON record (`"layer_id"`,
/// `"properties.kind"`). Records where the path is missing are not indexed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpec {
    pub field: String,
}

impl IndexSpec {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
        }
    }

    /// Extract the indexed value from a record.
    pub fn extract<'a>(&self, record: &'a Value) -> Option<&'a Value> {
        self.field
            .split('.')
            .try_fold(record, |current, segment| current.get(segment))
            .filter(|v| !v.is_null())
    }
}

/// Canonical lookup key of an indexed value.
fn index_key(value: &Value) -> String {
    value.to_string()
}

/// One named object store: records by primary key plus its indices.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StoreImage {
    #[serde(default)]
    pub indices: BTreeMap<String, IndexSpec>,
    #[serde(default)]
    pub records: BTreeMap<String, Value>,
    /// index name -> indexed value -> primary keys. Rebuilt on load.
    #[serde(skip)]
    lookups: BTreeMap<String, BTreeMap<String, BTreeSet<String>>>,
}

impl StoreImage {
    /// A store holding `records` under `indices`, with lookups built.
    pub fn from_parts(
        indices: BTreeMap<String, IndexSpec>,
        records: BTreeMap<String, Value>,
    ) -> Self {
        let mut store = Self {
            indices,
            records,
            lookups: BTreeMap::new(),
        };
        store.rebuild_indices();
        store
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.records.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.records.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Insert or replace a record, returning the previous value.
    pub fn put(&mut self, key: String, value: Value) -> Option<Value> {
        for (name, spec) in &self.indices {
            if let Some(indexed) = spec.extract(&value) {
                self.lookups
                    .entry(name.clone())
                    .or_default()
                    .entry(index_key(indexed))
                    .or_default()
                    .insert(key.clone());
            }
        }
        let previous = self.records.insert(key.clone(), value);
        if let Some(old) = &previous {
            self.unindex(&key, old, true);
        }
        previous
    }

    /// Remove a record, returning it if it existed.
    pub fn delete(&mut self, key: &str) -> Option<Value> {
        let removed = self.records.remove(key)?;
        self.unindex(key, &removed, false);
        Some(removed)
    }

    /// Drop every record. Index definitions are kept.
    pub fn clear(&mut self) -> BTreeMap<String, Value> {
        self.lookups.clear();
        std::mem::take(&mut self.records)
    }

    /// Restore records previously taken by [`StoreImage::clear`].
    pub fn restore(&mut self, records: BTreeMap<String, Value>) {
        self.records = records;
        self.rebuild_indices();
    }

    /// Primary keys whose indexed field equals `value`.
    pub fn lookup(&self, index: &str, value: &Value) -> Option<Vec<&str>> {
        if !self.indices.contains_key(index) {
            return None;
        }
        let keys = self
            .lookups
            .get(index)
            .and_then(|by_value| by_value.get(&index_key(value)))
            .map(|keys| keys.iter().map(String::as_str).collect())
            .unwrap_or_default();
        Some(keys)
    }

    pub fn has_index(&self, index: &str) -> bool {
        self.indices.contains_key(index)
    }

    /// Recompute every index from the records.
    pub fn rebuild_indices(&mut self) {
        self.lookups.clear();
        for (name, spec) in &self.indices {
            let by_value = self.lookups.entry(name.clone()).or_default();
            for (key, record) in &self.records {
                if let Some(indexed) = spec.extract(record) {
                    by_value
                        .entry(index_key(indexed))
                        .or_default()
                        .insert(key.clone());
                }
            }
        }
    }

    /// Remove `key` from the lookups of `old`. When `keep_current` is set,
    /// entries that the current record still maps to are left alone.
    fn unindex(&mut self, key: &str, old: &Value, keep_current: bool) {
        for (name, spec) in &self.indices {
            let Some(old_indexed) = spec.extract(old) else {
                continue;
            };
            let old_key = index_key(old_indexed);
            if keep_current {
                let current = self.records.get(key).and_then(|r| spec.extract(r));
                if current.map(index_key).as_deref() == Some(old_key.as_str()) {
                    continue;
                }
            }
            if let Some(by_value) = self.lookups.get_mut(name) {
                if let Some(keys) = by_value.get_mut(&old_key) {
                    keys.remove(key);
                    if keys.is_empty() {
                        by_value.remove(&old_key);
                    }
                }
            }
        }
    }
}

/// The full contents of one database: schema version and object stores.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DatabaseImage {
    pub version: u32,
    #[serde(default)]
    pub stores: BTreeMap<String, StoreImage>,
}

impl DatabaseImage {
    pub fn store(&self, name: &str) -> StoreResult<&StoreImage> {
        self.stores
            .get(name)
            .ok_or_else(|| StoreError::UnknownStore(name.to_string()))
    }

    pub fn store_mut(&mut self, name: &str) -> StoreResult<&mut StoreImage> {
        self.stores
            .get_mut(name)
            .ok_or_else(|| StoreError::UnknownStore(name.to_string()))
    }

    /// Rebuild the in-memory indices of every store.
    pub fn rebuild_indices(&mut self) {
        for store in self.stores.values_mut() {
            store.rebuild_indices();
        }
    }
}

/// Schema mutations available while a database is being upgraded.
pub struct UpgradeTx<'a> {
    image: &'a mut DatabaseImage,
    old_version: u32,
    new_version: u32,
}

impl<'a> UpgradeTx<'a> {
    pub(crate) fn new(image: &'a mut DatabaseImage, old_version: u32, new_version: u32) -> Self {
        Self {
            image,
            old_version,
            new_version,
        }
    }

    /// Version found on disk; `0` for a database that did not exist.
    pub fn old_version(&self) -> u32 {
        self.old_version
    }

    pub fn new_version(&self) -> u32 {
        self.new_version
    }

    pub fn has_store(&self, name: &str) -> bool {
        self.image.stores.contains_key(name)
    }

    /// Create an object store. Returns `false` if it already existed.
    pub fn create_store(&mut self, name: &str) -> StoreResult<bool> {
        validate_name(name)?;
        if self.image.stores.contains_key(name) {
            return Ok(false);
        }
        self.image
            .stores
            .insert(name.to_string(), StoreImage::default());
        Ok(true)
    }

    /// Delete an object store and all of its records.
    pub fn delete_store(&mut self, name: &str) -> bool {
        self.image.stores.remove(name).is_some()
    }

    /// Create (or redefine) a secondary index and index existing records.
    pub fn create_index(&mut self, store: &str, index: &str, field: &str) -> StoreResult<()> {
        validate_name(index)?;
        let image = self.image.store_mut(store)?;
        image
            .indices
            .insert(index.to_string(), IndexSpec::new(field));
        image.rebuild_indices();
        Ok(())
    }
}

/// Callback run by `connect` when the stored version is older than requested.
pub type SchemaUpgrade = dyn Fn(&mut UpgradeTx<'_>) -> StoreResult<()> + Send + Sync;

/// Database, store and index names double as file names on disk.
pub fn validate_name(name: &str) -> StoreResult<()> {
    let valid = !name.is_empty()
        && name.len() <= 128
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidName(name.to_string()))
    }
}
