//! Directory-backed database engine.
//!
//! Layout on disk:
//!
//! ```text
//! <root>/<database>/meta.json           version + index definitions
//! <root>/<database>/<store>.store.json  records of one object store
//! ```
//!
//! Every file starts with a header line `carto1 <crc32>` followed by the JSON
//! body. Files are written to a temporary file in the same directory and
//! renamed into place, so a reader only ever observes a complete file.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::engine::{Change, DatabaseEngine};
use crate::error::{StoreError, StoreResult};
use crate::schema::{validate_name, DatabaseImage, IndexSpec, StoreImage};

const HEADER_MAGIC: &str = "carto1";
const META_FILE: &str = "meta.json";
const STORE_SUFFIX: &str = ".store.json";

#[derive(Serialize, Deserialize)]
struct Meta {
    version: u32,
    stores: BTreeMap<String, BTreeMap<String, IndexSpec>>,
}

/// Engine persisting each database as a directory of JSON files.
#[derive(Debug, Clone)]
pub struct FileEngine {
    root: PathBuf,
}

impl FileEngine {
    /// Open (creating if needed) an engine rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn database_dir(&self, name: &str) -> StoreResult<PathBuf> {
        validate_name(name)?;
        Ok(self.root.join(name))
    }
}

/// Files to write (path, body) for one commit. When `keep_stores` is set,
/// store files of any other store are removed afterwards.
struct WritePlan {
    dir: PathBuf,
    writes: Vec<(PathBuf, Vec<u8>)>,
    keep_stores: Option<BTreeSet<String>>,
}

fn store_path(dir: &Path, store: &str) -> PathBuf {
    dir.join(format!("{store}{STORE_SUFFIX}"))
}

fn encode(body: &[u8]) -> Vec<u8> {
    let crc = crc32fast::hash(body);
    let mut out = format!("{HEADER_MAGIC} {crc:08x}\n").into_bytes();
    out.extend_from_slice(body);
    out
}

fn decode(path: &Path, raw: &[u8]) -> StoreResult<Vec<u8>> {
    let corrupt = |reason: &str| StoreError::Corrupt {
        path: path.display().to_string(),
        reason: reason.to_string(),
    };
    let newline = raw
        .iter()
        .position(|b| *b == b'\n')
        .ok_or_else(|| corrupt("missing header"))?;
    let header = std::str::from_utf8(&raw[..newline]).map_err(|_| corrupt("header not utf-8"))?;
    let mut parts = header.split(' ');
    if parts.next() != Some(HEADER_MAGIC) {
        return Err(corrupt("unknown file format"));
    }
    let expected = parts
        .next()
        .and_then(|hex| u32::from_str_radix(hex, 16).ok())
        .ok_or_else(|| corrupt("malformed checksum"))?;
    let body = &raw[newline + 1..];
    let actual = crc32fast::hash(body);
    if actual != expected {
        return Err(corrupt(&format!(
            "checksum mismatch: expected {expected:08x}, got {actual:08x}"
        )));
    }
    Ok(body.to_vec())
}

fn encode_meta(image: &DatabaseImage) -> StoreResult<Vec<u8>> {
    let meta = Meta {
        version: image.version,
        stores: image
            .stores
            .iter()
            .map(|(name, store)| (name.clone(), store.indices.clone()))
            .collect(),
    };
    Ok(encode(&serde_json::to_vec(&meta)?))
}

fn encode_store(store: &StoreImage) -> StoreResult<Vec<u8>> {
    Ok(encode(&serde_json::to_vec(&store.records)?))
}

fn write_atomic(dir: &Path, path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

fn apply_plan(plan: WritePlan) -> std::io::Result<()> {
    fs::create_dir_all(&plan.dir)?;
    for (path, bytes) in &plan.writes {
        write_atomic(&plan.dir, path, bytes)?;
    }
    let Some(keep) = plan.keep_stores else {
        return Ok(());
    };
    for entry in fs::read_dir(&plan.dir)? {
        let path = entry?.path();
        let store = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.strip_suffix(STORE_SUFFIX));
        if store.is_some_and(|store| !keep.contains(store)) {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
    }
    Ok(())
}

fn load_database(dir: &Path) -> StoreResult<Option<DatabaseImage>> {
    let meta_path = dir.join(META_FILE);
    let raw = match fs::read(&meta_path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let meta: Meta = serde_json::from_slice(&decode(&meta_path, &raw)?)?;

    let mut image = DatabaseImage {
        version: meta.version,
        stores: BTreeMap::new(),
    };
    for (name, indices) in meta.stores {
        let path = store_path(dir, &name);
        let records: BTreeMap<String, Value> = match fs::read(&path) {
            Ok(raw) => serde_json::from_slice(&decode(&path, &raw)?)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        image
            .stores
            .insert(name, StoreImage::from_parts(indices, records));
    }
    Ok(Some(image))
}

async fn run_blocking<T, F>(work: F) -> StoreResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> StoreResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| StoreError::Io(std::io::Error::other(e)))?
}

#[async_trait]
impl DatabaseEngine for FileEngine {
    async fn load(&self, name: &str) -> StoreResult<Option<DatabaseImage>> {
        let dir = self.database_dir(name)?;
        run_blocking(move || load_database(&dir)).await
    }

    async fn commit(
        &self,
        name: &str,
        image: &DatabaseImage,
        change: Change<'_>,
    ) -> StoreResult<()> {
        let dir = self.database_dir(name)?;
        let mut plan = WritePlan {
            dir: dir.clone(),
            writes: Vec::new(),
            keep_stores: None,
        };

        // Serialize on the caller's task; only file I/O goes to the blocking pool.
        let touched: Vec<&str> = match change {
            Change::Put { store, .. } | Change::Delete { store, .. } => vec![store],
            Change::Clear { stores } => stores.iter().map(String::as_str).collect(),
            Change::Schema => {
                plan.writes.push((dir.join(META_FILE), encode_meta(image)?));
                plan.keep_stores = Some(image.stores.keys().cloned().collect());
                image.stores.keys().map(String::as_str).collect()
            }
        };
        for store in touched {
            plan.writes
                .push((store_path(&dir, store), encode_store(image.store(store)?)?));
        }

        let files = plan.writes.len();
        run_blocking(move || apply_plan(plan).map_err(StoreError::from)).await?;
        debug!(database = name, files, "committed to disk");
        Ok(())
    }

    async fn drop_database(&self, name: &str) -> StoreResult<bool> {
        let dir = self.database_dir(name)?;
        run_blocking(move || match fs::remove_dir_all(&dir) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        })
        .await
    }

    async fn list_databases(&self) -> StoreResult<Vec<String>> {
        let root = self.root.clone();
        run_blocking(move || {
            let mut names = Vec::new();
            for entry in fs::read_dir(&root)? {
                let entry = entry?;
                if entry.path().join(META_FILE).is_file() {
                    if let Some(name) = entry.file_name().to_str() {
                        names.push(name.to_string());
                    }
                }
            }
            names.sort();
            Ok(names)
        })
        .await
    }

    async fn database_exists(&self, name: &str) -> StoreResult<bool> {
        let dir = self.database_dir(name)?;
        Ok(dir.join(META_FILE).is_file())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn image() -> DatabaseImage {
        let mut image = DatabaseImage {
            version: 3,
            ..Default::default()
        };
        let mut features = StoreImage::default();
        features
            .indices
            .insert("by_layer".into(), IndexSpec::new("layer_id"));
        features.put("f1".into(), json!({"layer_id": "l1"}));
        image.stores.insert("features".into(), features);
        image.stores.insert("layers".into(), StoreImage::default());
        image
    }

    #[tokio::test]
    async fn schema_commit_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let engine = FileEngine::open(dir.path()).unwrap();
        engine.commit("db", &image(), Change::Schema).await.unwrap();

        let loaded = engine.load("db").await.unwrap().expect("database exists");
        assert_eq!(loaded.version, 3);
        let features = loaded.store("features").unwrap();
        assert_eq!(features.len(), 1);
        assert_eq!(
            features.lookup("by_layer", &json!("l1")).unwrap(),
            vec!["f1"]
        );
        assert!(loaded.store("layers").unwrap().is_empty());
    }

    #[tokio::test]
    async fn put_rewrites_only_the_touched_store() {
        let dir = tempfile::tempdir().unwrap();
        let engine = FileEngine::open(dir.path()).unwrap();
        let mut img = image();
        engine.commit("db", &img, Change::Schema).await.unwrap();

        let entries = vec![("l1".to_string(), json!({"name": "Points"}))];
        img.store_mut("layers")
            .unwrap()
            .put("l1".into(), entries[0].1.clone());
        engine
            .commit(
                "db",
                &img,
                Change::Put {
                    store: "layers",
                    entries: &entries,
                },
            )
            .await
            .unwrap();

        let loaded = engine.load("db").await.unwrap().unwrap();
        assert_eq!(
            loaded.store("layers").unwrap().get("l1"),
            Some(&json!({"name": "Points"}))
        );
    }

    #[tokio::test]
    async fn missing_database_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let engine = FileEngine::open(dir.path()).unwrap();
        assert!(engine.load("nothing").await.unwrap().is_none());
        assert!(!engine.database_exists("nothing").await.unwrap());
    }

    #[tokio::test]
    async fn corrupted_store_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        let engine = FileEngine::open(dir.path()).unwrap();
        engine.commit("db", &image(), Change::Schema).await.unwrap();

        let path = dir.path().join("db").join("features.store.json");
        let mut raw = fs::read(&path).unwrap();
        let last = raw.len() - 2;
        raw[last] ^= 0x01;
        fs::write(&path, raw).unwrap();

        let err = engine.load("db").await.unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }

    #[tokio::test]
    async fn schema_commit_removes_dropped_stores() {
        let dir = tempfile::tempdir().unwrap();
        let engine = FileEngine::open(dir.path()).unwrap();
        let mut img = image();
        engine.commit("db", &img, Change::Schema).await.unwrap();
        assert!(dir.path().join("db").join("layers.store.json").exists());

        img.stores.remove("layers");
        engine.commit("db", &img, Change::Schema).await.unwrap();
        assert!(!dir.path().join("db").join("layers.store.json").exists());
        assert!(dir.path().join("db").join("meta.json").exists());
    }

    #[tokio::test]
    async fn store_named_meta_keeps_database_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let engine = FileEngine::open(dir.path()).unwrap();
        let mut img = image();
        img.stores.insert("meta".into(), StoreImage::default());
        engine.commit("db", &img, Change::Schema).await.unwrap();

        let entries = vec![("k".to_string(), json!({"note": "kept"}))];
        img.store_mut("meta").unwrap().put("k".into(), entries[0].1.clone());
        engine
            .commit(
                "db",
                &img,
                Change::Put {
                    store: "meta",
                    entries: &entries,
                },
            )
            .await
            .unwrap();

        let loaded = engine.load("db").await.unwrap().unwrap();
        assert_eq!(loaded.version, 3);
        assert_eq!(loaded.store("features").unwrap().len(), 1);
        assert_eq!(
            loaded.store("meta").unwrap().get("k"),
            Some(&json!({"note": "kept"}))
        );
        assert!(dir.path().join("db").join("meta.store.json").exists());
    }

    #[tokio::test]
    async fn list_and_drop() {
        let dir = tempfile::tempdir().unwrap();
        let engine = FileEngine::open(dir.path()).unwrap();
        engine.commit("b", &image(), Change::Schema).await.unwrap();
        engine.commit("a", &image(), Change::Schema).await.unwrap();
        fs::create_dir_all(dir.path().join("not-a-db")).unwrap();

        assert_eq!(engine.list_databases().await.unwrap(), vec!["a", "b"]);
        assert!(engine.drop_database("a").await.unwrap());
        assert!(!engine.drop_database("a").await.unwrap());
        assert_eq!(engine.list_databases().await.unwrap(), vec!["b"]);
    }

    #[tokio::test]
    async fn unsafe_database_names_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let engine = FileEngine::open(dir.path()).unwrap();
        let err = engine.load("../outside").await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidName(_)));
    }
}
