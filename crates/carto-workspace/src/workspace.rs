//! The editing session: which project is open and what keeps it persisted.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use carto_entities::{connect_project_database, Entity, EntityStores};
use carto_history::{Changeset, ChangesetId, HistoryEngine};
use carto_store::{DatabaseEngine, FileEngine, MemoryEngine, StorageClient};
use carto_sync::{
    BridgeOptions, FeatureCollection, FeatureWatcher, PersistenceBridge, SnapshotStore,
};
use carto_types::{
    HistoryKey, Layer, LayerDocument, LayerId, Layout, ProjectDocument, ProjectId,
    ProjectRecord, SharedView,
};

use crate::config::WorkspaceConfig;
use crate::error::{WorkspaceError, WorkspaceResult};
use crate::state::{
    select_layers, select_layouts, select_record, select_shared_views, ProjectState,
};

/// Live sources of the open project.
///
/// The reactive state and the feature collections are owned here and
/// mutated by callers; the workspace only observes them.
pub struct ProjectSources {
    state: Arc<SnapshotStore<ProjectState>>,
    collections: RwLock<HashMap<LayerId, Arc<FeatureCollection>>>,
}

impl ProjectSources {
    /// Build the sources of `document`: one collection per vector layer.
    pub fn from_document(document: &ProjectDocument) -> Self {
        let collections = document
            .layers
            .iter()
            .filter(|l| l.layer.is_vector())
            .map(|l| {
                let collection =
                    FeatureCollection::with_features(l.layer.id.clone(), l.features.clone());
                (l.layer.id.clone(), Arc::new(collection))
            })
            .collect();
        Self {
            state: Arc::new(SnapshotStore::new(ProjectState::from_document(document))),
            collections: RwLock::new(collections),
        }
    }

    pub fn project_id(&self) -> ProjectId {
        self.state.snapshot().metadata.id.clone()
    }

    pub fn state(&self) -> &Arc<SnapshotStore<ProjectState>> {
        &self.state
    }

    pub fn collection(&self, layer_id: &LayerId) -> Option<Arc<FeatureCollection>> {
        self.collections
            .read()
            .expect("lock poisoned")
            .get(layer_id)
            .cloned()
    }

    /// Every collection, ordered by layer id.
    pub fn collections(&self) -> Vec<Arc<FeatureCollection>> {
        let mut collections: Vec<_> = self
            .collections
            .read()
            .expect("lock poisoned")
            .values()
            .cloned()
            .collect();
        collections.sort_by(|a, b| a.layer_id().cmp(b.layer_id()));
        collections
    }

    /// Denormalized view of the live state, selection stripped.
    pub fn document(&self) -> ProjectDocument {
        let state = self.state.snapshot();
        let layers = state
            .layers
            .iter()
            .map(|layer| {
                let features = match self.collection(&layer.id) {
                    Some(c) if layer.is_vector() => {
                        c.features().iter().map(|f| f.normalized()).collect()
                    }
                    _ => Vec::new(),
                };
                LayerDocument::with_features(layer.clone(), features)
            })
            .collect();
        ProjectDocument {
            metadata: state.metadata.clone(),
            layers,
            layouts: state.layouts.clone(),
            shared_views: state.shared_views.clone(),
        }
    }

    fn insert(&self, collection: Arc<FeatureCollection>) {
        self.collections
            .write()
            .expect("lock poisoned")
            .insert(collection.layer_id().clone(), collection);
    }

    fn detach(&self, layer_id: &LayerId) -> bool {
        self.collections
            .write()
            .expect("lock poisoned")
            .remove(layer_id)
            .is_some()
    }
}

impl std::fmt::Debug for ProjectSources {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProjectSources")
            .field("project", &self.project_id())
            .field("collections", &self.collections().len())
            .finish()
    }
}

/// A lifecycle-scoped editing session over per-project databases.
///
/// At most one project is open. Opening connects the storage client to the
/// project's database and starts a feature watch per vector layer plus one
/// bridge per store-driven aggregate. Closing tears all of that down before
/// the client disconnects, so no timer of the outgoing project can write
/// into the next one. Lifecycle operations are serialized.
pub struct Workspace {
    config: WorkspaceConfig,
    client: Arc<StorageClient>,
    stores: EntityStores,
    watcher: FeatureWatcher,
    records: PersistenceBridge<ProjectRecord>,
    layers: PersistenceBridge<Layer>,
    layouts: PersistenceBridge<Layout>,
    shared_views: PersistenceBridge<SharedView>,
    history: HistoryEngine,
    session: Mutex<Option<Arc<ProjectSources>>>,
}

impl Workspace {
    /// Create a workspace on the engine selected by `config.data_dir`.
    pub fn new(config: WorkspaceConfig) -> WorkspaceResult<Self> {
        let engine: Arc<dyn DatabaseEngine> = match &config.data_dir {
            Some(dir) => Arc::new(FileEngine::open(dir.clone())?),
            None => Arc::new(MemoryEngine::new()),
        };
        Self::with_engine(config, engine)
    }

    pub fn with_engine(
        config: WorkspaceConfig,
        engine: Arc<dyn DatabaseEngine>,
    ) -> WorkspaceResult<Self> {
        config.validate()?;
        let client = Arc::new(StorageClient::new(engine));
        let options = BridgeOptions {
            throttle: config.bridge_throttle(),
            ..BridgeOptions::default()
        };
        Ok(Self {
            stores: EntityStores::new(Arc::clone(&client)),
            watcher: FeatureWatcher::new(Arc::clone(&client), config.feature_debounce()),
            records: PersistenceBridge::new(Arc::clone(&client), options.clone()),
            layers: PersistenceBridge::new(Arc::clone(&client), options.clone()),
            layouts: PersistenceBridge::new(Arc::clone(&client), options.clone()),
            shared_views: PersistenceBridge::new(Arc::clone(&client), options),
            history: HistoryEngine::with_limit(config.history_limit),
            client,
            config,
            session: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &WorkspaceConfig {
        &self.config
    }

    pub fn client(&self) -> &Arc<StorageClient> {
        &self.client
    }

    /// Entity stores over the connected database.
    pub fn stores(&self) -> &EntityStores {
        &self.stores
    }

    pub fn history(&self) -> &HistoryEngine {
        &self.history
    }

    pub fn watcher(&self) -> &FeatureWatcher {
        &self.watcher
    }

    /// Name of the database holding project `id`.
    pub fn database_name(&self, id: &ProjectId) -> String {
        format!("{}{}", self.config.database_prefix, id)
    }

    /// Sources of the open project, if any.
    pub async fn active(&self) -> Option<Arc<ProjectSources>> {
        self.session.lock().await.clone()
    }

    pub async fn active_project_id(&self) -> Option<ProjectId> {
        self.session.lock().await.as_ref().map(|s| s.project_id())
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Store `document` in its own database and open it. A project that is
    /// already open is closed first.
    pub async fn create_project(
        &self,
        document: ProjectDocument,
    ) -> WorkspaceResult<Arc<ProjectSources>> {
        let mut session = self.session.lock().await;
        if let Some(current) = session.take() {
            self.teardown(&current).await?;
        }
        let name = self.database_name(document.id());
        connect_project_database(&self.client, &name).await?;
        if let Err(err) = self.stores.projects.put(&document).await {
            self.client.disconnect().await;
            return Err(err.into());
        }
        let sources = self.start(&document).await?;
        info!(project = %document.id(), "project created");
        *session = Some(Arc::clone(&sources));
        Ok(sources)
    }

    /// Open project `id` from its database.
    ///
    /// Reopening the project that is already open returns its sources. If
    /// another project is open, this fails with
    /// [`WorkspaceError::ProjectOpen`]; use
    /// [`switch_project`](Self::switch_project) instead.
    pub async fn open_project(&self, id: &ProjectId) -> WorkspaceResult<Arc<ProjectSources>> {
        let mut session = self.session.lock().await;
        if let Some(current) = session.as_ref() {
            let open = current.project_id();
            if &open == id {
                return Ok(Arc::clone(current));
            }
            return Err(WorkspaceError::ProjectOpen(open));
        }
        let sources = self.open_inner(id).await?;
        *session = Some(Arc::clone(&sources));
        Ok(sources)
    }

    /// Close the open project. Returns `false` if none was open.
    pub async fn close_project(&self) -> WorkspaceResult<bool> {
        let mut session = self.session.lock().await;
        match session.take() {
            Some(current) => {
                self.teardown(&current).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Close whatever is open, then open `id`.
    pub async fn switch_project(&self, id: &ProjectId) -> WorkspaceResult<Arc<ProjectSources>> {
        let mut session = self.session.lock().await;
        if let Some(current) = session.take() {
            if &current.project_id() == id {
                *session = Some(Arc::clone(&current));
                return Ok(current);
            }
            self.teardown(&current).await?;
        }
        let sources = self.open_inner(id).await?;
        *session = Some(Arc::clone(&sources));
        Ok(sources)
    }

    async fn open_inner(&self, id: &ProjectId) -> WorkspaceResult<Arc<ProjectSources>> {
        let name = self.database_name(id);
        if !self.client.database_exists(&name).await? {
            return Err(WorkspaceError::ProjectNotFound(id.clone()));
        }
        connect_project_database(&self.client, &name).await?;
        let document = match self.stores.projects.get_manifest(id).await {
            Ok(Some(document)) => document,
            Ok(None) => {
                self.client.disconnect().await;
                return Err(WorkspaceError::ProjectNotFound(id.clone()));
            }
            Err(err) => {
                self.client.disconnect().await;
                return Err(err.into());
            }
        };
        let sources = self.start(&document).await?;
        info!(
            project = %id,
            layers = document.layers.len(),
            features = document.feature_count(),
            "project opened"
        );
        Ok(sources)
    }

    /// Start every adapter against the connected database.
    async fn start(&self, document: &ProjectDocument) -> WorkspaceResult<Arc<ProjectSources>> {
        let sources = Arc::new(ProjectSources::from_document(document));
        if let Err(err) = self.watch_sources(&sources).await {
            error!(project = %document.id(), error = %err, "could not start persistence");
            self.teardown(&sources).await?;
            return Err(err);
        }
        Ok(sources)
    }

    async fn watch_sources(&self, sources: &ProjectSources) -> WorkspaceResult<()> {
        for collection in sources.collections() {
            self.watcher.watch(collection).await?;
        }
        let state = sources.state();
        self.records.watch(state, select_record).await?;
        self.layers.watch(state, select_layers).await?;
        self.layouts.watch(state, select_layouts).await?;
        self.shared_views.watch(state, select_shared_views).await?;
        Ok(())
    }

    /// Stop every adapter, drop history and disconnect, in that order.
    ///
    /// A failed final flush is logged; the project is closed regardless.
    async fn teardown(&self, sources: &ProjectSources) -> WorkspaceResult<()> {
        let project = sources.project_id();
        if self.config.flush_on_close {
            match self.flush_adapters().await {
                Ok(written) => debug!(project = %project, written, "flushed before close"),
                Err(err) => {
                    error!(project = %project, error = %err, "final flush failed; closing anyway")
                }
            }
        }

        let stopped = [
            self.watcher.unwatch_all().await.map(drop),
            self.records.unwatch().await.map(drop),
            self.layers.unwatch().await.map(drop),
            self.layouts.unwatch().await.map(drop),
            self.shared_views.unwatch().await.map(drop),
        ];

        // History and connection go regardless of how the adapters stopped.
        let dropped = self.history.clear_all().await;
        self.client.disconnect().await;
        info!(project = %project, dropped_changesets = dropped, "project closed");

        let mut failures = stopped.into_iter().filter_map(Result::err);
        match failures.next() {
            Some(first) => {
                for err in failures {
                    error!(project = %project, error = %err, "adapter failed to stop");
                }
                Err(first.into())
            }
            None => Ok(()),
        }
    }

    async fn flush_adapters(&self) -> WorkspaceResult<usize> {
        let mut written = self.watcher.flush_all().await?;
        for bridge_written in [
            flush_if_watching(&self.records).await,
            flush_if_watching(&self.layers).await,
            flush_if_watching(&self.layouts).await,
            flush_if_watching(&self.shared_views).await,
        ] {
            written += bridge_written?;
        }
        Ok(written)
    }

    // -----------------------------------------------------------------------
    // Projects at rest
    // -----------------------------------------------------------------------

    /// Read the stored manifest of project `id`.
    ///
    /// With nothing open, the project's database is connected for the read
    /// and disconnected again. Reading a project other than the open one
    /// fails with [`WorkspaceError::ProjectOpen`].
    pub async fn load_manifest(&self, id: &ProjectId) -> WorkspaceResult<Option<ProjectDocument>> {
        let session = self.session.lock().await;
        if let Some(current) = session.as_ref() {
            let open = current.project_id();
            if &open != id {
                return Err(WorkspaceError::ProjectOpen(open));
            }
            return Ok(self.stores.projects.get_manifest(id).await?);
        }

        let name = self.database_name(id);
        if !self.client.database_exists(&name).await? {
            return Ok(None);
        }
        connect_project_database(&self.client, &name).await?;
        let manifest = self.stores.projects.get_manifest(id).await;
        self.client.disconnect().await;
        Ok(manifest?)
    }

    pub async fn project_exists(&self, id: &ProjectId) -> WorkspaceResult<bool> {
        Ok(self.client.database_exists(&self.database_name(id)).await?)
    }

    /// Ids of every stored project, sorted.
    pub async fn list_projects(&self) -> WorkspaceResult<Vec<ProjectId>> {
        let prefix = &self.config.database_prefix;
        let mut ids: Vec<ProjectId> = self
            .client
            .list_databases()
            .await?
            .iter()
            .filter_map(|name| name.strip_prefix(prefix.as_str()))
            .filter_map(|raw| ProjectId::parse(raw).ok())
            .collect();
        ids.sort();
        Ok(ids)
    }

    /// Drop the database of project `id`, closing it first if it is open.
    pub async fn delete_project(&self, id: &ProjectId) -> WorkspaceResult<bool> {
        let mut session = self.session.lock().await;
        if session.as_ref().is_some_and(|s| &s.project_id() == id) {
            if let Some(current) = session.take() {
                self.teardown(&current).await?;
            }
        }
        let existed = self.client.drop_database(&self.database_name(id)).await?;
        info!(project = %id, existed, "project deleted");
        Ok(existed)
    }

    /// Write `document` into its own database without opening it.
    ///
    /// Fails with [`WorkspaceError::ProjectOpen`] while any project is open.
    pub async fn import_project(&self, document: &ProjectDocument) -> WorkspaceResult<()> {
        let session = self.session.lock().await;
        if let Some(current) = session.as_ref() {
            return Err(WorkspaceError::ProjectOpen(current.project_id()));
        }
        connect_project_database(&self.client, &self.database_name(document.id())).await?;
        let stored = self.stores.projects.put(document).await;
        self.client.disconnect().await;
        stored?;
        info!(project = %document.id(), "project imported");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Open project
    // -----------------------------------------------------------------------

    /// Write every buffered edit of the open project now.
    pub async fn save_now(&self) -> WorkspaceResult<usize> {
        let session = self.session.lock().await;
        if session.is_none() {
            return Err(WorkspaceError::NoActiveProject);
        }
        let written = self.flush_adapters().await?;
        debug!(written, "saved");
        Ok(written)
    }

    /// Add `collection` to the open project and persist its edits.
    pub async fn attach_collection(
        &self,
        collection: Arc<FeatureCollection>,
    ) -> WorkspaceResult<()> {
        let session = self.session.lock().await;
        let sources = session.as_ref().ok_or(WorkspaceError::NoActiveProject)?;
        self.watcher.watch(Arc::clone(&collection)).await?;
        sources.insert(collection);
        Ok(())
    }

    /// Stop persisting the collection of `layer_id` and drop it from the
    /// open project. Buffered edits are written first.
    pub async fn detach_collection(&self, layer_id: &LayerId) -> WorkspaceResult<bool> {
        let session = self.session.lock().await;
        let sources = session.as_ref().ok_or(WorkspaceError::NoActiveProject)?;
        if !sources.detach(layer_id) {
            return Ok(false);
        }
        if let Err(err) = self.watcher.flush(layer_id).await {
            warn!(layer = %layer_id, error = %err, "could not flush detached layer");
        }
        self.watcher.unwatch_layer(layer_id).await?;
        Ok(true)
    }

    // -----------------------------------------------------------------------
    // History
    // -----------------------------------------------------------------------

    pub async fn perform(
        &self,
        key: &HistoryKey,
        changeset: Arc<dyn Changeset>,
    ) -> WorkspaceResult<ChangesetId> {
        Ok(self.history.perform(key, changeset).await?)
    }

    pub async fn undo(&self, key: &HistoryKey) -> WorkspaceResult<bool> {
        Ok(self.history.undo(key).await?)
    }

    pub async fn redo(&self, key: &HistoryKey) -> WorkspaceResult<bool> {
        Ok(self.history.redo(key).await?)
    }

    pub fn can_undo(&self, key: &HistoryKey) -> bool {
        self.history.can_undo(key)
    }

    pub fn can_redo(&self, key: &HistoryKey) -> bool {
        self.history.can_redo(key)
    }
}

async fn flush_if_watching<E: Entity>(
    bridge: &PersistenceBridge<E>,
) -> WorkspaceResult<usize> {
    if !bridge.is_watching() {
        return Ok(0);
    }
    Ok(bridge.flush().await?)
}

impl std::fmt::Debug for Workspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workspace")
            .field("config", &self.config)
            .field("database", &self.client.database_name())
            .finish_non_exhaustive()
    }
}
