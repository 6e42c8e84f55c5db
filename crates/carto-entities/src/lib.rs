//! Typed entity stores for the Carto workspace.
//!
//! Wraps a [`carto_store::StorageClient`] with one store per entity family
//! and encodes the normalization scheme of a project database: the project
//! row holds id lists, children live in their own object stores, and
//! features are keyed by id with a `layer_id` foreign key.
//!
//! # Design Rules
//!
//! 1. Anything that grows without bound (features) or is cached on its own
//!    (tiles) gets its own object store. Nothing is embedded in its parent.
//! 2. Reads of absent rows return `Ok(None)`; only engine faults are errors.
//! 3. [`ProjectStore::get_manifest`] tolerates partial data: dangling ids are
//!    skipped, a vector layer with no stored features has an empty list.
//! 4. The selection flag of a feature is never persisted.

pub mod entity;
pub mod error;
pub mod features;
pub mod project;
pub mod schema;
pub mod stores;
pub mod tiles;

pub use entity::{Entity, EntityStore, LayerStore, LayoutStore, SharedViewStore};
pub use error::{EntityError, EntityResult};
pub use features::{FeatureRecord, FeatureStore};
pub use project::ProjectStore;
pub use schema::{connect_project_database, workspace_schema, SCHEMA_VERSION};
pub use stores::EntityStores;
pub use tiles::TileStore;
