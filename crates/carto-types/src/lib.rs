//! Foundation types for the Carto workspace.
//!
//! Every other Carto crate depends on `carto-types`. The types here are plain
//! data: they carry no storage or synchronization behaviour.
//!
//! # Key Types
//!
//! - [`ProjectDocument`] -- a fully denormalized project (layers with features,
//!   layouts, shared views)
//! - [`ProjectRecord`] -- the normalized project row with foreign-key lists
//! - [`Layer`] / [`LayerKind`] -- layer metadata and kind-specific settings
//! - [`Feature`] -- a geometry + properties record owned by one vector layer
//! - [`Layout`] / [`SharedView`] -- store-driven presentation aggregates
//! - [`HistoryKey`] -- namespace for independent undo/redo stacks

pub mod error;
pub mod feature;
pub mod history;
pub mod ids;
pub mod layer;
pub mod layout;
pub mod project;

pub use error::TypeError;
pub use feature::Feature;
pub use history::HistoryKey;
pub use ids::{FeatureId, LayerId, LayoutId, ProjectId, SharedViewId};
pub use layer::{
    Layer, LayerKind, PredefinedModel, RemoteAuth, WmsSettings, WmtsSettings, XyzSettings,
};
pub use layout::{
    Anchor, Decorations, Dimensions, Layout, Legend, LegendItem, MapView, SharedView, TextFrame,
};
pub use project::{
    LayerDocument, ProjectDocument, ProjectMetadata, ProjectRecord, PROJECT_VERSION,
};
