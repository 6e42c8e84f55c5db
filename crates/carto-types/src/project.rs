use serde::{Deserialize, Serialize};

use crate::feature::Feature;
use crate::ids::{LayerId, LayoutId, ProjectId, SharedViewId};
use crate::layer::Layer;
use crate::layout::{Layout, SharedView};

/// Project format version written by this workspace.
pub const PROJECT_VERSION: &str = "1.0.0";

/// Descriptive attributes of a project.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectMetadata {
    pub id: ProjectId,
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub public: bool,
}

impl ProjectMetadata {
    /// Metadata for a brand new private project.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: ProjectId::generate(),
            name: name.into(),
            version: PROJECT_VERSION.to_string(),
            public: false,
        }
    }
}

/// The normalized project row: metadata plus foreign-key lists.
///
/// Children are referenced by id and stored in their own object stores so
/// that the row stays small and cheap to rewrite on every save.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRecord {
    #[serde(flatten)]
    pub metadata: ProjectMetadata,
    #[serde(default)]
    pub layer_ids: Vec<LayerId>,
    #[serde(default)]
    pub layout_ids: Vec<LayoutId>,
    #[serde(default)]
    pub shared_view_ids: Vec<SharedViewId>,
}

impl ProjectRecord {
    pub fn id(&self) -> &ProjectId {
        &self.metadata.id
    }
}

/// A layer with its features spliced back in.
///
/// Non-vector layers always carry an empty feature list.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LayerDocument {
    pub layer: Layer,
    #[serde(default)]
    pub features: Vec<Feature>,
}

impl LayerDocument {
    pub fn new(layer: Layer) -> Self {
        Self {
            layer,
            features: Vec::new(),
        }
    }

    pub fn with_features(layer: Layer, features: Vec<Feature>) -> Self {
        Self { layer, features }
    }
}

/// A fully denormalized, self-contained project.
///
/// This is what the storage join reassembles and what imports hand to
/// `put`. Layer order is significant; feature order is not.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProjectDocument {
    pub metadata: ProjectMetadata,
    #[serde(default)]
    pub layers: Vec<LayerDocument>,
    #[serde(default)]
    pub layouts: Vec<Layout>,
    #[serde(default)]
    pub shared_views: Vec<SharedView>,
}

impl ProjectDocument {
    /// An empty project with fresh metadata.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            metadata: ProjectMetadata::new(name),
            layers: Vec::new(),
            layouts: Vec::new(),
            shared_views: Vec::new(),
        }
    }

    pub fn id(&self) -> &ProjectId {
        &self.metadata.id
    }

    /// Derive the normalized project row from the embedded children.
    pub fn record(&self) -> ProjectRecord {
        ProjectRecord {
            metadata: self.metadata.clone(),
            layer_ids: self.layers.iter().map(|l| l.layer.id.clone()).collect(),
            layout_ids: self.layouts.iter().map(|l| l.id.clone()).collect(),
            shared_view_ids: self.shared_views.iter().map(|v| v.id.clone()).collect(),
        }
    }

    pub fn layer(&self, id: &LayerId) -> Option<&LayerDocument> {
        self.layers.iter().find(|l| &l.layer.id == id)
    }

    /// Total number of features across all layers.
    pub fn feature_count(&self) -> usize {
        self.layers.iter().map(|l| l.features.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::{LayerKind, XyzSettings};
    use crate::layout::{Dimensions, MapView};
    use serde_json::json;

    fn sample() -> ProjectDocument {
        let mut doc = ProjectDocument::new("Sample");
        let vector = Layer::vector("Points");
        let xyz = Layer::new(
            LayerId::generate(),
            "Tiles",
            LayerKind::Xyz(XyzSettings {
                remote_url: "https://tiles.example.org/{z}/{x}/{y}.png".into(),
                projection: None,
            }),
        );
        doc.layers.push(LayerDocument::with_features(
            vector,
            vec![Feature::new(json!({"type": "Point", "coordinates": [0, 0]}))],
        ));
        doc.layers.push(LayerDocument::new(xyz));
        doc.layouts.push(Layout::new(
            "A4",
            MapView::default(),
            Dimensions {
                width: 1123,
                height: 794,
            },
        ));
        doc
    }

    #[test]
    fn record_lists_children_in_order() {
        let doc = sample();
        let record = doc.record();
        assert_eq!(record.id(), doc.id());
        assert_eq!(record.layer_ids.len(), 2);
        assert_eq!(record.layer_ids[0], doc.layers[0].layer.id);
        assert_eq!(record.layout_ids, vec![doc.layouts[0].id.clone()]);
        assert!(record.shared_view_ids.is_empty());
    }

    #[test]
    fn record_flattens_metadata() {
        let record = sample().record();
        let value = serde_json::to_value(&record).unwrap();
        assert!(value.get("name").is_some());
        assert!(value.get("metadata").is_none());
        let back: ProjectRecord = serde_json::from_value(value).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn feature_count_and_lookup() {
        let doc = sample();
        assert_eq!(doc.feature_count(), 1);
        let id = doc.layers[1].layer.id.clone();
        assert_eq!(doc.layer(&id).unwrap().layer.name, "Tiles");
        assert!(doc.layer(&LayerId::parse("missing").unwrap()).is_none());
    }

    #[test]
    fn new_project_uses_current_version() {
        let doc = ProjectDocument::new("Empty");
        assert_eq!(doc.metadata.version, PROJECT_VERSION);
        assert!(!doc.metadata.public);
    }
}
