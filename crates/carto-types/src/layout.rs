use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{LayerId, LayoutId, SharedViewId};

/// A captured camera position.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MapView {
    pub center: [f64; 2],
    pub resolution: f64,
    pub rotation: f64,
    pub projection: String,
}

impl Default for MapView {
    fn default() -> Self {
        Self {
            center: [0.0, 0.0],
            resolution: 1000.0,
            rotation: 0.0,
            projection: "EPSG:3857".into(),
        }
    }
}

/// Pixel dimensions of an export or a shared view.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// Position of a decoration, relative to the top-left corner.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Anchor {
    pub x: f64,
    pub y: f64,
}

/// A free-form rich-text block drawn over the map.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TextFrame {
    pub id: String,
    pub anchor: Anchor,
    pub size: Dimensions,
    /// Rich-text document, opaque to the workspace.
    pub content: Value,
}

/// Legend placement and its entries.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Legend {
    pub anchor: Anchor,
    pub items: Vec<LegendItem>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LegendItem {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<Value>,
}

/// Auxiliary decorations shared by layouts and shared views.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Decorations {
    #[serde(default)]
    pub text_frames: Vec<TextFrame>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<Anchor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub north_arrow: Option<Anchor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legend: Option<Legend>,
}

/// One page of a print/export.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Layout {
    pub id: LayoutId,
    pub name: String,
    pub view: MapView,
    pub dimensions: Dimensions,
    #[serde(default)]
    pub decorations: Decorations,
}

impl Layout {
    pub fn new(name: impl Into<String>, view: MapView, dimensions: Dimensions) -> Self {
        Self {
            id: LayoutId::generate(),
            name: name.into(),
            view,
            dimensions,
            decorations: Decorations::default(),
        }
    }
}

/// A published, read-only presentation of the project.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SharedView {
    pub id: SharedViewId,
    pub title: String,
    pub view: MapView,
    /// Per-layer visibility override for this view.
    #[serde(default)]
    pub layer_visibility: BTreeMap<LayerId, bool>,
    #[serde(default)]
    pub decorations: Decorations,
}

impl SharedView {
    pub fn new(title: impl Into<String>, view: MapView) -> Self {
        Self {
            id: SharedViewId::generate(),
            title: title.into(),
            view,
            layer_visibility: BTreeMap::new(),
            decorations: Decorations::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn layout_decorations_default_when_missing() {
        let raw = json!({
            "id": "lay1",
            "name": "A4",
            "view": {"center": [1.0, 2.0], "resolution": 10.0, "rotation": 0.0, "projection": "EPSG:3857"},
            "dimensions": {"width": 800, "height": 600}
        });
        let layout: Layout = serde_json::from_value(raw).unwrap();
        assert_eq!(layout.decorations, Decorations::default());
        assert_eq!(layout.dimensions.width, 800);
    }

    #[test]
    fn shared_view_keeps_visibility_overrides() {
        let mut view = SharedView::new("Overview", MapView::default());
        view.layer_visibility
            .insert(LayerId::parse("l1").unwrap(), false);
        let json = serde_json::to_string(&view).unwrap();
        let back: SharedView = serde_json::from_str(&json).unwrap();
        assert_eq!(back, view);
    }
}
