use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::ids::LayerId;

/// Basic credentials for a remote tile service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteAuth {
    pub username: String,
    pub password: String,
}

/// Built-in base maps.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PredefinedModel {
    OpenStreetMap,
    StamenToner,
    StamenTerrain,
    StamenWatercolor,
}

/// Connection settings for a WMS layer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WmsSettings {
    pub capabilities_url: String,
    pub remote_urls: Vec<String>,
    pub remote_layer_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub projection: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<RemoteAuth>,
}

/// Connection settings for a WMTS layer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WmtsSettings {
    pub capabilities_url: String,
    pub remote_layer_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<RemoteAuth>,
}

/// Connection settings for an XYZ tile layer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct XyzSettings {
    pub remote_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub projection: Option<String>,
}

/// Kind discriminant plus kind-specific configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LayerKind {
    /// Owns features, stored separately under the `layer_id` index.
    Vector,
    Predefined { model: PredefinedModel },
    Wms(WmsSettings),
    Wmts(WmtsSettings),
    Xyz(XyzSettings),
}

impl fmt::Display for LayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Vector => write!(f, "Vector"),
            Self::Predefined { .. } => write!(f, "Predefined"),
            Self::Wms(_) => write!(f, "Wms"),
            Self::Wmts(_) => write!(f, "Wmts"),
            Self::Xyz(_) => write!(f, "Xyz"),
        }
    }
}

/// Layer metadata as persisted. Features are never embedded here.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    pub id: LayerId,
    pub name: String,
    pub opacity: f64,
    pub visible: bool,
    pub active: bool,
    pub kind: LayerKind,
}

impl Layer {
    /// A visible, fully opaque, inactive layer of the given kind.
    pub fn new(id: LayerId, name: impl Into<String>, kind: LayerKind) -> Self {
        Self {
            id,
            name: name.into(),
            opacity: 1.0,
            visible: true,
            active: false,
            kind,
        }
    }

    /// Shorthand for a vector layer with a fresh id.
    pub fn vector(name: impl Into<String>) -> Self {
        Self::new(LayerId::generate(), name, LayerKind::Vector)
    }

    pub fn is_vector(&self) -> bool {
        matches!(self.kind, LayerKind::Vector)
    }

    /// Set the opacity, rejecting values outside `0.0..=1.0`.
    pub fn set_opacity(&mut self, opacity: f64) -> Result<(), TypeError> {
        if !(0.0..=1.0).contains(&opacity) {
            return Err(TypeError::InvalidOpacity(opacity));
        }
        self.opacity = opacity;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn kind_is_tagged() {
        let layer = Layer::new(
            LayerId::parse("l1").unwrap(),
            "Base",
            LayerKind::Predefined {
                model: PredefinedModel::OpenStreetMap,
            },
        );
        let value = serde_json::to_value(&layer).unwrap();
        assert_eq!(value["kind"]["type"], json!("Predefined"));
        assert_eq!(value["kind"]["model"], json!("OpenStreetMap"));

        let back: Layer = serde_json::from_value(value).unwrap();
        assert_eq!(back, layer);
    }

    #[test]
    fn wms_settings_round_trip() {
        let kind = LayerKind::Wms(WmsSettings {
            capabilities_url: "https://example.org/wms?REQUEST=GetCapabilities".into(),
            remote_urls: vec!["https://example.org/wms".into()],
            remote_layer_name: "roads".into(),
            projection: Some("EPSG:3857".into()),
            auth: Some(RemoteAuth {
                username: "u".into(),
                password: "p".into(),
            }),
        });
        let json = serde_json::to_string(&kind).unwrap();
        let back: LayerKind = serde_json::from_str(&json).unwrap();
        assert_eq!(back, kind);
        assert_eq!(back.to_string(), "Wms");
    }

    #[test]
    fn opacity_is_validated() {
        let mut layer = Layer::vector("Points");
        assert!(layer.set_opacity(0.5).is_ok());
        assert_eq!(layer.opacity, 0.5);
        assert_eq!(
            layer.set_opacity(1.5),
            Err(TypeError::InvalidOpacity(1.5))
        );
        assert_eq!(layer.opacity, 0.5);
    }

    #[test]
    fn vector_shorthand() {
        let layer = Layer::vector("Points");
        assert!(layer.is_vector());
        assert!(layer.visible);
        assert!(!layer.active);
    }
}
