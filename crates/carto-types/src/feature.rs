use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::FeatureId;

/// A single geometry + property record belonging to exactly one layer.
///
/// The geometry and style are opaque JSON documents owned by the map model;
/// this crate only moves them around. Features deserialized without an id are
/// assigned a fresh one, so every feature is addressable by storage.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    #[serde(default = "FeatureId::generate")]
    pub id: FeatureId,
    pub geometry: Value,
    #[serde(default)]
    pub properties: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<Value>,
    /// Ephemeral UI focus flag. Never persisted as `true`.
    #[serde(default)]
    pub selected: bool,
}

impl Feature {
    /// Create an unselected feature with a fresh id.
    pub fn new(geometry: Value) -> Self {
        Self {
            id: FeatureId::generate(),
            geometry,
            properties: BTreeMap::new(),
            style: None,
            selected: false,
        }
    }

    /// Replace the id.
    pub fn with_id(mut self, id: FeatureId) -> Self {
        self.id = id;
        self
    }

    /// Set a property.
    pub fn with_property(mut self, key: impl Into<String>, value: Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    /// Set the style document.
    pub fn with_style(mut self, style: Value) -> Self {
        self.style = Some(style);
        self
    }

    /// A copy suitable for persistence: selection cleared.
    pub fn normalized(&self) -> Self {
        let mut copy = self.clone();
        copy.selected = false;
        copy
    }

    /// Compare persisted content, ignoring the selection flag.
    pub fn same_content(&self, other: &Feature) -> bool {
        self.id == other.id
            && self.geometry == other.geometry
            && self.properties == other.properties
            && self.style == other.style
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn point() -> Value {
        json!({"type": "Point", "coordinates": [1.0, 2.0]})
    }

    #[test]
    fn missing_id_is_assigned_on_deserialize() {
        let raw = json!({"geometry": {"type": "Point", "coordinates": [0, 0]}});
        let feature: Feature = serde_json::from_value(raw).unwrap();
        assert!(!feature.id.as_str().is_empty());
        assert!(!feature.selected);
    }

    #[test]
    fn explicit_id_is_kept() {
        let raw = json!({"id": "f1", "geometry": null, "selected": true});
        let feature: Feature = serde_json::from_value(raw).unwrap();
        assert_eq!(feature.id.as_str(), "f1");
        assert!(feature.selected);
    }

    #[test]
    fn normalized_clears_selection() {
        let mut feature = Feature::new(point());
        feature.selected = true;
        let normalized = feature.normalized();
        assert!(!normalized.selected);
        assert_eq!(normalized.id, feature.id);
    }

    #[test]
    fn same_content_ignores_selection() {
        let a = Feature::new(point()).with_property("name", json!("well"));
        let mut b = a.clone();
        b.selected = true;
        assert!(a.same_content(&b));

        let c = a.clone().with_property("name", json!("spring"));
        assert!(!a.same_content(&c));
    }
}
