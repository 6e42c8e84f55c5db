//! Reactive state of an open project and the selectors the bridges use.

use carto_types::{
    Layer, LayerId, Layout, LayoutId, ProjectDocument, ProjectMetadata, ProjectRecord,
    SharedView, SharedViewId,
};

/// Store-driven part of an open project. Features are not part of it: they
/// live in per-layer feature collections.
#[derive(Clone, Debug, PartialEq)]
pub struct ProjectState {
    pub metadata: ProjectMetadata,
    pub layers: Vec<Layer>,
    pub layouts: Vec<Layout>,
    pub shared_views: Vec<SharedView>,
}

impl ProjectState {
    pub fn from_document(document: &ProjectDocument) -> Self {
        Self {
            metadata: document.metadata.clone(),
            layers: document.layers.iter().map(|l| l.layer.clone()).collect(),
            layouts: document.layouts.clone(),
            shared_views: document.shared_views.clone(),
        }
    }

    /// The normalized project row for this state.
    pub fn record(&self) -> ProjectRecord {
        ProjectRecord {
            metadata: self.metadata.clone(),
            layer_ids: self.layers.iter().map(|l| l.id.clone()).collect(),
            layout_ids: self.layouts.iter().map(|l| l.id.clone()).collect(),
            shared_view_ids: self.shared_views.iter().map(|v| v.id.clone()).collect(),
        }
    }

    pub fn layer(&self, id: &LayerId) -> Option<&Layer> {
        self.layers.iter().find(|l| &l.id == id)
    }

    // ---- Reducers ----

    pub fn with_name(&self, name: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.metadata.name = name.into();
        next
    }

    /// Insert or replace a layer, keeping its position if it exists.
    pub fn with_layer(&self, layer: Layer) -> Self {
        let mut next = self.clone();
        upsert(&mut next.layers, layer, |l| l.id.clone());
        next
    }

    pub fn without_layer(&self, id: &LayerId) -> Self {
        let mut next = self.clone();
        next.layers.retain(|l| &l.id != id);
        next
    }

    pub fn with_layout(&self, layout: Layout) -> Self {
        let mut next = self.clone();
        upsert(&mut next.layouts, layout, |l| l.id.clone());
        next
    }

    pub fn without_layout(&self, id: &LayoutId) -> Self {
        let mut next = self.clone();
        next.layouts.retain(|l| &l.id != id);
        next
    }

    pub fn with_shared_view(&self, view: SharedView) -> Self {
        let mut next = self.clone();
        upsert(&mut next.shared_views, view, |v| v.id.clone());
        next
    }

    pub fn without_shared_view(&self, id: &SharedViewId) -> Self {
        let mut next = self.clone();
        next.shared_views.retain(|v| &v.id != id);
        next
    }
}

fn upsert<T, K: PartialEq>(items: &mut Vec<T>, item: T, key: impl Fn(&T) -> K) {
    let k = key(&item);
    match items.iter_mut().find(|existing| key(existing) == k) {
        Some(existing) => *existing = item,
        None => items.push(item),
    }
}

// ---- Selectors ----

pub fn select_record(state: &ProjectState) -> Vec<ProjectRecord> {
    vec![state.record()]
}

pub fn select_layers(state: &ProjectState) -> Vec<Layer> {
    state.layers.clone()
}

pub fn select_layouts(state: &ProjectState) -> Vec<Layout> {
    state.layouts.clone()
}

pub fn select_shared_views(state: &ProjectState) -> Vec<SharedView> {
    state.shared_views.clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use carto_types::{Dimensions, LayerDocument, MapView};

    fn state() -> ProjectState {
        let mut doc = ProjectDocument::new("Demo");
        doc.layers.push(LayerDocument::new(Layer::vector("A")));
        doc.layers.push(LayerDocument::new(Layer::vector("B")));
        ProjectState::from_document(&doc)
    }

    #[test]
    fn record_tracks_children() {
        let s = state();
        let layout = Layout::new(
            "A4",
            MapView::default(),
            Dimensions {
                width: 1,
                height: 1,
            },
        );
        let s = s.with_layout(layout.clone());
        let record = s.record();
        assert_eq!(record.layer_ids.len(), 2);
        assert_eq!(record.layout_ids, vec![layout.id.clone()]);

        let s = s.without_layout(&layout.id);
        assert!(s.record().layout_ids.is_empty());
    }

    #[test]
    fn with_layer_replaces_in_place() {
        let s = state();
        let mut first = s.layers[0].clone();
        first.name = "Renamed".into();
        let next = s.with_layer(first.clone());
        assert_eq!(next.layers[0], first);
        assert_eq!(next.layers.len(), 2);
        // The original snapshot is untouched.
        assert_eq!(s.layers[0].name, "A");
    }

    #[test]
    fn selectors_project_state() {
        let s = state().with_shared_view(SharedView::new("Overview", MapView::default()));
        assert_eq!(select_layers(&s).len(), 2);
        assert_eq!(select_shared_views(&s).len(), 1);
        assert!(select_layouts(&s).is_empty());
        assert_eq!(select_record(&s)[0].metadata.name, "Demo");
    }
}
