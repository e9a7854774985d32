use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use log::debug;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::coverage::GeoResource;
use crate::geometry::Envelope;
use crate::style::{ColorMask, Style, StyleExtractionError};

/// A unique layer identifier.
pub type LayerId = Uuid;

/// Blackboard key holding a `r:g:b` colour to make transparent.
pub const COLOR_MASK_KEY: &str = "raster-color-mask";

/// Per-layer style storage edited by the UI and read by renderers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StyleBlackboard {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    style: Option<Style>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    entries: HashMap<String, String>,
}

impl StyleBlackboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn style(&self) -> Option<&Style> {
        self.style.as_ref()
    }

    pub fn set_style(&mut self, style: Style) {
        self.style = Some(style);
    }

    pub fn clear_style(&mut self) -> Option<Style> {
        self.style.take()
    }

    pub fn get_string(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn put_string(&mut self, key: &str, value: &str) {
        self.entries.insert(key.to_string(), value.to_string());
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.entries.remove(key)
    }

    /// The colour mask entry, parsed. `None` when no mask is set.
    pub fn color_mask(&self) -> Option<Result<ColorMask, StyleExtractionError>> {
        self.get_string(COLOR_MASK_KEY).map(|s| {
            let parsed: Result<ColorMask, StyleExtractionError> = s.parse();
            if let Err(e) = &parsed {
                debug!("blackboard entry '{}' is unusable: {}", COLOR_MASK_KEY, e);
            }
            parsed
        })
    }
}

/// Rendering status reported by a layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LayerStatus {
    Idle,
    Waiting,
    Working,
    Done,
    Failed,
}

#[derive(Debug)]
struct StatusInfo {
    status: LayerStatus,
    message: Option<String>,
}

/// A map layer backed by a [`GeoResource`].
///
/// Layers are shared between the UI and render threads; mutable parts sit
/// behind their own locks.
pub struct Layer {
    pub id: LayerId,
    pub name: String,
    visible: AtomicBool,
    resource: Arc<dyn GeoResource>,
    blackboard: RwLock<StyleBlackboard>,
    status: Mutex<StatusInfo>,
}

impl fmt::Debug for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Layer")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("visible", &self.is_visible())
            .field("resource", &self.resource.identifier())
            .finish()
    }
}

impl Layer {
    pub fn new(name: &str, resource: Arc<dyn GeoResource>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            visible: AtomicBool::new(true),
            resource,
            blackboard: RwLock::new(StyleBlackboard::new()),
            status: Mutex::new(StatusInfo {
                status: LayerStatus::Idle,
                message: None,
            }),
        }
    }

    pub fn with_style(self, style: Style) -> Self {
        self.update_blackboard(|bb| bb.set_style(style));
        self
    }

    pub fn with_blackboard(self, blackboard: StyleBlackboard) -> Self {
        self.update_blackboard(|bb| *bb = blackboard);
        self
    }

    pub fn resource(&self) -> &dyn GeoResource {
        self.resource.as_ref()
    }

    pub fn bounds(&self) -> Option<Envelope> {
        self.resource.bounds()
    }

    pub fn is_visible(&self) -> bool {
        self.visible.load(Ordering::SeqCst)
    }

    pub fn set_visible(&self, visible: bool) {
        self.visible.store(visible, Ordering::SeqCst);
    }

    // ── Style blackboard ─────────────────────────────────────────────

    /// A copy of the blackboard, taken under a single read lock.
    pub fn style_snapshot(&self) -> StyleBlackboard {
        self.blackboard
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn update_blackboard<F>(&self, update: F)
    where
        F: FnOnce(&mut StyleBlackboard),
    {
        let mut guard = self.blackboard.write().unwrap_or_else(PoisonError::into_inner);
        update(&mut guard);
    }

    // ── Status ───────────────────────────────────────────────────────

    pub fn status(&self) -> LayerStatus {
        self.status.lock().unwrap_or_else(PoisonError::into_inner).status
    }

    pub fn status_message(&self) -> Option<String> {
        self.status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .message
            .clone()
    }

    pub fn set_status(&self, status: LayerStatus, message: Option<&str>) {
        let mut info = self.status.lock().unwrap_or_else(PoisonError::into_inner);
        info.status = status;
        info.message = message.map(str::to_string);
    }
}

/// The ordered layers of a map, bottom layer first.
#[derive(Debug, Clone, Default)]
pub struct LayerStack {
    layers: Vec<Arc<Layer>>,
}

impl LayerStack {
    pub fn new() -> Self {
        Self { layers: Vec::new() }
    }

    /// Adds a layer on top of the stack.
    pub fn add_layer(&mut self, layer: Layer) -> Arc<Layer> {
        let layer = Arc::new(layer);
        debug!("adding layer '{}' ({}) at position {}", layer.name, layer.id, self.layers.len());
        self.layers.push(Arc::clone(&layer));
        layer
    }

    pub fn remove_layer(&mut self, id: LayerId) -> Option<Arc<Layer>> {
        let index = self.layers.iter().position(|l| l.id == id)?;
        Some(self.layers.remove(index))
    }

    pub fn get_layer(&self, id: LayerId) -> Option<&Arc<Layer>> {
        self.layers.iter().find(|l| l.id == id)
    }

    pub fn find_layer_by_name(&self, name: &str) -> Option<&Arc<Layer>> {
        self.layers.iter().find(|l| l.name == name)
    }

    pub fn visible_layers(&self) -> impl Iterator<Item = &Arc<Layer>> {
        self.layers.iter().filter(|l| l.is_visible())
    }

    pub fn all_layers(&self) -> &[Arc<Layer>] {
        &self.layers
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    pub fn toggle_visibility(&self, id: LayerId) {
        if let Some(layer) = self.get_layer(id) {
            layer.set_visible(!layer.is_visible());
        }
    }

    pub fn set_all_visible(&self, visible: bool) {
        for layer in &self.layers {
            layer.set_visible(visible);
        }
    }

    /// Union of the bounds of every layer that knows its extent.
    pub fn bounds(&self) -> Option<Envelope> {
        self.layers
            .iter()
            .filter_map(|l| l.bounds())
            .reduce(|acc, b| acc.union(&b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coverage::MemoryCoverage;
    use crate::geometry::CoordinateSystem;
    use crate::style::{RasterSymbolizer, Rule};

    fn layer(name: &str, x: f64) -> Layer {
        let bounds = Envelope::new(x, 0.0, x + 10.0, 10.0, CoordinateSystem::web_mercator());
        Layer::new(name, Arc::new(MemoryCoverage::empty(name, Some(bounds))))
    }

    #[test]
    fn test_blackboard_snapshot_is_detached() {
        let layer = layer("ortho", 0.0).with_style(Style::raster("ortho", Rule::raster(RasterSymbolizer::with_opacity(0.5))));
        let snapshot = layer.style_snapshot();
        layer.update_blackboard(|bb| {
            bb.clear_style();
        });
        assert!(snapshot.style().is_some());
        assert!(layer.style_snapshot().style().is_none());
    }

    #[test]
    fn test_color_mask_entry() {
        let mut bb = StyleBlackboard::new();
        assert!(bb.color_mask().is_none());
        bb.put_string(COLOR_MASK_KEY, "0:0:0");
        assert_eq!(bb.color_mask(), Some(Ok(ColorMask::new(0, 0, 0))));
        bb.put_string(COLOR_MASK_KEY, "black");
        assert!(matches!(bb.color_mask(), Some(Err(_))));
        bb.remove(COLOR_MASK_KEY);
        assert!(bb.get_string(COLOR_MASK_KEY).is_none());
    }

    #[test]
    fn test_status_transitions() {
        let layer = layer("dem", 0.0);
        assert_eq!(layer.status(), LayerStatus::Idle);
        layer.set_status(LayerStatus::Working, Some("rendering"));
        assert_eq!(layer.status(), LayerStatus::Working);
        assert_eq!(layer.status_message().as_deref(), Some("rendering"));
        layer.set_status(LayerStatus::Done, None);
        assert!(layer.status_message().is_none());
    }

    #[test]
    fn test_stack_order_and_visibility() {
        let mut stack = LayerStack::new();
        let a = stack.add_layer(layer("a", 0.0));
        let b = stack.add_layer(layer("b", 20.0));
        assert_eq!(stack.layer_count(), 2);
        assert_eq!(stack.all_layers()[0].id, a.id);

        stack.toggle_visibility(b.id);
        assert_eq!(stack.visible_layers().count(), 1);
        stack.set_all_visible(true);
        assert_eq!(stack.visible_layers().count(), 2);

        let bounds = stack.bounds().unwrap();
        assert!((bounds.width() - 30.0).abs() < 1e-10);

        assert!(stack.remove_layer(a.id).is_some());
        assert!(stack.find_layer_by_name("a").is_none());
    }
}
