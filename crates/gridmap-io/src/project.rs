use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use gridmap_core::geometry::{CoordinateSystem, DisplayArea, Point};
use gridmap_core::layer::{Layer, LayerStack, StyleBlackboard, COLOR_MASK_KEY};
use gridmap_core::style::Style;
use gridmap_core::Envelope;
use gridmap_render::Viewport;

use crate::raster_file::FileCoverage;
use crate::world_file::WorldFileError;

#[derive(Error, Debug)]
pub enum ProjectError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid project file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("layer '{layer}': {source}")]
    Georeference {
        layer: String,
        #[source]
        source: WorldFileError,
    },
}

/// A map project: coordinate system, initial viewport and raster layers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapProject {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub crs: CoordinateSystem,
    #[serde(default)]
    pub viewport: ViewportSettings,
    #[serde(default)]
    pub layers: Vec<LayerConfig>,
    #[serde(default)]
    pub settings: ProjectSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewportSettings {
    pub width: u32,
    pub height: u32,
    /// World point at the display centre. `None` fits all layers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub center: Option<Point>,
    /// Pixels per world unit; required together with `center`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zoom: Option<f64>,
}

impl Default for ViewportSettings {
    fn default() -> Self {
        Self {
            width: 1024,
            height: 768,
            center: None,
            zoom: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerConfig {
    pub name: String,
    /// Raster file, relative to the project file.
    pub source: PathBuf,
    /// World extent. Read from the world file when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounds: Option<Envelope>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<Style>,
    /// Colour made transparent, as `r:g:b`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color_mask: Option<String>,
    #[serde(default = "default_visible")]
    pub visible: bool,
}

fn default_visible() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectSettings {
    /// Background colour (RGBA) under all layers.
    pub background: [u8; 4],
    /// Cancel rendering after this many milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub render_timeout_ms: Option<u64>,
}

impl Default for ProjectSettings {
    fn default() -> Self {
        Self {
            background: [255, 255, 255, 255],
            render_timeout_ms: None,
        }
    }
}

impl MapProject {
    pub fn new(name: &str, crs: CoordinateSystem) -> Self {
        Self {
            name: name.to_string(),
            description: String::new(),
            crs,
            viewport: ViewportSettings::default(),
            layers: Vec::new(),
            settings: ProjectSettings::default(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn load(path: &Path) -> Result<Self, ProjectError> {
        let project = Self::from_json(&fs::read_to_string(path)?)?;
        debug!("loaded project '{}' with {} layers", project.name, project.layers.len());
        Ok(project)
    }

    pub fn save(&self, path: &Path) -> Result<(), ProjectError> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Builds the layer stack, resolving sources against `base_dir`.
    ///
    /// Layers without explicit bounds are georeferenced from their world
    /// file; any failure there is an error for the whole project.
    pub fn build_layers(&self, base_dir: &Path) -> Result<LayerStack, ProjectError> {
        let mut stack = LayerStack::new();
        for config in &self.layers {
            let path = base_dir.join(&config.source);
            let resource = match &config.bounds {
                Some(bounds) => {
                    let mut bounds = bounds.clone();
                    if bounds.crs.is_undefined() {
                        bounds.crs = self.crs.clone();
                    }
                    FileCoverage::new(&path, bounds)
                }
                None => FileCoverage::from_world_file(&path, self.crs.clone()).map_err(|source| {
                    ProjectError::Georeference {
                        layer: config.name.clone(),
                        source,
                    }
                })?,
            };

            let mut blackboard = StyleBlackboard::new();
            if let Some(style) = &config.style {
                blackboard.set_style(style.clone());
            }
            if let Some(mask) = &config.color_mask {
                blackboard.put_string(COLOR_MASK_KEY, mask);
            }

            let layer = Layer::new(&config.name, Arc::new(resource)).with_blackboard(blackboard);
            layer.set_visible(config.visible);
            stack.add_layer(layer);
        }
        Ok(stack)
    }

    /// The initial viewport, fitted to all layers unless a centre and zoom are set.
    pub fn viewport(&self, stack: &LayerStack) -> Viewport {
        let display = DisplayArea::new(self.viewport.width, self.viewport.height);
        let mut viewport = Viewport::new(self.crs.clone(), display);
        match (self.viewport.center, self.viewport.zoom) {
            (Some(center), Some(zoom)) => {
                viewport.center = center;
                viewport.zoom = zoom;
            }
            _ => match stack.bounds() {
                Some(bounds) => viewport.fit_envelope(&bounds, 1.0),
                None => warn!("project '{}' has no layer bounds to fit", self.name),
            },
        }
        viewport
    }
}
