//! Render state extraction.
//!
//! A [`RenderState`] is computed once per render pass from a snapshot of the
//! layer's style blackboard and the viewport, and never changes afterwards.

use log::{debug, warn};

use gridmap_core::geometry::{DisplayArea, Envelope};
use gridmap_core::layer::{Layer, StyleBlackboard};
use gridmap_core::scale::{DEFAULT_MAX_SCALE, DEFAULT_MIN_SCALE};
use gridmap_core::style::{ColorMask, RasterSymbolizer, Style, StyleExtractionError, Value};

use crate::viewport::Viewport;

const DEFAULT_OPACITY: f32 = 1.0;

/// Everything a renderer needs to know about one layer for one pass.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderState {
    pub display_area: DisplayArea,
    pub world_bounds: Envelope,
    /// Alpha applied when compositing, in `[0, 1]`.
    pub opacity: f32,
    pub min_scale: f64,
    pub max_scale: f64,
    pub color_mask: Option<ColorMask>,
}

/// The style-derived part of a [`RenderState`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Symbolization {
    pub opacity: f32,
    pub min_scale: f64,
    pub max_scale: f64,
}

impl Default for Symbolization {
    /// Draw at every scale, fully opaque.
    fn default() -> Self {
        Self {
            opacity: DEFAULT_OPACITY,
            min_scale: DEFAULT_MIN_SCALE,
            max_scale: DEFAULT_MAX_SCALE,
        }
    }
}

/// Inputs to [`compute_render_state`].
#[derive(Debug, Clone, Copy)]
pub struct RenderContext<'a> {
    pub layer: &'a Layer,
    pub viewport: &'a Viewport,
}

impl<'a> RenderContext<'a> {
    pub fn new(layer: &'a Layer, viewport: &'a Viewport) -> Self {
        Self { layer, viewport }
    }
}

pub fn compute_render_state(context: &RenderContext<'_>) -> RenderState {
    let blackboard = context.layer.style_snapshot();
    let symbolization = extract_symbolization(blackboard.style());
    let color_mask = extract_color_mask(&blackboard, &context.layer.name);

    RenderState {
        display_area: context.viewport.display,
        world_bounds: context.viewport.visible_bounds(),
        opacity: symbolization.opacity,
        min_scale: symbolization.min_scale,
        max_scale: symbolization.max_scale,
        color_mask,
    }
}

/// Reads opacity and scale range from a style.
///
/// Never fails: a missing style draws everywhere at full opacity, and an
/// unusable one is logged and treated the same way.
pub fn extract_symbolization(style: Option<&Style>) -> Symbolization {
    let Some(style) = style else {
        return Symbolization::default();
    };
    match try_extract_symbolization(style) {
        Ok(symbolization) => {
            if symbolization.min_scale > symbolization.max_scale {
                warn!(
                    "style '{}' has min scale {} above max scale {}; layer will not draw",
                    style.name, symbolization.min_scale, symbolization.max_scale
                );
            }
            symbolization
        }
        Err(e) => {
            warn!("falling back to default symbolization: {}", e);
            Symbolization::default()
        }
    }
}

fn try_extract_symbolization(style: &Style) -> Result<Symbolization, StyleExtractionError> {
    let rule = style.first_rule()?;
    let opacity = rule
        .raster_symbolizer()
        .map(symbolizer_opacity)
        .unwrap_or(DEFAULT_OPACITY);
    Ok(Symbolization {
        opacity,
        min_scale: rule.min_scale(),
        max_scale: rule.max_scale(),
    })
}

fn symbolizer_opacity(symbolizer: &RasterSymbolizer) -> f32 {
    let Some(expression) = &symbolizer.opacity else {
        return DEFAULT_OPACITY;
    };
    match expression.evaluate(None) {
        Value::Number(n) if n.is_finite() => {
            let clamped = n.clamp(0.0, 1.0);
            if clamped != n {
                debug!("opacity {} clamped to {}", n, clamped);
            }
            clamped as f32
        }
        other => {
            debug!("opacity expression evaluated to {:?}; using {}", other, DEFAULT_OPACITY);
            DEFAULT_OPACITY
        }
    }
}

fn extract_color_mask(blackboard: &StyleBlackboard, layer_name: &str) -> Option<ColorMask> {
    match blackboard.color_mask()? {
        Ok(mask) => Some(mask),
        Err(e) => {
            warn!("ignoring color mask of layer '{}': {}", layer_name, e);
            None
        }
    }
}
