//! Multi-layer map composition.
//!
//! Each visible layer renders on its own thread onto its own off-screen
//! surface; the surfaces are then blended onto the target bottom-up. A
//! layer that fails shows as blank and does not affect the others.

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

use log::{debug, error, info};

use gridmap_core::layer::{LayerId, LayerStack};
use gridmap_core::progress::ProgressToken;
use gridmap_core::spatial::{LayerEntry, LayerIndex};

use crate::error::RenderError;
use crate::painter::{NearestNeighbourPainter, RasterPainter};
use crate::renderer::{RasterRenderer, RenderOutcome, SkipReason};
use crate::surface::Surface;
use crate::viewport::Viewport;

/// Outcome of one layer within a composition pass.
#[derive(Debug)]
pub struct LayerOutcome {
    pub layer_id: LayerId,
    pub name: String,
    pub outcome: RenderOutcome,
}

#[derive(Debug, Default)]
pub struct CompositionReport {
    /// One entry per layer, in stack order.
    pub layers: Vec<LayerOutcome>,
}

impl CompositionReport {
    pub fn drawn_count(&self) -> usize {
        self.layers.iter().filter(|l| l.outcome.is_drawn()).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &LayerOutcome> {
        self.layers
            .iter()
            .filter(|l| matches!(l.outcome, RenderOutcome::Failed(_)))
    }

    pub fn outcome(&self, id: LayerId) -> Option<&RenderOutcome> {
        self.layers.iter().find(|l| l.layer_id == id).map(|l| &l.outcome)
    }
}

/// Draws every layer of a stack for a viewport.
pub struct MapComposition<P = NearestNeighbourPainter> {
    renderers: Vec<Arc<RasterRenderer<P>>>,
}

impl MapComposition<NearestNeighbourPainter> {
    pub fn new(stack: &LayerStack) -> Self {
        Self::with_painter(stack, NearestNeighbourPainter)
    }
}

impl<P: RasterPainter + Clone> MapComposition<P> {
    pub fn with_painter(stack: &LayerStack, painter: P) -> Self {
        let renderers = stack
            .all_layers()
            .iter()
            .map(|layer| Arc::new(RasterRenderer::with_painter(Arc::clone(layer), painter.clone())))
            .collect();
        Self { renderers }
    }

    pub fn renderers(&self) -> &[Arc<RasterRenderer<P>>] {
        &self.renderers
    }

    /// Cancels every layer pass in progress.
    pub fn stop_rendering(&self) {
        for renderer in &self.renderers {
            renderer.stop_rendering();
        }
    }

    /// Renders all layers onto `target`.
    ///
    /// The viewport's centre and zoom are kept; its display size is taken
    /// from `target`.
    pub fn render(&self, target: &mut Surface, viewport: &Viewport, progress: &ProgressToken) -> CompositionReport {
        let mut sized = viewport.clone();
        if sized.display != target.display() {
            debug!(
                "viewport display {}x{} resized to target {}x{}",
                viewport.display.width,
                viewport.display.height,
                target.display().width,
                target.display().height
            );
            sized.set_display(target.display());
        }
        let viewport = &sized;
        let in_view = self.layers_in_view(viewport);

        let results: Vec<(usize, Option<Surface>, RenderOutcome)> = thread::scope(|scope| {
            let mut handles = Vec::new();
            let mut results = Vec::new();

            for (index, renderer) in self.renderers.iter().enumerate() {
                let layer = renderer.layer();
                if !layer.is_visible() {
                    results.push((index, None, RenderOutcome::Skipped(SkipReason::Hidden)));
                    continue;
                }
                if !in_view.contains(&layer.id) {
                    debug!("layer '{}' lies outside the viewport", layer.name);
                    results.push((index, None, RenderOutcome::Skipped(SkipReason::OutsideViewport)));
                    continue;
                }

                let renderer = Arc::clone(renderer);
                let handle = thread::Builder::new()
                    .name(format!("render-{}", layer.name))
                    .spawn_scoped(scope, move || {
                        let mut surface = Surface::new(viewport.display);
                        let outcome = renderer.render(&mut surface, viewport, progress);
                        (surface, outcome)
                    });
                match handle {
                    Ok(handle) => handles.push((index, handle)),
                    Err(e) => {
                        error!("cannot start render thread for layer '{}': {}", layer.name, e);
                        results.push((index, None, RenderOutcome::Failed(RenderError::Aborted(e.to_string()))));
                    }
                }
            }

            for (index, handle) in handles {
                match handle.join() {
                    Ok((surface, outcome)) => results.push((index, Some(surface), outcome)),
                    Err(_) => {
                        let name = &self.renderers[index].layer().name;
                        error!("render thread for layer '{}' panicked", name);
                        results.push((
                            index,
                            None,
                            RenderOutcome::Failed(RenderError::Aborted(format!("render thread for '{}' panicked", name))),
                        ));
                    }
                }
            }
            results
        });

        let mut results = results;
        results.sort_by_key(|(index, _, _)| *index);

        let mut report = CompositionReport::default();
        for (index, surface, outcome) in results {
            if let (Some(surface), true) = (surface, outcome.is_drawn()) {
                target.draw_surface(&surface);
            }
            let layer = self.renderers[index].layer();
            report.layers.push(LayerOutcome {
                layer_id: layer.id,
                name: layer.name.clone(),
                outcome,
            });
        }

        info!(
            "composed {} of {} layers ({} failed)",
            report.drawn_count(),
            report.layers.len(),
            report.failures().count()
        );
        report
    }

    /// Layers that may cover the visible area. Layers with unknown extent always qualify.
    fn layers_in_view(&self, viewport: &Viewport) -> HashSet<LayerId> {
        let mut in_view = HashSet::new();
        let mut entries = Vec::new();
        for renderer in &self.renderers {
            let layer = renderer.layer();
            match layer.bounds() {
                Some(bounds) if bounds.crs.is_compatible(&viewport.crs) => {
                    entries.push(LayerEntry {
                        layer_id: layer.id,
                        bounds,
                    });
                }
                // Incompatible extents are left for the renderer to report.
                _ => {
                    in_view.insert(layer.id);
                }
            }
        }
        let index = LayerIndex::build(entries);
        in_view.extend(index.query_envelope(&viewport.visible_bounds()));
        in_view
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridmap_core::coverage::{GridCoverage, MemoryCoverage};
    use gridmap_core::geometry::{CoordinateSystem, DisplayArea, Envelope};
    use gridmap_core::layer::Layer;
    use gridmap_core::style::{RasterSymbolizer, Rule, Style};
    use image::{Rgba, RgbaImage};

    fn env(x1: f64, y1: f64, x2: f64, y2: f64) -> Envelope {
        Envelope::new(x1, y1, x2, y2, CoordinateSystem::web_mercator())
    }

    fn solid(name: &str, bounds: Envelope, color: [u8; 4]) -> Layer {
        let image = RgbaImage::from_pixel(4, 4, Rgba(color));
        let coverage = GridCoverage::new(name, image, bounds).unwrap();
        Layer::new(name, Arc::new(MemoryCoverage::new(coverage)))
    }

    fn viewport() -> Viewport {
        Viewport::fitting(&env(0.0, 0.0, 100.0, 100.0), DisplayArea::new(10, 10))
    }

    #[test]
    fn test_layers_blend_in_stack_order() {
        let mut stack = LayerStack::new();
        stack.add_layer(solid("base", env(0.0, 0.0, 100.0, 100.0), [0, 0, 255, 255]));
        stack.add_layer(solid("top", env(0.0, 0.0, 50.0, 100.0), [255, 0, 0, 255]));
        let composition = MapComposition::new(&stack);

        let vp = viewport();
        let mut target = Surface::new(vp.display);
        let report = composition.render(&mut target, &vp, &ProgressToken::new());

        assert_eq!(report.drawn_count(), 2);
        assert_eq!(target.pixel(2, 5).unwrap(), Rgba([255, 0, 0, 255]));
        assert_eq!(target.pixel(8, 5).unwrap(), Rgba([0, 0, 255, 255]));
    }

    #[test]
    fn test_failing_layer_does_not_block_others() {
        let mut stack = LayerStack::new();
        let good = stack.add_layer(solid("good", env(0.0, 0.0, 100.0, 100.0), [0, 255, 0, 255]));
        // Different coordinate system: the compositor rejects it.
        let image = RgbaImage::from_pixel(2, 2, Rgba([255, 255, 255, 255]));
        let foreign = GridCoverage::new("foreign", image, Envelope::new(0.0, 0.0, 1.0, 1.0, CoordinateSystem::wgs84())).unwrap();
        let bad = stack.add_layer(Layer::new("bad", Arc::new(MemoryCoverage::new(foreign))));

        let composition = MapComposition::new(&stack);
        let vp = viewport();
        let mut target = Surface::new(vp.display);
        let report = composition.render(&mut target, &vp, &ProgressToken::new());

        assert!(report.outcome(good.id).unwrap().is_drawn());
        assert!(matches!(report.outcome(bad.id), Some(RenderOutcome::Failed(RenderError::Transform(_)))));
        assert_eq!(report.failures().count(), 1);
        assert_eq!(target.pixel(5, 5).unwrap(), Rgba([0, 255, 0, 255]));
    }

    #[test]
    fn test_hidden_and_outside_layers_skipped() {
        let mut stack = LayerStack::new();
        let hidden = stack.add_layer(solid("hidden", env(0.0, 0.0, 100.0, 100.0), [1, 1, 1, 255]));
        hidden.set_visible(false);
        let far = stack.add_layer(solid("far", env(1000.0, 1000.0, 1100.0, 1100.0), [2, 2, 2, 255]));

        let composition = MapComposition::new(&stack);
        let vp = viewport();
        let mut target = Surface::new(vp.display);
        let report = composition.render(&mut target, &vp, &ProgressToken::new());

        assert!(matches!(report.outcome(hidden.id), Some(RenderOutcome::Skipped(SkipReason::Hidden))));
        assert!(matches!(report.outcome(far.id), Some(RenderOutcome::Skipped(SkipReason::OutsideViewport))));
        assert!(target.image().pixels().all(|p| p[3] == 0));
    }

    #[test]
    fn test_target_size_wins_over_viewport() {
        let mut stack = LayerStack::new();
        stack.add_layer(solid("red", env(0.0, 0.0, 100.0, 100.0), [255, 0, 0, 255]));
        let composition = MapComposition::new(&stack);

        // 10x10 viewport onto a 20x10 target: same centre and zoom, wider view.
        let vp = viewport();
        let mut target = Surface::new(DisplayArea::new(20, 10));
        let report = composition.render(&mut target, &vp, &ProgressToken::new());
        assert_eq!(report.drawn_count(), 1);

        for y in 0..10 {
            assert_eq!(target.pixel(2, y).unwrap()[3], 0, "row {}", y);
            assert_eq!(target.pixel(5, y).unwrap(), Rgba([255, 0, 0, 255]), "row {}", y);
            assert_eq!(target.pixel(14, y).unwrap(), Rgba([255, 0, 0, 255]), "row {}", y);
            assert_eq!(target.pixel(17, y).unwrap()[3], 0, "row {}", y);
        }
    }

    #[test]
    fn test_layer_opacity_in_composition() {
        let mut stack = LayerStack::new();
        stack.add_layer(
            solid("veil", env(0.0, 0.0, 100.0, 100.0), [255, 255, 255, 255])
                .with_style(Style::raster("veil", Rule::raster(RasterSymbolizer::with_opacity(0.5)))),
        );
        let composition = MapComposition::new(&stack);
        let vp = viewport();
        let mut target = Surface::filled(vp.display, [0, 0, 0, 255]);
        composition.render(&mut target, &vp, &ProgressToken::new());
        let p = target.pixel(5, 5).unwrap();
        assert!((p[0] as i32 - 128).abs() <= 1, "got {:?}", p);
        assert_eq!(p[3], 255);
    }
}
