//! Per-layer raster renderer.
//!
//! Loads a layer's coverage into memory and draws it for the current
//! viewport. Renders on the same renderer are serialized; different
//! renderers may run concurrently on their own threads.

use std::sync::{Arc, Mutex, PoisonError};

use log::{debug, error, info, warn};

use gridmap_core::coverage::{GridRequest, RasterLoadError};
use gridmap_core::layer::{Layer, LayerStatus};
use gridmap_core::progress::ProgressToken;

use crate::compositor::{Composited, Compositor};
use crate::error::RenderError;
use crate::painter::{NearestNeighbourPainter, RasterPainter};
use crate::state::{compute_render_state, RenderContext};
use crate::surface::Surface;
use crate::viewport::Viewport;

const RENDERING_STATUS: &str = "Rendering raster";

/// Why a layer produced no pixels without failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    OutOfScale,
    /// The layer's resource cannot produce rasters.
    NoLoader,
    NoData,
    Cancelled,
    Hidden,
    OutsideViewport,
}

#[derive(Debug)]
pub enum RenderOutcome {
    Drawn,
    Skipped(SkipReason),
    Failed(RenderError),
}

impl RenderOutcome {
    pub fn is_drawn(&self) -> bool {
        matches!(self, RenderOutcome::Drawn)
    }
}

/// Lifecycle of a renderer's current pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RendererState {
    Idle,
    Starting,
    Done,
}

/// Renders one raster layer.
pub struct RasterRenderer<P = NearestNeighbourPainter> {
    layer: Arc<Layer>,
    compositor: Compositor<P>,
    render_lock: Mutex<()>,
    state: Mutex<RendererState>,
    active: Mutex<Option<ProgressToken>>,
}

impl RasterRenderer<NearestNeighbourPainter> {
    pub fn new(layer: Arc<Layer>) -> Self {
        Self::with_painter(layer, NearestNeighbourPainter)
    }
}

impl<P: RasterPainter> RasterRenderer<P> {
    pub fn with_painter(layer: Arc<Layer>, painter: P) -> Self {
        Self {
            layer,
            compositor: Compositor::new(painter),
            render_lock: Mutex::new(()),
            state: Mutex::new(RendererState::Idle),
            active: Mutex::new(None),
        }
    }

    pub fn layer(&self) -> &Arc<Layer> {
        &self.layer
    }

    pub fn state(&self) -> RendererState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: RendererState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    /// Cancels the pass in progress, if any, and resets the renderer.
    pub fn stop_rendering(&self) {
        if let Some(token) = self.active.lock().unwrap_or_else(PoisonError::into_inner).as_ref() {
            token.cancel();
        }
        self.set_state(RendererState::Idle);
    }

    /// Draws the layer onto `surface` for `viewport`.
    ///
    /// Never panics on bad data and never leaves the surface's transform or
    /// composite changed. The layer status ends as `Done`, or `Failed` when
    /// the outcome is a failure.
    pub fn render(&self, surface: &mut Surface, viewport: &Viewport, progress: &ProgressToken) -> RenderOutcome {
        let _exclusive = self.render_lock.lock().unwrap_or_else(PoisonError::into_inner);
        // stop_rendering cancels this pass only, never the caller's token.
        let pass = progress.child();
        *self.active.lock().unwrap_or_else(PoisonError::into_inner) = Some(pass.clone());

        self.layer.set_status(LayerStatus::Waiting, Some(RENDERING_STATUS));
        let outcome = match self.render_pass(surface, viewport, &pass) {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("layer '{}' failed to render: {}", self.layer.name, e);
                RenderOutcome::Failed(e)
            }
        };

        let final_status = match outcome {
            RenderOutcome::Failed(_) => LayerStatus::Failed,
            _ => LayerStatus::Done,
        };
        self.layer.set_status(final_status, None);
        *self.active.lock().unwrap_or_else(PoisonError::into_inner) = None;
        outcome
    }

    fn render_pass(
        &self,
        surface: &mut Surface,
        viewport: &Viewport,
        progress: &ProgressToken,
    ) -> Result<RenderOutcome, RenderError> {
        let state = compute_render_state(&RenderContext::new(&self.layer, viewport));
        let transform = viewport.world_to_screen_transform()?;

        let scale = viewport.scale_denominator();
        if !gridmap_core::should_draw(scale, state.min_scale, state.max_scale) {
            debug!("layer '{}' not visible at 1:{:.0}", self.layer.name, scale);
            return Ok(RenderOutcome::Skipped(SkipReason::OutOfScale));
        }
        if progress.is_cancelled() {
            return Ok(RenderOutcome::Skipped(SkipReason::Cancelled));
        }

        let Some(loader) = self.layer.resource().coverage_loader() else {
            warn!(
                "resource '{}' of layer '{}' cannot load rasters",
                self.layer.resource().identifier(),
                self.layer.name
            );
            return Ok(RenderOutcome::Skipped(SkipReason::NoLoader));
        };

        self.layer.set_status(LayerStatus::Working, Some(RENDERING_STATUS));
        self.set_state(RendererState::Starting);

        let request = GridRequest {
            bounds: state.world_bounds.clone(),
            display: state.display_area,
        };
        let coverage = match loader.load(&request, progress) {
            Ok(Some(coverage)) => coverage,
            Ok(None) => {
                debug!("layer '{}' has no data for {}", self.layer.name, request.bounds);
                self.set_state(RendererState::Done);
                return Ok(RenderOutcome::Skipped(SkipReason::NoData));
            }
            Err(RasterLoadError::Cancelled) => {
                self.set_state(RendererState::Done);
                return Ok(RenderOutcome::Skipped(SkipReason::Cancelled));
            }
            Err(e) => return Err(e.into()),
        };

        let coverage = match state.color_mask {
            Some(mask) => Arc::new(coverage.with_transparent_color(mask)),
            None => coverage,
        };

        if progress.is_cancelled() {
            self.set_state(RendererState::Done);
            return Ok(RenderOutcome::Skipped(SkipReason::Cancelled));
        }

        let outcome = match self.compositor.composite(surface, &coverage, &state, &transform, scale)? {
            Composited::Drawn => {
                info!("layer '{}' drawn at 1:{:.0}", self.layer.name, scale);
                RenderOutcome::Drawn
            }
            Composited::OutOfScale => RenderOutcome::Skipped(SkipReason::OutOfScale),
        };
        self.set_state(RendererState::Done);
        Ok(outcome)
    }
}
