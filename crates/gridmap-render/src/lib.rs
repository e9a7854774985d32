//! # Gridmap Render
//!
//! Raster layer rendering pipeline.
//!
//! For every layer and frame the pipeline computes an immutable
//! [`RenderState`] from the layer's style and the [`Viewport`], gates it on
//! the current scale, builds the world-to-screen transform and composites
//! the layer's coverage onto a [`Surface`] with the style's opacity.
//! [`MapComposition`] drives all layers of a map at once.

pub mod viewport;
pub mod state;
pub mod surface;
pub mod painter;
pub mod compositor;
pub mod renderer;
pub mod composition;
pub mod error;

pub use composition::{CompositionReport, LayerOutcome, MapComposition};
pub use compositor::{Composited, Compositor};
pub use error::{PaintError, RenderError};
pub use painter::{NearestNeighbourPainter, RasterPainter};
pub use renderer::{RasterRenderer, RenderOutcome, RendererState, SkipReason};
pub use state::{compute_render_state, RenderContext, RenderState};
pub use surface::{AlphaComposite, Surface};
pub use viewport::Viewport;
