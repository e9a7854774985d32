//! # Gridmap Core
//!
//! Core types of the gridmap raster pipeline: world geometry and coordinate
//! systems, affine world-to-screen transforms, the scale gate, the style
//! model, layers with their style blackboard, grid coverages and the
//! capabilities used to load them.
//!
//! Nothing in this crate draws; see `gridmap-render` for the pipeline itself.

pub mod geometry;
pub mod transform;
pub mod scale;
pub mod style;
pub mod coverage;
pub mod layer;
pub mod progress;
pub mod spatial;

pub use coverage::{CoverageLoader, GeoResource, GridCoverage, GridRequest, MemoryCoverage, RasterLoadError};
pub use geometry::{CoordinateSystem, DisplayArea, Envelope, Point, Units};
pub use layer::{Layer, LayerId, LayerStack, LayerStatus, StyleBlackboard};
pub use progress::ProgressToken;
pub use scale::should_draw;
pub use style::{ColorMask, Style, StyleExtractionError};
pub use transform::{world_to_screen, AffineTransform, TransformError};
