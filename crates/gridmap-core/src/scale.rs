//! Scale denominators and the visibility gate applied to scale-dependent styles.

use crate::geometry::{DisplayArea, Envelope};

/// Size of one display pixel in metres (OGC standardized rendering pixel, 0.28 mm).
pub const STANDARD_PIXEL_SIZE_M: f64 = 0.00028;

/// Smallest scale denominator a rule may declare.
pub const DEFAULT_MIN_SCALE: f64 = 0.0;

/// Largest scale denominator a rule may declare (draw at every scale).
pub const DEFAULT_MAX_SCALE: f64 = f64::INFINITY;

/// Decides whether a layer is drawn at `scale`.
///
/// Returns `min_scale <= scale <= max_scale`. Contradictory bounds
/// (`min_scale > max_scale`) never draw, and neither does a NaN scale.
pub fn should_draw(scale: f64, min_scale: f64, max_scale: f64) -> bool {
    if min_scale > max_scale {
        return false;
    }
    min_scale <= scale && scale <= max_scale
}

/// Scale denominator of `bounds` drawn across `display`.
///
/// Uses the horizontal extent only, the way OGC map services do. Returns
/// `f64::INFINITY` for a display without pixels.
pub fn scale_denominator(bounds: &Envelope, display: DisplayArea) -> f64 {
    if display.width == 0 {
        return f64::INFINITY;
    }
    let ground_width_m = bounds.width() * bounds.crs.units.metres_per_unit();
    ground_width_m / (display.width as f64 * STANDARD_PIXEL_SIZE_M)
}
