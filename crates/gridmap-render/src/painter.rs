use gridmap_core::coverage::GridCoverage;
use gridmap_core::geometry::Point;

use crate::error::PaintError;
use crate::surface::Surface;

/// Resamples a coverage onto a surface.
///
/// The surface transform maps world coordinates to pixels; painters blend
/// with the surface's current composite and must not change its state.
pub trait RasterPainter: Send + Sync {
    fn paint(&self, surface: &mut Surface, coverage: &GridCoverage) -> Result<(), PaintError>;
}

/// Nearest-neighbour resampling, one sample per destination pixel centre.
#[derive(Debug, Clone, Copy, Default)]
pub struct NearestNeighbourPainter;

impl RasterPainter for NearestNeighbourPainter {
    fn paint(&self, surface: &mut Surface, coverage: &GridCoverage) -> Result<(), PaintError> {
        let screen_to_world = surface.transform().invert()?;
        let world_to_grid = coverage.world_to_grid()?;
        let screen_to_grid = world_to_grid.concat(&screen_to_world);

        let display = surface.display();
        for y in 0..display.height {
            for x in 0..display.width {
                let grid = screen_to_grid.apply(&Point::new(x as f64 + 0.5, y as f64 + 0.5));
                if let Some(color) = coverage.sample(grid.x.floor() as i64, grid.y.floor() as i64) {
                    surface.blend_pixel(x, y, color);
                }
            }
        }
        Ok(())
    }
}
