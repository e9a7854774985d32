use log::debug;

use gridmap_core::coverage::GridCoverage;
use gridmap_core::scale::should_draw;
use gridmap_core::transform::{AffineTransform, TransformError};

use crate::error::RenderError;
use crate::painter::RasterPainter;
use crate::state::RenderState;
use crate::surface::{AlphaComposite, Surface};

/// What the compositor did with a coverage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Composited {
    Drawn,
    /// The current scale lies outside the style's range; nothing was touched.
    OutOfScale,
}

/// Applies a layer's opacity and world-to-screen transform and hands the
/// actual resampling to a [`RasterPainter`].
#[derive(Debug, Clone, Default)]
pub struct Compositor<P> {
    painter: P,
}

impl<P: RasterPainter> Compositor<P> {
    pub fn new(painter: P) -> Self {
        Self { painter }
    }

    pub fn painter(&self) -> &P {
        &self.painter
    }

    /// Draws `coverage` onto `surface`.
    ///
    /// The surface's transform and composite are restored before returning,
    /// whatever the outcome.
    pub fn composite(
        &self,
        surface: &mut Surface,
        coverage: &GridCoverage,
        state: &RenderState,
        transform: &AffineTransform,
        current_scale: f64,
    ) -> Result<Composited, RenderError> {
        if !should_draw(current_scale, state.min_scale, state.max_scale) {
            debug!(
                "scale 1:{:.0} outside [{}, {}]; skipping '{}'",
                current_scale,
                state.min_scale,
                state.max_scale,
                coverage.name()
            );
            return Ok(Composited::OutOfScale);
        }

        if !coverage.crs().is_compatible(&state.world_bounds.crs) {
            return Err(TransformError::IncompatibleCrs {
                from: coverage.crs().clone(),
                to: state.world_bounds.crs.clone(),
            }
            .into());
        }

        let mut scope = surface.scoped();
        scope.set_composite(AlphaComposite::source_over(state.opacity));
        scope.concat_transform(transform);
        self.painter.paint(&mut scope, coverage)?;
        Ok(Composited::Drawn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PaintError;
    use crate::painter::NearestNeighbourPainter;
    use gridmap_core::geometry::{CoordinateSystem, DisplayArea, Envelope};
    use gridmap_core::transform::world_to_screen;
    use image::{Rgba, RgbaImage};

    struct FailingPainter;

    impl RasterPainter for FailingPainter {
        fn paint(&self, surface: &mut Surface, _coverage: &GridCoverage) -> Result<(), PaintError> {
            assert!(surface.composite().alpha() < 1.0);
            Err(PaintError::Factory("no grid coverage factory".into()))
        }
    }

    fn coverage(crs: CoordinateSystem) -> GridCoverage {
        let image = RgbaImage::from_pixel(2, 2, Rgba([200, 10, 10, 255]));
        GridCoverage::new("red", image, Envelope::new(0.0, 0.0, 10.0, 10.0, crs)).unwrap()
    }

    fn state(opacity: f32, min_scale: f64, max_scale: f64) -> RenderState {
        RenderState {
            display_area: DisplayArea::new(4, 4),
            world_bounds: Envelope::new(0.0, 0.0, 10.0, 10.0, CoordinateSystem::web_mercator()),
            opacity,
            min_scale,
            max_scale,
            color_mask: None,
        }
    }

    fn transform(state: &RenderState) -> AffineTransform {
        world_to_screen(&state.world_bounds, state.display_area).unwrap()
    }

    #[test]
    fn test_draws_with_opacity() {
        let compositor = Compositor::new(NearestNeighbourPainter);
        let mut surface = Surface::new(DisplayArea::new(4, 4));
        let st = state(0.5, 0.0, f64::INFINITY);
        let result = compositor
            .composite(&mut surface, &coverage(CoordinateSystem::web_mercator()), &st, &transform(&st), 1000.0)
            .unwrap();
        assert_eq!(result, Composited::Drawn);
        let p = surface.pixel(2, 2).unwrap();
        assert!((p[3] as i32 - 128).abs() <= 1);
        assert_eq!(surface.composite(), AlphaComposite::OPAQUE);
        assert_eq!(surface.transform(), AffineTransform::IDENTITY);
    }

    #[test]
    fn test_out_of_scale_leaves_surface() {
        let compositor = Compositor::new(NearestNeighbourPainter);
        let mut surface = Surface::new(DisplayArea::new(4, 4));
        let st = state(1.0, 10.0, 100.0);
        let result = compositor
            .composite(&mut surface, &coverage(CoordinateSystem::web_mercator()), &st, &transform(&st), 5000.0)
            .unwrap();
        assert_eq!(result, Composited::OutOfScale);
        assert!(surface.image().pixels().all(|p| p[3] == 0));
    }

    #[test]
    fn test_painter_error_restores_state() {
        let compositor = Compositor::new(FailingPainter);
        let mut surface = Surface::new(DisplayArea::new(4, 4));
        let before = surface.state();
        let st = state(0.25, 0.0, f64::INFINITY);
        let err = compositor
            .composite(&mut surface, &coverage(CoordinateSystem::web_mercator()), &st, &transform(&st), 1.0)
            .unwrap_err();
        assert!(matches!(err, RenderError::Paint(PaintError::Factory(_))));
        assert_eq!(surface.state(), before);
    }

    #[test]
    fn test_incompatible_crs_rejected() {
        let compositor = Compositor::new(NearestNeighbourPainter);
        let mut surface = Surface::new(DisplayArea::new(4, 4));
        let st = state(1.0, 0.0, f64::INFINITY);
        let err = compositor
            .composite(&mut surface, &coverage(CoordinateSystem::wgs84()), &st, &transform(&st), 1.0)
            .unwrap_err();
        assert!(matches!(err, RenderError::Transform(TransformError::IncompatibleCrs { .. })));
        assert!(surface.image().pixels().all(|p| p[3] == 0));
    }
}
