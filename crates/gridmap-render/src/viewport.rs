use serde::{Deserialize, Serialize};

use gridmap_core::geometry::{CoordinateSystem, DisplayArea, Envelope, Point};
use gridmap_core::scale;
use gridmap_core::transform::{world_to_screen, AffineTransform, TransformError};

const MIN_ZOOM: f64 = 1e-9;
const MAX_ZOOM: f64 = 1e9;

/// Represents the current viewport state of a map display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    /// Coordinate system the map is drawn in.
    pub crs: CoordinateSystem,
    /// Center of the display in world coordinates.
    pub center: Point,
    /// Zoom level (pixels per world unit).
    pub zoom: f64,
    /// Display size in pixels.
    pub display: DisplayArea,
}

impl Viewport {
    pub fn new(crs: CoordinateSystem, display: DisplayArea) -> Self {
        Self {
            crs,
            center: Point::new(0.0, 0.0),
            zoom: 1.0,
            display,
        }
    }

    /// A viewport showing exactly `bounds` horizontally, centred on it.
    pub fn fitting(bounds: &Envelope, display: DisplayArea) -> Self {
        let mut viewport = Self::new(bounds.crs.clone(), display);
        viewport.fit_envelope(bounds, 1.0);
        viewport
    }

    /// Pan the viewport by a delta in screen pixels.
    pub fn pan(&mut self, dx: f64, dy: f64) {
        self.center.x -= dx / self.zoom;
        self.center.y += dy / self.zoom;
    }

    /// Zoom in/out keeping the world point under a screen position fixed.
    pub fn zoom_at(&mut self, screen_x: f64, screen_y: f64, factor: f64) {
        let before = self.screen_to_world(screen_x, screen_y);

        self.zoom = (self.zoom * factor).clamp(MIN_ZOOM, MAX_ZOOM);

        let after = self.screen_to_world(screen_x, screen_y);
        self.center.x -= after.x - before.x;
        self.center.y -= after.y - before.y;
    }

    /// Zoom to fit an envelope, leaving `1 - fill` of the display as margin.
    pub fn fit_envelope(&mut self, bounds: &Envelope, fill: f64) {
        let width = bounds.width();
        let height = bounds.height();
        if width <= 0.0 || height <= 0.0 || self.display.is_empty() {
            return;
        }

        self.center = bounds.center();
        let zoom_x = self.display.width as f64 / width * fill;
        let zoom_y = self.display.height as f64 / height * fill;
        self.zoom = zoom_x.min(zoom_y).clamp(MIN_ZOOM, MAX_ZOOM);
    }

    pub fn set_display(&mut self, display: DisplayArea) {
        self.display = display;
    }

    /// Convert a screen position to world coordinates.
    pub fn screen_to_world(&self, screen_x: f64, screen_y: f64) -> Point {
        Point::new(
            (screen_x - self.display.width as f64 / 2.0) / self.zoom + self.center.x,
            self.center.y - (screen_y - self.display.height as f64 / 2.0) / self.zoom,
        )
    }

    /// Convert a world position to screen coordinates.
    pub fn world_to_screen(&self, world: &Point) -> Point {
        Point::new(
            (world.x - self.center.x) * self.zoom + self.display.width as f64 / 2.0,
            (self.center.y - world.y) * self.zoom + self.display.height as f64 / 2.0,
        )
    }

    /// The world extent covered by the display.
    pub fn visible_bounds(&self) -> Envelope {
        let half_w = self.display.width as f64 / (2.0 * self.zoom);
        let half_h = self.display.height as f64 / (2.0 * self.zoom);
        Envelope::new(
            self.center.x - half_w,
            self.center.y - half_h,
            self.center.x + half_w,
            self.center.y + half_h,
            self.crs.clone(),
        )
    }

    pub fn world_to_screen_transform(&self) -> Result<AffineTransform, TransformError> {
        world_to_screen(&self.visible_bounds(), self.display)
    }

    /// Current map scale denominator.
    pub fn scale_denominator(&self) -> f64 {
        scale::scale_denominator(&self.visible_bounds(), self.display)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn viewport() -> Viewport {
        let mut vp = Viewport::new(CoordinateSystem::web_mercator(), DisplayArea::new(800, 600));
        vp.center = Point::new(1000.0, 2000.0);
        vp.zoom = 2.0;
        vp
    }

    #[test]
    fn test_screen_world_round_trip() {
        let vp = viewport();
        let p = Point::new(1010.0, 1990.0);
        let s = vp.world_to_screen(&p);
        assert!((s.x - 420.0).abs() < 1e-10);
        assert!((s.y - 320.0).abs() < 1e-10);
        let back = vp.screen_to_world(s.x, s.y);
        assert!(back.distance_to(&p) < 1e-10);
    }

    #[test]
    fn test_transform_agrees_with_point_mapping() {
        let vp = viewport();
        let at = vp.world_to_screen_transform().unwrap();
        let p = Point::new(950.0, 2100.0);
        let a = at.apply(&p);
        let b = vp.world_to_screen(&p);
        assert!(a.distance_to(&b) < 1e-9);
    }

    #[test]
    fn test_zoom_keeps_cursor_fixed() {
        let mut vp = viewport();
        let anchor = vp.screen_to_world(100.0, 50.0);
        vp.zoom_at(100.0, 50.0, 4.0);
        assert!((vp.zoom - 8.0).abs() < 1e-10);
        let after = vp.screen_to_world(100.0, 50.0);
        assert!(after.distance_to(&anchor) < 1e-9);
    }

    #[test]
    fn test_pan_moves_content_with_cursor() {
        let mut vp = viewport();
        let p = Point::new(1000.0, 2000.0);
        let before = vp.world_to_screen(&p);
        vp.pan(30.0, -10.0);
        let after = vp.world_to_screen(&p);
        assert!((after.x - before.x - 30.0).abs() < 1e-10);
        assert!((after.y - before.y + 10.0).abs() < 1e-10);
    }

    #[test]
    fn test_fit_envelope() {
        let bounds = Envelope::new(0.0, 0.0, 400.0, 100.0, CoordinateSystem::web_mercator());
        let vp = Viewport::fitting(&bounds, DisplayArea::new(800, 600));
        assert!((vp.zoom - 2.0).abs() < 1e-10);
        let visible = vp.visible_bounds();
        assert!((visible.min.x - 0.0).abs() < 1e-10);
        assert!((visible.max.x - 400.0).abs() < 1e-10);
    }

    #[test]
    fn test_scale_denominator_follows_zoom() {
        let mut vp = viewport();
        let before = vp.scale_denominator();
        vp.zoom_at(400.0, 300.0, 2.0);
        assert!((vp.scale_denominator() - before / 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_empty_display_has_no_transform() {
        let vp = Viewport::new(CoordinateSystem::web_mercator(), DisplayArea::new(0, 0));
        assert!(matches!(
            vp.world_to_screen_transform(),
            Err(TransformError::EmptyDisplay { .. })
        ));
    }
}
