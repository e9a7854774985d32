//! Drawing surface with mutable graphics state.

use std::ops::{Deref, DerefMut};

use image::{Rgba, RgbaImage};

use gridmap_core::geometry::DisplayArea;
use gridmap_core::transform::AffineTransform;

/// Source-over alpha compositing with a constant extra alpha.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlphaComposite {
    alpha: f32,
}

impl AlphaComposite {
    pub const OPAQUE: Self = Self { alpha: 1.0 };

    /// `alpha` is clamped to `[0, 1]`; NaN becomes fully opaque.
    pub fn source_over(alpha: f32) -> Self {
        let alpha = if alpha.is_nan() { 1.0 } else { alpha.clamp(0.0, 1.0) };
        Self { alpha }
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }
}

impl Default for AlphaComposite {
    fn default() -> Self {
        Self::OPAQUE
    }
}

/// The mutable graphics state of a [`Surface`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SurfaceState {
    /// Maps user space onto pixel space.
    pub transform: AffineTransform,
    pub composite: AlphaComposite,
}

/// An RGBA pixel buffer plus the transform and composite used to draw on it.
#[derive(Debug, Clone)]
pub struct Surface {
    pixels: RgbaImage,
    state: SurfaceState,
}

impl Surface {
    /// A fully transparent surface.
    pub fn new(display: DisplayArea) -> Self {
        Self::from_image(RgbaImage::new(display.width, display.height))
    }

    pub fn filled(display: DisplayArea, color: [u8; 4]) -> Self {
        Self::from_image(RgbaImage::from_pixel(display.width, display.height, Rgba(color)))
    }

    pub fn from_image(pixels: RgbaImage) -> Self {
        Self {
            pixels,
            state: SurfaceState::default(),
        }
    }

    pub fn display(&self) -> DisplayArea {
        DisplayArea::new(self.pixels.width(), self.pixels.height())
    }

    pub fn image(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn into_image(self) -> RgbaImage {
        self.pixels
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgba<u8>> {
        if x < self.pixels.width() && y < self.pixels.height() {
            Some(*self.pixels.get_pixel(x, y))
        } else {
            None
        }
    }

    // ── Graphics state ───────────────────────────────────────────────

    pub fn state(&self) -> SurfaceState {
        self.state
    }

    pub fn transform(&self) -> AffineTransform {
        self.state.transform
    }

    pub fn set_transform(&mut self, transform: AffineTransform) {
        self.state.transform = transform;
    }

    /// Applies `transform` before the current transform.
    pub fn concat_transform(&mut self, transform: &AffineTransform) {
        self.state.transform = self.state.transform.concat(transform);
    }

    pub fn composite(&self) -> AlphaComposite {
        self.state.composite
    }

    pub fn set_composite(&mut self, composite: AlphaComposite) {
        self.state.composite = composite;
    }

    /// Opens a region whose state changes are undone when the guard drops.
    pub fn scoped(&mut self) -> ScopedSurface<'_> {
        let saved = self.state;
        ScopedSurface {
            surface: self,
            saved,
        }
    }

    // ── Pixels ───────────────────────────────────────────────────────

    /// Blends `color` onto pixel `(x, y)` using the current composite.
    ///
    /// Out-of-range coordinates are ignored.
    pub fn blend_pixel(&mut self, x: u32, y: u32, color: Rgba<u8>) {
        if x >= self.pixels.width() || y >= self.pixels.height() {
            return;
        }
        let alpha = self.state.composite.alpha();
        let dst = self.pixels.get_pixel_mut(x, y);
        *dst = source_over(*dst, color, alpha);
    }

    /// Blends another surface on top of this one, both anchored at `(0, 0)`.
    ///
    /// Only the area the two surfaces share is touched.
    pub fn draw_surface(&mut self, top: &Surface) {
        let alpha = self.state.composite.alpha();
        let width = self.pixels.width().min(top.pixels.width());
        let height = self.pixels.height().min(top.pixels.height());
        for y in 0..height {
            for x in 0..width {
                let src = *top.pixels.get_pixel(x, y);
                let dst = self.pixels.get_pixel_mut(x, y);
                *dst = source_over(*dst, src, alpha);
            }
        }
    }
}

fn source_over(dst: Rgba<u8>, src: Rgba<u8>, extra_alpha: f32) -> Rgba<u8> {
    let src_a = src.0[3] as f32 / 255.0 * extra_alpha;
    if src_a <= 0.0 {
        return dst;
    }
    let dst_a = dst.0[3] as f32 / 255.0;

    let out_a = src_a + dst_a * (1.0 - src_a);
    if out_a <= 0.0 {
        return Rgba([0, 0, 0, 0]);
    }

    let blend = |s: u8, d: u8| -> u8 {
        let s = s as f32;
        let d = d as f32;
        ((s * src_a + d * dst_a * (1.0 - src_a)) / out_a).round().clamp(0.0, 255.0) as u8
    };

    Rgba([
        blend(src.0[0], dst.0[0]),
        blend(src.0[1], dst.0[1]),
        blend(src.0[2], dst.0[2]),
        (out_a * 255.0).round().clamp(0.0, 255.0) as u8,
    ])
}

/// Exclusive access to a [`Surface`] that restores its graphics state on drop.
///
/// Pixels drawn through the guard stay; transform and composite changes do not.
pub struct ScopedSurface<'a> {
    surface: &'a mut Surface,
    saved: SurfaceState,
}

impl Deref for ScopedSurface<'_> {
    type Target = Surface;

    fn deref(&self) -> &Surface {
        self.surface
    }
}

impl DerefMut for ScopedSurface<'_> {
    fn deref_mut(&mut self) -> &mut Surface {
        self.surface
    }
}

impl Drop for ScopedSurface<'_> {
    fn drop(&mut self) {
        self.surface.state = self.saved;
    }
}
