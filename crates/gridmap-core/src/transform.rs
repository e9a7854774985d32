use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geometry::{CoordinateSystem, DisplayArea, Envelope, Point};

/// Determinants smaller than this are treated as singular.
const SINGULAR_EPSILON: f64 = 1e-12;

// ── Errors ────────────────────────────────────────────────────────────

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransformError {
    #[error("display area {width}x{height} has no pixels")]
    EmptyDisplay { width: u32, height: u32 },

    #[error("world bounds {0} are empty")]
    EmptyBounds(String),

    #[error("coordinate system {from} cannot be related to {to}")]
    IncompatibleCrs {
        from: CoordinateSystem,
        to: CoordinateSystem,
    },

    #[error("transform is not invertible (determinant {determinant})")]
    NonInvertible { determinant: f64 },
}

// ── Affine transform ──────────────────────────────────────────────────

/// A 2D affine transform.
///
/// Maps `(x, y)` to `(sx*x + shx*y + tx, shy*x + sy*y + ty)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AffineTransform {
    pub sx: f64,
    pub shy: f64,
    pub shx: f64,
    pub sy: f64,
    pub tx: f64,
    pub ty: f64,
}

impl Default for AffineTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl AffineTransform {
    pub const IDENTITY: Self = Self {
        sx: 1.0,
        shy: 0.0,
        shx: 0.0,
        sy: 1.0,
        tx: 0.0,
        ty: 0.0,
    };

    pub fn new(sx: f64, shy: f64, shx: f64, sy: f64, tx: f64, ty: f64) -> Self {
        Self {
            sx,
            shy,
            shx,
            sy,
            tx,
            ty,
        }
    }

    pub fn translation(tx: f64, ty: f64) -> Self {
        Self {
            tx,
            ty,
            ..Self::IDENTITY
        }
    }

    pub fn scale(sx: f64, sy: f64) -> Self {
        Self {
            sx,
            sy,
            ..Self::IDENTITY
        }
    }

    pub fn apply(&self, p: &Point) -> Point {
        Point::new(
            self.sx * p.x + self.shx * p.y + self.tx,
            self.shy * p.x + self.sy * p.y + self.ty,
        )
    }

    /// Returns `self * other`: `other` is applied first, then `self`.
    ///
    /// This matches concatenating `other` onto a graphics context whose
    /// current transform is `self`.
    pub fn concat(&self, other: &AffineTransform) -> Self {
        Self {
            sx: self.sx * other.sx + self.shx * other.shy,
            shy: self.shy * other.sx + self.sy * other.shy,
            shx: self.sx * other.shx + self.shx * other.sy,
            sy: self.shy * other.shx + self.sy * other.sy,
            tx: self.sx * other.tx + self.shx * other.ty + self.tx,
            ty: self.shy * other.tx + self.sy * other.ty + self.ty,
        }
    }

    pub fn determinant(&self) -> f64 {
        self.sx * self.sy - self.shx * self.shy
    }

    pub fn is_finite(&self) -> bool {
        [self.sx, self.shy, self.shx, self.sy, self.tx, self.ty]
            .iter()
            .all(|v| v.is_finite())
    }

    pub fn invert(&self) -> Result<Self, TransformError> {
        let det = self.determinant();
        if !det.is_finite() || det.abs() < SINGULAR_EPSILON || !self.is_finite() {
            return Err(TransformError::NonInvertible { determinant: det });
        }
        Ok(Self {
            sx: self.sy / det,
            shy: -self.shy / det,
            shx: -self.shx / det,
            sy: self.sx / det,
            tx: (self.shx * self.ty - self.sy * self.tx) / det,
            ty: (self.shy * self.tx - self.sx * self.ty) / det,
        })
    }

    pub fn approx_eq(&self, other: &AffineTransform, tolerance: f64) -> bool {
        (self.sx - other.sx).abs() <= tolerance
            && (self.shy - other.shy).abs() <= tolerance
            && (self.shx - other.shx).abs() <= tolerance
            && (self.sy - other.sy).abs() <= tolerance
            && (self.tx - other.tx).abs() <= tolerance
            && (self.ty - other.ty).abs() <= tolerance
    }
}

// ── World to screen ───────────────────────────────────────────────────

/// Builds the transform mapping `bounds` onto the `display` pixel rectangle.
///
/// The upper-left corner of `bounds` lands on pixel `(0, 0)` and screen y
/// grows downwards. Both axes are scaled independently.
pub fn world_to_screen(bounds: &Envelope, display: DisplayArea) -> Result<AffineTransform, TransformError> {
    if display.is_empty() {
        return Err(TransformError::EmptyDisplay {
            width: display.width,
            height: display.height,
        });
    }
    if bounds.is_empty() {
        return Err(TransformError::EmptyBounds(bounds.to_string()));
    }

    let scale_x = display.width as f64 / bounds.width();
    let scale_y = display.height as f64 / bounds.height();
    let transform = AffineTransform::new(
        scale_x,
        0.0,
        0.0,
        -scale_y,
        -bounds.min.x * scale_x,
        bounds.max.y * scale_y,
    );

    // Huge extents can still underflow the scale factors.
    let det = transform.determinant();
    if !det.is_finite() || det.abs() < SINGULAR_EPSILON * SINGULAR_EPSILON {
        return Err(TransformError::NonInvertible { determinant: det });
    }
    Ok(transform)
}
