use std::fmt;
use std::io;
use std::sync::Arc;

use image::{Rgba, RgbaImage};
use log::debug;
use thiserror::Error;

use crate::geometry::{CoordinateSystem, DisplayArea, Envelope};
use crate::progress::ProgressToken;
use crate::style::ColorMask;
use crate::transform::{world_to_screen, AffineTransform, TransformError};

// ── Errors ────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum RasterLoadError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("cannot decode raster '{resource}': {message}")]
    Decode { resource: String, message: String },

    #[error("invalid grid geometry: {0}")]
    InvalidGeometry(String),

    #[error("raster load cancelled")]
    Cancelled,
}

// ── Grid coverage ─────────────────────────────────────────────────────

/// A georeferenced raster: an RGBA image covering a world envelope.
///
/// Row 0 of the image is the northern edge of the envelope.
#[derive(Clone)]
pub struct GridCoverage {
    name: String,
    image: RgbaImage,
    envelope: Envelope,
}

impl fmt::Debug for GridCoverage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GridCoverage")
            .field("name", &self.name)
            .field("width", &self.image.width())
            .field("height", &self.image.height())
            .field("envelope", &self.envelope)
            .finish()
    }
}

impl GridCoverage {
    pub fn new(name: &str, image: RgbaImage, envelope: Envelope) -> Result<Self, RasterLoadError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(RasterLoadError::InvalidGeometry(format!("raster '{}' has no pixels", name)));
        }
        if envelope.is_empty() {
            return Err(RasterLoadError::InvalidGeometry(format!(
                "raster '{}' has empty envelope {}",
                name, envelope
            )));
        }
        Ok(Self {
            name: name.to_string(),
            image,
            envelope,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    pub fn crs(&self) -> &CoordinateSystem {
        &self.envelope.crs
    }

    pub fn grid_size(&self) -> DisplayArea {
        DisplayArea::new(self.image.width(), self.image.height())
    }

    /// Maps world coordinates to fractional grid coordinates (column, row).
    pub fn world_to_grid(&self) -> Result<AffineTransform, TransformError> {
        world_to_screen(&self.envelope, self.grid_size())
    }

    /// Maps grid coordinates (column, row) to world coordinates.
    pub fn grid_to_world(&self) -> Result<AffineTransform, TransformError> {
        self.world_to_grid()?.invert()
    }

    /// Cell at `(col, row)`, or `None` outside the grid.
    pub fn sample(&self, col: i64, row: i64) -> Option<Rgba<u8>> {
        if col < 0 || row < 0 || col >= self.image.width() as i64 || row >= self.image.height() as i64 {
            return None;
        }
        Some(*self.image.get_pixel(col as u32, row as u32))
    }

    /// Copy of this coverage with every pixel of the mask colour made transparent.
    pub fn with_transparent_color(&self, mask: ColorMask) -> Self {
        let mut image = self.image.clone();
        let mut masked = 0usize;
        for pixel in image.pixels_mut() {
            if mask.matches([pixel[0], pixel[1], pixel[2]]) {
                pixel[3] = 0;
                masked += 1;
            }
        }
        debug!("masked {} pixels of '{}' matching {}", masked, self.name, mask);
        Self {
            name: self.name.clone(),
            image,
            envelope: self.envelope.clone(),
        }
    }
}

// ── Capabilities ──────────────────────────────────────────────────────

/// The grid geometry a loader is asked to fill: world bounds over a pixel grid.
#[derive(Debug, Clone, PartialEq)]
pub struct GridRequest {
    pub bounds: Envelope,
    pub display: DisplayArea,
}

/// Loads raster data for a resource.
///
/// `Ok(None)` means the resource has no data for the request.
pub trait CoverageLoader: Send + Sync {
    fn load(
        &self,
        request: &GridRequest,
        progress: &ProgressToken,
    ) -> Result<Option<Arc<GridCoverage>>, RasterLoadError>;
}

/// A data source backing a layer.
///
/// Capabilities are exposed through typed accessors; a resource that cannot
/// produce rasters returns `None` from [`coverage_loader`](Self::coverage_loader).
pub trait GeoResource: Send + Sync + fmt::Debug {
    fn identifier(&self) -> &str;

    /// World extent of the data, if known.
    fn bounds(&self) -> Option<Envelope>;

    fn coverage_loader(&self) -> Option<&dyn CoverageLoader> {
        None
    }
}

/// A resource whose coverage already lives in memory.
#[derive(Debug, Clone)]
pub struct MemoryCoverage {
    identifier: String,
    bounds: Option<Envelope>,
    coverage: Option<Arc<GridCoverage>>,
}

impl MemoryCoverage {
    pub fn new(coverage: GridCoverage) -> Self {
        Self {
            identifier: format!("memory:{}", coverage.name()),
            bounds: Some(coverage.envelope().clone()),
            coverage: Some(Arc::new(coverage)),
        }
    }

    /// A resource with known bounds whose loader yields no data.
    pub fn empty(identifier: &str, bounds: Option<Envelope>) -> Self {
        Self {
            identifier: identifier.to_string(),
            bounds,
            coverage: None,
        }
    }
}

impl CoverageLoader for MemoryCoverage {
    fn load(
        &self,
        _request: &GridRequest,
        progress: &ProgressToken,
    ) -> Result<Option<Arc<GridCoverage>>, RasterLoadError> {
        if progress.is_cancelled() {
            return Err(RasterLoadError::Cancelled);
        }
        Ok(self.coverage.clone())
    }
}

impl GeoResource for MemoryCoverage {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn bounds(&self) -> Option<Envelope> {
        self.bounds.clone()
    }

    fn coverage_loader(&self) -> Option<&dyn CoverageLoader> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point;

    fn checkerboard() -> GridCoverage {
        let image = RgbaImage::from_fn(4, 2, |x, y| {
            if (x + y) % 2 == 0 {
                Rgba([255, 255, 255, 255])
            } else {
                Rgba([0, 0, 0, 255])
            }
        });
        let env = Envelope::new(0.0, 0.0, 40.0, 20.0, CoordinateSystem::web_mercator());
        GridCoverage::new("checker", image, env).unwrap()
    }

    #[test]
    fn test_grid_to_world_corners() {
        let cov = checkerboard();
        let g2w = cov.grid_to_world().unwrap();
        let origin = g2w.apply(&Point::new(0.0, 0.0));
        assert!((origin.x - 0.0).abs() < 1e-9);
        assert!((origin.y - 20.0).abs() < 1e-9);
        let far = g2w.apply(&Point::new(4.0, 2.0));
        assert!((far.x - 40.0).abs() < 1e-9);
        assert!(far.y.abs() < 1e-9);
    }

    #[test]
    fn test_sample_bounds() {
        let cov = checkerboard();
        assert_eq!(cov.sample(0, 0), Some(Rgba([255, 255, 255, 255])));
        assert_eq!(cov.sample(1, 0), Some(Rgba([0, 0, 0, 255])));
        assert_eq!(cov.sample(-1, 0), None);
        assert_eq!(cov.sample(4, 0), None);
        assert_eq!(cov.sample(0, 2), None);
    }

    #[test]
    fn test_transparent_color() {
        let masked = checkerboard().with_transparent_color(ColorMask::new(0, 0, 0));
        assert_eq!(masked.sample(1, 0).unwrap()[3], 0);
        assert_eq!(masked.sample(0, 0).unwrap()[3], 255);
    }

    #[test]
    fn test_rejects_empty_geometry() {
        let env = Envelope::new(0.0, 0.0, 0.0, 0.0, CoordinateSystem::undefined());
        let err = GridCoverage::new("flat", RgbaImage::new(2, 2), env).unwrap_err();
        assert!(matches!(err, RasterLoadError::InvalidGeometry(_)));
        let env = Envelope::new(0.0, 0.0, 1.0, 1.0, CoordinateSystem::undefined());
        assert!(GridCoverage::new("none", RgbaImage::new(0, 0), env).is_err());
    }

    #[test]
    fn test_memory_coverage_loader() {
        let resource = MemoryCoverage::new(checkerboard());
        let loader = resource.coverage_loader().unwrap();
        let request = GridRequest {
            bounds: resource.bounds().unwrap(),
            display: DisplayArea::new(10, 10),
        };
        assert!(loader.load(&request, &ProgressToken::new()).unwrap().is_some());

        let token = ProgressToken::new();
        token.cancel();
        assert!(matches!(loader.load(&request, &token), Err(RasterLoadError::Cancelled)));

        let empty = MemoryCoverage::empty("nothing", None);
        assert!(empty.load(&request, &ProgressToken::new()).unwrap().is_none());
    }
}
