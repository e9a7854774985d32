//! Raster image files loaded whole into memory.
//!
//! Formats such as JPEG cannot be cropped cheaply, so the entire image is
//! decoded on first use and kept for later frames.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use log::{debug, info};

use gridmap_core::coverage::{CoverageLoader, GeoResource, GridCoverage, GridRequest, RasterLoadError};
use gridmap_core::geometry::{CoordinateSystem, Envelope};
use gridmap_core::progress::ProgressToken;

use crate::world_file::{WorldFile, WorldFileError};

pub struct FileCoverage {
    path: PathBuf,
    identifier: String,
    bounds: Envelope,
    cache: Mutex<Option<Arc<GridCoverage>>>,
}

impl fmt::Debug for FileCoverage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileCoverage")
            .field("path", &self.path)
            .field("bounds", &self.bounds)
            .finish()
    }
}

impl FileCoverage {
    /// A file whose world extent is known up front.
    pub fn new(path: &Path, bounds: Envelope) -> Self {
        Self {
            path: path.to_path_buf(),
            identifier: format!("file:{}", path.display()),
            bounds,
            cache: Mutex::new(None),
        }
    }

    /// A file georeferenced by its world-file sidecar.
    ///
    /// Only the image header is read here to learn the pixel size.
    pub fn from_world_file(path: &Path, crs: CoordinateSystem) -> Result<Self, WorldFileError> {
        let world = WorldFile::for_image(path)?;
        let (width, height) = image::image_dimensions(path)
            .map_err(|e| WorldFileError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
        let bounds = world.envelope(width, height, crs)?;
        Ok(Self::new(path, bounds))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Drops the decoded image; the next load reads the file again.
    pub fn evict(&self) {
        *self.cache.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    fn decode(&self) -> Result<GridCoverage, RasterLoadError> {
        let decoded = image::open(&self.path).map_err(|e| match e {
            image::ImageError::IoError(io) => RasterLoadError::Io(io),
            other => RasterLoadError::Decode {
                resource: self.identifier.clone(),
                message: other.to_string(),
            },
        })?;
        let name = self
            .path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("raster");
        GridCoverage::new(name, decoded.into_rgba8(), self.bounds.clone())
    }
}

impl CoverageLoader for FileCoverage {
    fn load(
        &self,
        request: &GridRequest,
        progress: &ProgressToken,
    ) -> Result<Option<Arc<GridCoverage>>, RasterLoadError> {
        if progress.is_cancelled() {
            return Err(RasterLoadError::Cancelled);
        }
        if !self.bounds.intersects(&request.bounds) {
            debug!("{} does not cover {}", self.identifier, request.bounds);
            return Ok(None);
        }

        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(coverage) = cache.as_ref() {
            return Ok(Some(Arc::clone(coverage)));
        }

        let coverage = Arc::new(self.decode()?);
        info!(
            "loaded {} ({}x{})",
            self.identifier,
            coverage.image().width(),
            coverage.image().height()
        );
        *cache = Some(Arc::clone(&coverage));

        if progress.is_cancelled() {
            return Err(RasterLoadError::Cancelled);
        }
        Ok(Some(coverage))
    }
}

impl GeoResource for FileCoverage {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn bounds(&self) -> Option<Envelope> {
        Some(self.bounds.clone())
    }

    fn coverage_loader(&self) -> Option<&dyn CoverageLoader> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridmap_core::geometry::DisplayArea;
    use image::{Rgba, RgbaImage};
    use std::fs;

    fn write_png(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        RgbaImage::from_pixel(4, 2, Rgba([10, 20, 30, 255])).save(&path).unwrap();
        path
    }

    fn request(bounds: Envelope) -> GridRequest {
        GridRequest {
            bounds,
            display: DisplayArea::new(16, 16),
        }
    }

    #[test]
    fn test_load_and_cache() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(dir.path(), "a.png");
        let bounds = Envelope::new(0.0, 0.0, 4.0, 2.0, CoordinateSystem::web_mercator());
        let file = FileCoverage::new(&path, bounds.clone());

        let first = file.load(&request(bounds.clone()), &ProgressToken::new()).unwrap().unwrap();
        assert_eq!(first.image().dimensions(), (4, 2));
        assert_eq!(first.name(), "a");

        // Cached: survives the file disappearing.
        fs::remove_file(&path).unwrap();
        let second = file.load(&request(bounds.clone()), &ProgressToken::new()).unwrap().unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        file.evict();
        assert!(matches!(
            file.load(&request(bounds), &ProgressToken::new()),
            Err(RasterLoadError::Io(_))
        ));
    }

    #[test]
    fn test_no_data_outside_bounds() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(dir.path(), "b.png");
        let file = FileCoverage::new(&path, Envelope::new(0.0, 0.0, 4.0, 2.0, CoordinateSystem::web_mercator()));
        let far = Envelope::new(100.0, 100.0, 200.0, 200.0, CoordinateSystem::web_mercator());
        assert!(file.load(&request(far), &ProgressToken::new()).unwrap().is_none());
    }

    #[test]
    fn test_corrupt_file_is_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.png");
        fs::write(&path, b"definitely not a png").unwrap();
        let bounds = Envelope::new(0.0, 0.0, 1.0, 1.0, CoordinateSystem::undefined());
        let file = FileCoverage::new(&path, bounds.clone());
        assert!(matches!(
            file.load(&request(bounds), &ProgressToken::new()),
            Err(RasterLoadError::Decode { .. })
        ));
    }

    #[test]
    fn test_world_file_georeferencing() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(dir.path(), "d.png");
        fs::write(dir.path().join("d.pgw"), "2\n0\n0\n-2\n101\n199\n").unwrap();
        let file = FileCoverage::from_world_file(&path, CoordinateSystem::web_mercator()).unwrap();
        let bounds = file.bounds().unwrap();
        assert!((bounds.min.x - 100.0).abs() < 1e-9);
        assert!((bounds.max.x - 108.0).abs() < 1e-9);
        assert!((bounds.max.y - 200.0).abs() < 1e-9);
        assert!((bounds.min.y - 196.0).abs() < 1e-9);
    }

    #[test]
    fn test_cancelled_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(dir.path(), "e.png");
        let bounds = Envelope::new(0.0, 0.0, 4.0, 2.0, CoordinateSystem::undefined());
        let file = FileCoverage::new(&path, bounds.clone());
        let token = ProgressToken::new();
        token.cancel();
        assert!(matches!(file.load(&request(bounds), &token), Err(RasterLoadError::Cancelled)));
    }
}
