//! World file georeferencing.
//!
//! A world file is a six-line text sidecar next to a raster image
//! (`.pgw` for PNG, `.jgw` for JPEG, `.tfw` for TIFF, or the generic
//! `.wld`). The lines are, in order:
//!
//! ```text
//! A  pixel size in x
//! D  rotation about y
//! B  rotation about x
//! E  pixel size in y (negative for north-up images)
//! C  x of the centre of the upper-left pixel
//! F  y of the centre of the upper-left pixel
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use gridmap_core::geometry::{CoordinateSystem, Envelope, Point};
use gridmap_core::transform::AffineTransform;

#[derive(Error, Debug)]
pub enum WorldFileError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("world file has {0} values, expected 6")]
    WrongValueCount(usize),

    #[error("invalid number '{value}' on line {line}")]
    InvalidNumber { line: usize, value: String },

    #[error("rotated world files are not supported (D={rotation_y}, B={rotation_x})")]
    Rotated { rotation_y: f64, rotation_x: f64 },

    #[error("world file has zero pixel size")]
    ZeroPixelSize,

    #[error("no world file found next to {0}")]
    NotFound(PathBuf),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorldFile {
    pub pixel_width: f64,
    pub rotation_y: f64,
    pub rotation_x: f64,
    pub pixel_height: f64,
    pub origin_x: f64,
    pub origin_y: f64,
}

impl WorldFile {
    pub fn parse(text: &str) -> Result<Self, WorldFileError> {
        let lines: Vec<(usize, &str)> = text
            .lines()
            .enumerate()
            .map(|(i, l)| (i + 1, l.trim()))
            .filter(|(_, l)| !l.is_empty())
            .collect();
        if lines.len() != 6 {
            return Err(WorldFileError::WrongValueCount(lines.len()));
        }

        let mut values = [0.0; 6];
        for (slot, (line, text)) in values.iter_mut().zip(&lines) {
            *slot = text.parse().map_err(|_| WorldFileError::InvalidNumber {
                line: *line,
                value: text.to_string(),
            })?;
        }

        Ok(Self {
            pixel_width: values[0],
            rotation_y: values[1],
            rotation_x: values[2],
            pixel_height: values[3],
            origin_x: values[4],
            origin_y: values[5],
        })
    }

    pub fn read(path: &Path) -> Result<Self, WorldFileError> {
        Self::parse(&fs::read_to_string(path)?)
    }

    /// Finds and reads the world file belonging to `image_path`.
    pub fn for_image(image_path: &Path) -> Result<Self, WorldFileError> {
        sidecar_candidates(image_path)
            .into_iter()
            .find(|p| p.is_file())
            .ok_or_else(|| WorldFileError::NotFound(image_path.to_path_buf()))
            .and_then(|p| Self::read(&p))
    }

    /// Pixel-corner to world transform. The file references pixel centres.
    pub fn grid_to_world(&self) -> AffineTransform {
        let centre_to_world = AffineTransform::new(
            self.pixel_width,
            self.rotation_y,
            self.rotation_x,
            self.pixel_height,
            self.origin_x,
            self.origin_y,
        );
        centre_to_world.concat(&AffineTransform::translation(-0.5, -0.5))
    }

    /// World envelope of an image of `width` x `height` pixels.
    pub fn envelope(&self, width: u32, height: u32, crs: CoordinateSystem) -> Result<Envelope, WorldFileError> {
        if self.rotation_x != 0.0 || self.rotation_y != 0.0 {
            return Err(WorldFileError::Rotated {
                rotation_y: self.rotation_y,
                rotation_x: self.rotation_x,
            });
        }
        if self.pixel_width == 0.0 || self.pixel_height == 0.0 {
            return Err(WorldFileError::ZeroPixelSize);
        }
        let at = self.grid_to_world();
        let a = at.apply(&Point::new(0.0, 0.0));
        let b = at.apply(&Point::new(width as f64, height as f64));
        Ok(Envelope::new(a.x, a.y, b.x, b.y, crs))
    }
}

fn sidecar_candidates(image_path: &Path) -> Vec<PathBuf> {
    let ext = image_path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    let short = match ext.as_str() {
        "png" => Some("pgw"),
        "jpg" | "jpeg" => Some("jgw"),
        "tif" | "tiff" => Some("tfw"),
        "gif" => Some("gfw"),
        _ => None,
    };

    let mut candidates = Vec::new();
    if let Some(short) = short {
        candidates.push(image_path.with_extension(short));
    }
    if !ext.is_empty() {
        // "photo.png" -> "photo.pngw"
        candidates.push(image_path.with_extension(format!("{}w", ext)));
    }
    candidates.push(image_path.with_extension("wld"));
    candidates
}
