use std::io;

use thiserror::Error;

use gridmap_core::coverage::RasterLoadError;
use gridmap_core::transform::TransformError;

/// Failure inside a [`RasterPainter`](crate::painter::RasterPainter).
#[derive(Error, Debug)]
pub enum PaintError {
    #[error("I/O error while reading source data: {0}")]
    Io(#[from] io::Error),

    #[error("cannot set up grid mapping: {0}")]
    Transform(#[from] TransformError),

    #[error("painter setup failed: {0}")]
    Factory(String),
}

/// Why a layer could not be drawn this frame.
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("transform error: {0}")]
    Transform(#[from] TransformError),

    #[error("raster load error: {0}")]
    RasterLoad(#[from] RasterLoadError),

    #[error("paint error: {0}")]
    Paint(#[from] PaintError),

    #[error("render aborted: {0}")]
    Aborted(String),
}
