use std::path::Path;

use image::ImageFormat;
use log::info;
use thiserror::Error;

use gridmap_render::Surface;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("unsupported output format: {0}")]
    UnsupportedFormat(String),

    #[error("cannot write image: {0}")]
    Image(#[from] image::ImageError),
}

/// Writes a rendered surface to disk. The format follows the file extension.
pub fn save_surface(surface: &Surface, path: &Path) -> Result<(), ExportError> {
    let format = ImageFormat::from_path(path)
        .map_err(|_| ExportError::UnsupportedFormat(path.display().to_string()))?;
    match format {
        ImageFormat::Png => surface.image().save_with_format(path, format)?,
        // JPEG has no alpha channel.
        ImageFormat::Jpeg => image::DynamicImage::ImageRgba8(surface.image().clone())
            .into_rgb8()
            .save_with_format(path, format)?,
        other => return Err(ExportError::UnsupportedFormat(format!("{:?}", other))),
    }
    let display = surface.display();
    info!("wrote {}x{} map to {}", display.width, display.height, path.display());
    Ok(())
}
