//! # Gridmap I/O
//!
//! Map project files, world-file georeferencing, raster file loading and
//! image export. Projects are stored as human-readable JSON next to the
//! raster files they reference.

pub mod project;
pub mod world_file;
pub mod raster_file;
pub mod export;

pub use export::{save_surface, ExportError};
pub use project::{LayerConfig, MapProject, ProjectError, ProjectSettings, ViewportSettings};
pub use raster_file::FileCoverage;
pub use world_file::{WorldFile, WorldFileError};
