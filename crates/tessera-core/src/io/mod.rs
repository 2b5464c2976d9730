pub mod image_io;
pub mod manifest;

pub use image_io::{load_raster, save_flat_image, save_flat_png, save_flat_tiff};
pub use manifest::{Manifest, ManifestTile, MontageResult, TileTransform};
