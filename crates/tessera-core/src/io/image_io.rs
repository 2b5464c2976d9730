use std::path::Path;

use image::{GrayAlphaImage, ImageBuffer, ImageFormat, Luma, LumaA};
use ndarray::Array2;

use crate::error::{Result, TesseraError};
use crate::raster::{FlatRaster, Raster};

/// Save a flat raster as 16-bit grayscale TIFF. Transparent pixels are black.
pub fn save_flat_tiff(flat: &FlatRaster, path: &Path) -> Result<()> {
    let h = flat.height();
    let w = flat.width();

    let mut pixels: Vec<u16> = Vec::with_capacity(h * w);
    for row in 0..h {
        for col in 0..w {
            let val = flat.image[[row, col]] * flat.alpha[[row, col]];
            pixels.push((val.clamp(0.0, 1.0) * 65535.0) as u16);
        }
    }

    let img = ImageBuffer::<Luma<u16>, Vec<u16>>::from_raw(w as u32, h as u32, pixels)
        .ok_or(TesseraError::InvalidDimensions {
            width: w,
            height: h,
        })?;
    img.save_with_format(path, ImageFormat::Tiff)?;
    Ok(())
}

/// Save a flat raster as 8-bit gray + alpha PNG.
pub fn save_flat_png(flat: &FlatRaster, path: &Path) -> Result<()> {
    let h = flat.height();
    let w = flat.width();

    let mut img = GrayAlphaImage::new(w as u32, h as u32);
    for row in 0..h {
        for col in 0..w {
            let val = (flat.image[[row, col]].clamp(0.0, 1.0) * 255.0) as u8;
            let alpha = (flat.alpha[[row, col]].clamp(0.0, 1.0) * 255.0) as u8;
            img.put_pixel(col as u32, row as u32, LumaA([val, alpha]));
        }
    }

    img.save_with_format(path, ImageFormat::Png)?;
    Ok(())
}

/// Save a flat raster, choosing format from file extension.
pub fn save_flat_image(flat: &FlatRaster, path: &Path) -> Result<()> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("png") => save_flat_png(flat, path),
        _ => save_flat_tiff(flat, path),
    }
}

/// Load a tile image as grayscale in [0, 1]. An alpha channel, if present,
/// becomes the raster's mask.
pub fn load_raster(path: &Path) -> Result<Raster> {
    let img = image::open(path)?;
    if img.color().has_alpha() {
        let gray = img.to_luma_alpha16();
        let (w, h) = gray.dimensions();
        let mut data = Array2::<f32>::zeros((h as usize, w as usize));
        let mut alpha = Array2::<f32>::zeros((h as usize, w as usize));
        for (col, row, pixel) in gray.enumerate_pixels() {
            data[[row as usize, col as usize]] = pixel.0[0] as f32 / 65535.0;
            alpha[[row as usize, col as usize]] = pixel.0[1] as f32 / 65535.0;
        }
        return Raster::with_alpha(data, alpha);
    }

    let gray = img.to_luma16();
    let (w, h) = gray.dimensions();
    let mut data = Array2::<f32>::zeros((h as usize, w as usize));
    for (col, row, pixel) in gray.enumerate_pixels() {
        data[[row as usize, col as usize]] = pixel.0[0] as f32 / 65535.0;
    }
    Ok(Raster::new(data))
}
