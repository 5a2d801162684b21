//! Image decoding and tensor preparation

use candle_core::{DType, Device, Tensor};
use chillibot_core::{Error, Result};
use image::imageops::FilterType;
use image::{ImageReader, RgbImage};
use std::path::Path;

/// Decode an image file to 8-bit RGB
///
/// The format is sniffed from the file content; staged uploads do not have
/// trustworthy extensions.
pub fn load_rgb(path: &Path) -> Result<RgbImage> {
    let image = ImageReader::open(path)?
        .with_guessed_format()?
        .decode()
        .map_err(|e| Error::inference(format!("Failed to decode {:?}: {}", path, e)))?;
    Ok(image.to_rgb8())
}

/// Resize to `size`×`size`, scale to `[0, 1]` and lay out as `[1, 3, H, W]`
pub fn to_batch(image: &RgbImage, size: usize, device: &Device) -> Result<Tensor> {
    if size == 0 {
        return Err(Error::inference("Model input size must be positive"));
    }
    let side = u32::try_from(size)
        .map_err(|_| Error::inference(format!("Input size {} is too large", size)))?;
    let resized = image::imageops::resize(image, side, side, FilterType::Triangle);

    Tensor::from_vec(resized.into_raw(), (size, size, 3), device)
        .and_then(|t| t.permute((2, 0, 1)))
        .and_then(|t| t.to_dtype(DType::F32))
        .and_then(|t| t.affine(1.0 / 255.0, 0.0))
        .and_then(|t| t.unsqueeze(0))
        .map_err(|e| Error::inference(format!("Failed to build input tensor: {}", e)))
}

/// Decode and prepare an image file in one step
pub fn prepare(path: &Path, size: usize, device: &Device) -> Result<Tensor> {
    let image = load_rgb(path)?;
    to_batch(&image, size, device)
}
