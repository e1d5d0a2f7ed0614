use fast_image_resize::images::Image;
use fast_image_resize::{FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer};
use image::RgbaImage;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImageProcessingError {
    #[error("Failed to load image: {0}")]
    LoadError(#[from] image::ImageError),

    #[error("Failed to decode image: {0}")]
    DecodeError(String),

    #[error("Failed to resize image: {0}")]
    ResizeError(String),

    #[error("Unsupported image format")]
    UnsupportedFormat,

    #[error("Invalid image dimensions")]
    InvalidDimensions,

    #[error("Decode task cancelled")]
    Cancelled,
}

pub type ImageResult<T> = Result<T, ImageProcessingError>;

/// A decoded RGBA8 bitmap.
///
/// Pixels are shared behind an `Arc` so the bitmap can be handed from the
/// decode pool to the view layer and cloned per render without copying.
#[derive(Clone, PartialEq, Eq)]
pub struct Bitmap {
    pub width: u32,
    pub height: u32,
    pub pixels: Arc<Vec<u8>>,
}

impl Bitmap {
    pub fn from_rgba(width: u32, height: u32, pixels: Vec<u8>) -> ImageResult<Self> {
        if pixels.len() != width as usize * height as usize * 4 {
            return Err(ImageProcessingError::InvalidDimensions);
        }

        Ok(Self {
            width,
            height,
            pixels: Arc::new(pixels),
        })
    }

    pub fn from_image(image: RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            pixels: Arc::new(image.into_raw()),
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn byte_len(&self) -> usize {
        self.pixels.len()
    }

    pub fn to_rgba_image(&self) -> ImageResult<RgbaImage> {
        RgbaImage::from_raw(self.width, self.height, self.pixels.as_ref().clone())
            .ok_or(ImageProcessingError::InvalidDimensions)
    }
}

impl fmt::Debug for Bitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bitmap")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish_non_exhaustive()
    }
}

/// Largest pixel edge for a logical target size on a display with the given
/// scale factor, rounded up so any visible target gets at least one pixel.
/// Returns 0 for empty or non-finite targets.
pub fn max_pixel_dimension(width: f64, height: f64, scale_factor: f64) -> u32 {
    let max = width.max(height) * scale_factor;
    if !max.is_finite() || max <= 0.0 {
        return 0;
    }

    max.ceil().min(u32::MAX as f64) as u32
}

/// Size of a thumbnail whose longest edge is at most `max_size`.
///
/// Aspect ratio is kept, images already inside the bound keep their native
/// size, and neither edge collapses below one pixel.
pub fn thumbnail_dimensions(width: u32, height: u32, max_size: u32) -> ImageResult<(u32, u32)> {
    if width == 0 || height == 0 || max_size == 0 {
        return Err(ImageProcessingError::InvalidDimensions);
    }

    if width <= max_size && height <= max_size {
        return Ok((width, height));
    }

    if width >= height {
        let scale = max_size as f64 / width as f64;
        Ok((max_size, ((height as f64 * scale).round() as u32).max(1)))
    } else {
        let scale = max_size as f64 / height as f64;
        Ok((((width as f64 * scale).round() as u32).max(1), max_size))
    }
}

pub fn resize_rgba(image: RgbaImage, width: u32, height: u32) -> ImageResult<RgbaImage> {
    let (src_width, src_height) = image.dimensions();
    if (src_width, src_height) == (width, height) {
        return Ok(image);
    }

    let src_image = Image::from_vec_u8(src_width, src_height, image.into_raw(), PixelType::U8x4)
        .map_err(|e| ImageProcessingError::ResizeError(e.to_string()))?;

    let mut dst_image = Image::new(width, height, PixelType::U8x4);

    let options = ResizeOptions::new().resize_alg(ResizeAlg::Convolution(FilterType::Lanczos3));
    let mut resizer = Resizer::new();
    resizer
        .resize(&src_image, &mut dst_image, &options)
        .map_err(|e| ImageProcessingError::ResizeError(e.to_string()))?;

    RgbaImage::from_raw(width, height, dst_image.into_vec())
        .ok_or(ImageProcessingError::InvalidDimensions)
}

/// Downsample a decoded image so that its longest edge fits `max_size`.
pub fn downsample_to_fit(image: RgbaImage, max_size: u32) -> ImageResult<Bitmap> {
    let (width, height) = thumbnail_dimensions(image.width(), image.height(), max_size)?;
    let resized = resize_rgba(image, width, height)?;
    Ok(Bitmap::from_image(resized))
}

pub fn format_image_size(size_bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB"];
    let mut size = size_bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    format!("{:.1} {}", size, UNITS[unit_index])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_pixel_dimension() {
        assert_eq!(max_pixel_dimension(100.0, 100.0, 2.0), 200);
        assert_eq!(max_pixel_dimension(120.0, 80.0, 3.0), 360);
        assert_eq!(max_pixel_dimension(33.3, 10.0, 3.0), 100);
        assert_eq!(max_pixel_dimension(10.3, 10.3, 1.0), 11);
        assert_eq!(max_pixel_dimension(0.0, 0.0, 2.0), 0);
        assert_eq!(max_pixel_dimension(f64::NAN, 10.0, 1.0), 10);
        assert_eq!(max_pixel_dimension(10.0, 10.0, f64::INFINITY), 0);
    }

    #[test]
    fn test_sub_pixel_target_keeps_one_pixel() {
        assert_eq!(max_pixel_dimension(0.4, 0.4, 1.0), 1);
        assert_eq!(max_pixel_dimension(0.2, 0.1, 2.0), 1);
    }

    #[test]
    fn test_thumbnail_dimensions() {
        // Landscape is bounded by width
        assert_eq!(thumbnail_dimensions(400, 200, 100).unwrap(), (100, 50));

        // Portrait is bounded by height
        assert_eq!(thumbnail_dimensions(200, 400, 100).unwrap(), (50, 100));

        // Small images are never upscaled
        assert_eq!(thumbnail_dimensions(16, 16, 256).unwrap(), (16, 16));

        // Extreme ratios keep at least one pixel
        assert_eq!(thumbnail_dimensions(10_000, 2, 100).unwrap(), (100, 1));
    }

    #[test]
    fn test_thumbnail_dimensions_rejects_zero() {
        assert!(matches!(
            thumbnail_dimensions(100, 100, 0),
            Err(ImageProcessingError::InvalidDimensions)
        ));
        assert!(thumbnail_dimensions(0, 100, 10).is_err());
    }

    #[test]
    fn test_downsample_to_fit() {
        let image = RgbaImage::from_pixel(64, 32, image::Rgba([200, 10, 10, 255]));
        let bitmap = downsample_to_fit(image, 16).unwrap();
        assert_eq!(bitmap.dimensions(), (16, 8));
        assert_eq!(bitmap.byte_len(), 16 * 8 * 4);
        assert!(bitmap.pixels[0].abs_diff(200) <= 1);
    }

    #[test]
    fn test_bitmap_from_rgba_validates_length() {
        assert!(Bitmap::from_rgba(2, 2, vec![0; 16]).is_ok());
        assert!(Bitmap::from_rgba(2, 2, vec![0; 15]).is_err());
    }

    #[test]
    fn test_format_image_size() {
        assert_eq!(format_image_size(512), "512.0 B");
        assert_eq!(format_image_size(1536), "1.5 KB");
        assert_eq!(format_image_size(1048576), "1.0 MB");
    }
}
