use image::{ImageFormat, ImageReader, RgbaImage};
use lru::LruCache;
use shared::image::{Bitmap, ImageProcessingError, ImageResult, downsample_to_fit};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::io::Cursor;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use tracing::debug;

const DEFAULT_INTERMEDIATE_ENTRIES: usize = 4;

/// Turns encoded payloads into bitmaps.
///
/// Calls are synchronous and CPU bound; the loader runs them on the rayon
/// pool.
pub trait Decoder: Send + Sync {
    /// Full-resolution decode.
    fn decode(&self, payload: &[u8]) -> ImageResult<Bitmap>;

    /// Decode to a bitmap whose longest edge is at most
    /// `max_pixel_dimension`. With `cache_intermediate` unset the decoder
    /// must not keep the full-size decode around afterwards.
    fn decode_thumbnail(
        &self,
        payload: &[u8],
        max_pixel_dimension: u32,
        cache_intermediate: bool,
    ) -> ImageResult<Bitmap>;
}

pub struct ImageDecoder {
    intermediates: Mutex<LruCache<u64, Arc<RgbaImage>>>,
}

impl ImageDecoder {
    pub fn new(intermediate_capacity: usize) -> Self {
        let capacity =
            NonZeroUsize::new(intermediate_capacity.max(1)).unwrap_or(NonZeroUsize::MIN);

        Self {
            intermediates: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn intermediate_count(&self) -> usize {
        self.intermediates
            .lock()
            .map(|cache| cache.len())
            .unwrap_or(0)
    }

    pub fn clear_intermediates(&self) {
        if let Ok(mut cache) = self.intermediates.lock() {
            cache.clear();
        }
    }

    fn cached_intermediate(&self, key: u64) -> Option<Arc<RgbaImage>> {
        self.intermediates.lock().ok()?.get(&key).cloned()
    }

    fn insert_intermediate(&self, key: u64, image: Arc<RgbaImage>) {
        if let Ok(mut cache) = self.intermediates.lock() {
            cache.put(key, image);
        }
    }
}

impl Default for ImageDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_INTERMEDIATE_ENTRIES)
    }
}

impl std::fmt::Debug for ImageDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageDecoder")
            .field("intermediates", &self.intermediate_count())
            .finish()
    }
}

impl Decoder for ImageDecoder {
    fn decode(&self, payload: &[u8]) -> ImageResult<Bitmap> {
        let format = guess_format(payload)?;
        let rgba = decode_rgba(payload, format)?;
        Ok(Bitmap::from_image(rgba))
    }

    fn decode_thumbnail(
        &self,
        payload: &[u8],
        max_pixel_dimension: u32,
        cache_intermediate: bool,
    ) -> ImageResult<Bitmap> {
        if max_pixel_dimension == 0 {
            return Err(ImageProcessingError::InvalidDimensions);
        }

        // Hashing is only worth it when an intermediate can be read or written
        let key = (cache_intermediate || self.intermediate_count() > 0)
            .then(|| payload_key(payload));
        if let Some(full) = key.and_then(|key| self.cached_intermediate(key)) {
            debug!("Reusing cached intermediate decode");
            return downsample_to_fit(full.as_ref().clone(), max_pixel_dimension);
        }

        let format = guess_format(payload)?;

        if format == ImageFormat::Jpeg && !cache_intermediate {
            match jpeg::decode_scaled(payload, max_pixel_dimension) {
                Ok(bitmap) => return Ok(bitmap),
                Err(e) => debug!("Scaled JPEG decode failed, falling back: {}", e),
            }
        }

        let full = decode_rgba(payload, format)?;

        if let Some(key) = key.filter(|_| cache_intermediate) {
            let full = Arc::new(full);
            self.insert_intermediate(key, full.clone());
            return downsample_to_fit(full.as_ref().clone(), max_pixel_dimension);
        }

        downsample_to_fit(full, max_pixel_dimension)
    }
}

fn payload_key(payload: &[u8]) -> u64 {
    let mut hasher = DefaultHasher::new();
    payload.hash(&mut hasher);
    hasher.finish()
}

fn guess_format(payload: &[u8]) -> ImageResult<ImageFormat> {
    image::guess_format(payload).map_err(|_| ImageProcessingError::UnsupportedFormat)
}

fn decode_rgba(payload: &[u8], format: ImageFormat) -> ImageResult<RgbaImage> {
    let mut reader = ImageReader::new(Cursor::new(payload));
    reader.set_format(format);
    Ok(reader.decode()?.into_rgba8())
}

mod jpeg {
    use image::RgbaImage;
    use shared::image::{Bitmap, ImageProcessingError, ImageResult, downsample_to_fit};
    use turbojpeg::{Decompressor, Image, PixelFormat, ScalingFactor};

    const FACTORS: [ScalingFactor; 4] = [
        ScalingFactor::ONE_EIGHTH,
        ScalingFactor::ONE_QUARTER,
        ScalingFactor::ONE_HALF,
        ScalingFactor::ONE,
    ];

    fn decode_error(e: turbojpeg::Error) -> ImageProcessingError {
        ImageProcessingError::DecodeError(e.to_string())
    }

    /// Decode through libjpeg-turbo's DCT scaling so the full-resolution
    /// bitmap is never allocated, then trim to the exact bound.
    pub(super) fn decode_scaled(payload: &[u8], max_size: u32) -> ImageResult<Bitmap> {
        let mut decompressor = Decompressor::new().map_err(decode_error)?;
        let header = decompressor.read_header(payload).map_err(decode_error)?;

        // Smallest factor that still covers the requested bound
        let factor = FACTORS
            .into_iter()
            .find(|factor| {
                let scaled = header.scaled(*factor);
                scaled.width.max(scaled.height) >= max_size as usize
            })
            .unwrap_or(ScalingFactor::ONE);

        decompressor
            .set_scaling_factor(factor)
            .map_err(decode_error)?;
        let scaled = header.scaled(factor);

        let mut image = Image {
            pixels: vec![0u8; scaled.width * scaled.height * 4],
            width: scaled.width,
            pitch: scaled.width * 4,
            height: scaled.height,
            format: PixelFormat::RGBA,
        };
        decompressor
            .decompress(payload, image.as_deref_mut())
            .map_err(decode_error)?;

        let rgba = RgbaImage::from_raw(image.width as u32, image.height as u32, image.pixels)
            .ok_or(ImageProcessingError::InvalidDimensions)?;
        downsample_to_fit(rgba, max_size)
    }
}
