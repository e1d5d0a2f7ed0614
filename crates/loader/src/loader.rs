use bytes::Bytes;
use loader_config::LoaderConfig;
use shared::image::{Bitmap, ImageProcessingError, ImageResult};
use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::cache::{CachedResponse, HttpCache, TieredHttpCache, shared_cache};
use crate::decoder::{Decoder, ImageDecoder};
use crate::request::ImageRequest;
use crate::transport::{ReqwestTransport, Transport, TransportError};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("No URL to load")]
    MissingUrl,

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Decode error: {0}")]
    Decode(#[from] ImageProcessingError),
}

/// The decoded bitmap, or nothing if any step failed.
pub type LoadResult = Option<Bitmap>;

/// Cache-or-fetch, then decode.
#[derive(Clone)]
pub struct ImageLoader {
    cache: Arc<dyn HttpCache>,
    transport: Arc<dyn Transport>,
    decoder: Arc<dyn Decoder>,
    device_scale_factor: f64,
}

impl Debug for ImageLoader {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageLoader")
            .field("device_scale_factor", &self.device_scale_factor)
            .finish_non_exhaustive()
    }
}

impl ImageLoader {
    pub fn new(
        cache: Arc<dyn HttpCache>,
        transport: Arc<dyn Transport>,
        decoder: Arc<dyn Decoder>,
    ) -> Self {
        Self {
            cache,
            transport,
            decoder,
            device_scale_factor: 1.0,
        }
    }

    /// Loader with its own cache built from `config`.
    pub fn from_config(config: &LoaderConfig) -> Result<Self, TransportError> {
        Self::with_cache(config, Arc::new(TieredHttpCache::from_config(config)))
    }

    /// Loader backed by the process-wide response cache.
    pub fn with_shared_cache(config: &LoaderConfig) -> Result<Self, TransportError> {
        Self::with_cache(config, shared_cache())
    }

    fn with_cache(
        config: &LoaderConfig,
        cache: Arc<dyn HttpCache>,
    ) -> Result<Self, TransportError> {
        let transport = ReqwestTransport::new(config)?;
        Ok(Self::new(
            cache,
            Arc::new(transport),
            Arc::new(ImageDecoder::default()),
        )
        .with_device_scale_factor(config.device_scale_factor))
    }

    pub fn with_device_scale_factor(mut self, device_scale_factor: f64) -> Self {
        self.device_scale_factor = device_scale_factor;
        self
    }

    pub fn device_scale_factor(&self) -> f64 {
        self.device_scale_factor
    }

    /// Load `request`, absorbing every failure into `None`.
    ///
    /// A missing URL is silent, transport failures are logged as warnings
    /// and decode failures at debug level.
    pub async fn load(&self, request: &ImageRequest) -> LoadResult {
        match self.try_load(request).await {
            Ok(bitmap) => Some(bitmap),
            Err(LoadError::MissingUrl) => None,
            Err(LoadError::Transport(e)) => {
                warn!("Error downloading {}: {}", display_url(request), e);
                None
            }
            Err(LoadError::Decode(e)) => {
                debug!("Error decoding {}: {}", display_url(request), e);
                None
            }
        }
    }

    pub async fn try_load(&self, request: &ImageRequest) -> Result<Bitmap, LoadError> {
        let url = request.url().ok_or(LoadError::MissingUrl)?;

        let payload = match self.cache.lookup(url).await {
            Some(cached) => {
                debug!("Using cached response for {}", url);
                cached.payload
            }
            None => {
                let (payload, metadata) = self.transport.fetch(url).await?;
                // Stored before decoding; a payload that fails to decode stays cached
                self.cache
                    .store(
                        url,
                        CachedResponse {
                            payload: payload.clone(),
                            metadata,
                        },
                    )
                    .await;
                payload
            }
        };

        let max_pixel_dimension = request
            .target_size()
            .map(|size| size.max_pixel_dimension(self.device_scale_factor));

        Ok(decode_off_thread(self.decoder.clone(), payload, max_pixel_dimension).await?)
    }
}

fn display_url(request: &ImageRequest) -> &str {
    request.url().map(|url| url.as_str()).unwrap_or_default()
}

async fn decode_off_thread(
    decoder: Arc<dyn Decoder>,
    payload: Bytes,
    max_pixel_dimension: Option<u32>,
) -> ImageResult<Bitmap> {
    let (tx, rx) = tokio::sync::oneshot::channel();

    rayon::spawn(move || {
        let result = match max_pixel_dimension {
            Some(max) => decoder.decode_thumbnail(&payload, max, false),
            None => decoder.decode(&payload),
        };
        let _ = tx.send(result);
    });

    rx.await.map_err(|_| ImageProcessingError::Cancelled)?
}
