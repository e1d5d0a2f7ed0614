pub mod cache;
pub mod decoder;
pub mod loader;
pub mod request;
pub mod transport;

pub use cache::{
    CachedResponse, DiskHttpCache, HttpCache, MemoryHttpCache, ResponseMetadata, TieredHttpCache,
    shared_cache,
};
pub use decoder::{Decoder, ImageDecoder};
pub use loader::{ImageLoader, LoadError, LoadResult};
pub use request::{ImageRequest, TargetSize, Url};
pub use shared::image::Bitmap;
pub use transport::{ReqwestTransport, Transport, TransportError};
