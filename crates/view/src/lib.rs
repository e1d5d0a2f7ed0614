pub mod async_image;
pub mod message;

pub use async_image::AsyncResizableImage;
pub use message::{ImageMessage, ViewId};
