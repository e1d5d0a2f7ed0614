pub mod image;
pub mod loading_state;

pub use crate::image::{Bitmap, ImageProcessingError, ImageResult};
pub use crate::loading_state::LoadState;
