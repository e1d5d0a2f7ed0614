use crate::image::Bitmap;
use std::fmt;

/// What a view currently holds for its image slot.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LoadState {
    #[default]
    Loading,
    Loaded(Bitmap),
    Failed,
}

impl LoadState {
    pub fn is_loading(&self) -> bool {
        matches!(self, LoadState::Loading)
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self, LoadState::Loaded(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, LoadState::Failed)
    }

    pub fn bitmap(&self) -> Option<&Bitmap> {
        match self {
            LoadState::Loaded(bitmap) => Some(bitmap),
            _ => None,
        }
    }

    /// Apply a finished load. `Loaded` is terminal, so a second result for the
    /// same slot is dropped and `false` is returned.
    pub fn complete(&mut self, result: Option<Bitmap>) -> bool {
        if self.is_loaded() {
            return false;
        }

        *self = match result {
            Some(bitmap) => LoadState::Loaded(bitmap),
            None => LoadState::Failed,
        };
        true
    }
}

impl fmt::Display for LoadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadState::Loading => write!(f, "Loading"),
            LoadState::Loaded(bitmap) => write!(f, "Loaded {}x{}", bitmap.width, bitmap.height),
            LoadState::Failed => write!(f, "Failed"),
        }
    }
}
