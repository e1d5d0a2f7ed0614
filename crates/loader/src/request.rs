pub use reqwest::Url;

use shared::image::max_pixel_dimension;

/// On-screen size in device-independent units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetSize {
    pub width: f64,
    pub height: f64,
}

impl TargetSize {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    pub fn square(side: f64) -> Self {
        Self::new(side, side)
    }

    pub fn max_pixel_dimension(&self, scale_factor: f64) -> u32 {
        max_pixel_dimension(self.width, self.height, scale_factor)
    }
}

/// One load attempt: where to fetch from and how large it will be shown.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ImageRequest {
    url: Option<Url>,
    target_size: Option<TargetSize>,
}

impl ImageRequest {
    pub fn new(url: Option<Url>, target_size: Option<TargetSize>) -> Self {
        Self { url, target_size }
    }

    /// Build a request from a string URL. Unparseable input yields a request
    /// without a URL, which loads to nothing.
    pub fn parse(url: &str, target_size: Option<TargetSize>) -> Self {
        Self::new(Url::parse(url).ok(), target_size)
    }

    pub fn url(&self) -> Option<&Url> {
        self.url.as_ref()
    }

    pub fn target_size(&self) -> Option<TargetSize> {
        self.target_size
    }
}
