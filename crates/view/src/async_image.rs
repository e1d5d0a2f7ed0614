use loader::{Bitmap, ImageLoader, ImageRequest, TargetSize, Url};
use shared::loading_state::LoadState;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::message::{ImageMessage, ViewId};

/// A view that shows a remote image, downsampled for its on-screen size,
/// with a placeholder until it arrives.
///
/// The load runs on a tokio task; its result comes back as an
/// [`ImageMessage`] and is applied by whoever owns the view, through
/// [`AsyncResizableImage::update`]. Dropping the view aborts a load that is
/// still in flight.
#[derive(Debug)]
pub struct AsyncResizableImage {
    id: ViewId,
    request: ImageRequest,
    state: LoadState,
    generation: u64,
    in_flight: Option<JoinHandle<()>>,
}

impl AsyncResizableImage {
    pub fn new(url: Option<Url>, target_size: Option<TargetSize>) -> Self {
        Self {
            id: ViewId::next(),
            request: ImageRequest::new(url, target_size),
            state: LoadState::Loading,
            generation: 0,
            in_flight: None,
        }
    }

    pub fn id(&self) -> ViewId {
        self.id
    }

    pub fn url(&self) -> Option<&Url> {
        self.request.url()
    }

    pub fn target_size(&self) -> Option<TargetSize> {
        self.request.target_size()
    }

    pub fn state(&self) -> &LoadState {
        &self.state
    }

    pub fn is_load_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Start loading if nothing is loaded and no load is running. Returns
    /// whether a load was started.
    ///
    /// Must be called from within a tokio runtime.
    pub fn on_appear(
        &mut self,
        loader: &ImageLoader,
        sender: &UnboundedSender<ImageMessage>,
    ) -> bool {
        if !self.state.is_loading() || self.in_flight.is_some() {
            return false;
        }

        let loader = loader.clone();
        let request = self.request.clone();
        let sender = sender.clone();
        let view = self.id;
        let generation = self.generation;

        debug!("Starting load for view {:?}", view);
        self.in_flight = Some(tokio::spawn(async move {
            let result = loader.load(&request).await;
            if sender
                .send(ImageMessage {
                    view,
                    generation,
                    result,
                })
                .is_err()
            {
                debug!("View {:?} stopped listening before its load finished", view);
            }
        }));

        true
    }

    /// Apply a finished load. Results for other views, for an abandoned
    /// generation, or arriving after the image is already loaded are
    /// ignored.
    pub fn update(&mut self, message: ImageMessage) -> bool {
        if message.view != self.id || message.generation != self.generation {
            debug!(
                "Dropping stale result for view {:?} (generation {})",
                message.view, message.generation
            );
            return false;
        }

        self.in_flight = None;
        self.state.complete(message.result)
    }

    /// Apply every result already waiting on `receiver`.
    pub fn drain(&mut self, receiver: &mut UnboundedReceiver<ImageMessage>) -> usize {
        let mut applied = 0;
        while let Ok(message) = receiver.try_recv() {
            if self.update(message) {
                applied += 1;
            }
        }
        applied
    }

    /// Abort the running load; any result it already sent is discarded.
    pub fn cancel(&mut self) {
        if let Some(handle) = self.in_flight.take() {
            handle.abort();
        }
        self.generation += 1;
    }

    /// Render the image through `content` once loaded, otherwise
    /// `placeholder`. A failed load keeps the placeholder.
    pub fn view<R>(
        &self,
        content: impl FnOnce(&Bitmap) -> R,
        placeholder: impl FnOnce() -> R,
    ) -> R {
        match &self.state {
            LoadState::Loaded(bitmap) => content(bitmap),
            LoadState::Loading | LoadState::Failed => placeholder(),
        }
    }

    pub fn view_with_failure<R>(
        &self,
        content: impl FnOnce(&Bitmap) -> R,
        placeholder: impl FnOnce() -> R,
        failed: impl FnOnce() -> R,
    ) -> R {
        match &self.state {
            LoadState::Loaded(bitmap) => content(bitmap),
            LoadState::Loading => placeholder(),
            LoadState::Failed => failed(),
        }
    }
}

impl Drop for AsyncResizableImage {
    fn drop(&mut self) {
        if let Some(handle) = self.in_flight.take() {
            handle.abort();
        }
    }
}
