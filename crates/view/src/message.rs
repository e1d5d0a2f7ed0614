use loader::LoadResult;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_VIEW_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ViewId(u64);

impl ViewId {
    pub fn next() -> Self {
        Self(NEXT_VIEW_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Result of a background load, addressed to the view that started it.
#[derive(Debug, Clone)]
pub struct ImageMessage {
    pub view: ViewId,
    /// Load generation the result belongs to; bumped on every cancel.
    pub generation: u64,
    pub result: LoadResult,
}
