//! Progress reporting for paged fetches.
//!
//! The fetcher emits [`FetchProgress`] events through an optional callback so
//! frontends can render progress bars or log lines without the library
//! knowing about either.

use super::client::{ItemType, TimeRange};

/// Progress events emitted by [`TopItemsClient::fetch_all`](super::TopItemsClient::fetch_all).
#[derive(Debug, Clone)]
pub enum FetchProgress {
    /// Starting a fetch; the first page is being requested.
    FetchingItems {
        item_type: ItemType,
        time_range: TimeRange,
    },

    /// The first page arrived and the declared total is known.
    TotalKnown {
        total: usize,
        /// Pages still to fetch after the first.
        remaining_pages: usize,
    },

    /// A page was fetched. Emitted in completion order.
    FetchedPage {
        offset: usize,
        count: usize,
        /// Items accumulated so far.
        fetched: usize,
        total: usize,
    },

    /// A page failed without aborting the fetch.
    PageFailed { offset: usize, error: String },

    /// The fetch finished.
    FetchComplete {
        item_type: ItemType,
        fetched: usize,
        total: usize,
        failed_pages: usize,
    },
}

/// Callback type for progress reporting.
pub type ProgressCallback = Box<dyn Fn(FetchProgress) + Send + Sync>;

/// Emit a progress event if a callback is provided.
#[inline]
pub fn emit(on_progress: Option<&ProgressCallback>, event: FetchProgress) {
    if let Some(cb) = on_progress {
        cb(event);
    }
}
