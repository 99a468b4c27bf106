//! Paged retrieval of the user's top tracks and artists.
//!
//! - [`TopItemsClient`] - bearer-authenticated access to one page
//! - [`TopItemsClient::fetch_all`] - concurrent retrieval of a whole collection
//! - [`FetchProgress`] - events for progress rendering
//!
//! # Example
//!
//! ```ignore
//! use topfetch::fetch::{FetchRequest, ItemType, TimeRange, TopItemsClient};
//!
//! let client = TopItemsClient::new(transport, access_token);
//! let request = FetchRequest::new(ItemType::Tracks, TimeRange::MediumTerm).with_concurrency(10);
//! let outcome = client.fetch_all::<serde_json::Value>(&request, None).await?;
//! for failure in &outcome.failures {
//!     eprintln!("page at offset {} failed: {}", failure.offset, failure.error);
//! }
//! ```

mod client;
mod error;
mod pagination;
mod progress;

pub use client::{API_BASE_URL, ItemType, MAX_PAGE_SIZE, Page, TimeRange, TopItemsClient};
pub use error::FetchError;
pub use pagination::{
    DEFAULT_CONCURRENCY, DEFAULT_PAGE_SIZE, FetchOutcome, FetchRequest, PageFailure,
    remaining_pages,
};
pub use progress::{FetchProgress, ProgressCallback, emit};
