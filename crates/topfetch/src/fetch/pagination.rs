//! Concurrent retrieval of a whole paged collection.
//!
//! The first page is fetched alone to learn the declared total. The remaining
//! offsets are then fetched by one task each, with a semaphore bounding the
//! number of requests in flight. A single loop over the `JoinSet` owns the
//! accumulator and appends pages in completion order, so only the first
//! page's position in the result is stable.
//!
//! Failed pages are reported and skipped, except for a 401: the worker that
//! sees it raises a shared cancellation flag, the remaining tasks are
//! aborted, and the whole fetch fails with [`FetchError::Unauthorized`].

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::de::DeserializeOwned;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use super::client::{ItemType, MAX_PAGE_SIZE, TimeRange, TopItemsClient};
use super::error::FetchError;
use super::progress::{FetchProgress, ProgressCallback, emit};

/// Default items per page (the endpoint maximum).
pub const DEFAULT_PAGE_SIZE: usize = MAX_PAGE_SIZE;

/// Default number of pages in flight.
pub const DEFAULT_CONCURRENCY: usize = 10;

/// Parameters of one fetch. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub item_type: ItemType,
    pub time_range: TimeRange,
    page_size: usize,
    concurrency: usize,
    max_items: Option<usize>,
}

impl FetchRequest {
    pub fn new(item_type: ItemType, time_range: TimeRange) -> Self {
        Self {
            item_type,
            time_range,
            page_size: DEFAULT_PAGE_SIZE,
            concurrency: DEFAULT_CONCURRENCY,
            max_items: None,
        }
    }

    /// Items per page, clamped to `1..=50`.
    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.clamp(1, MAX_PAGE_SIZE);
        self
    }

    /// Maximum pages in flight, at least 1.
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Cap the declared total.
    #[must_use]
    pub fn with_max_items(mut self, max_items: Option<usize>) -> Self {
        self.max_items = max_items;
        self
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn max_items(&self) -> Option<usize> {
        self.max_items
    }
}

/// A page that could not be fetched.
#[derive(Debug)]
pub struct PageFailure {
    pub offset: usize,
    /// Number of items the page should have held.
    pub limit: usize,
    pub error: FetchError,
}

/// The assembled result of [`TopItemsClient::fetch_all`].
#[derive(Debug)]
pub struct FetchOutcome<T> {
    /// First-page items first, then other pages in completion order.
    pub items: Vec<T>,
    /// Total reported by the first page, capped by `max_items`.
    pub declared_total: usize,
    pub failures: Vec<PageFailure>,
}

impl<T> FetchOutcome<T> {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Items declared but not retrieved.
    pub fn missing(&self) -> usize {
        self.declared_total.saturating_sub(self.items.len())
    }
}

/// `(offset, limit)` of every page after the first.
pub fn remaining_pages(declared_total: usize, page_size: usize) -> Vec<(usize, usize)> {
    let page_size = page_size.max(1);
    (page_size..declared_total)
        .step_by(page_size)
        .map(|offset| (offset, page_size.min(declared_total - offset)))
        .collect()
}

enum PageOutcome<T> {
    Fetched { offset: usize, items: Vec<T> },
    Failed { offset: usize, error: FetchError },
    Cancelled { offset: usize },
}

impl TopItemsClient {
    /// Retrieve every item of the collection described by `request`.
    ///
    /// A failure on the first page, or a 401 on any page, fails the whole
    /// call. Other page failures are collected in
    /// [`FetchOutcome::failures`].
    pub async fn fetch_all<T>(
        &self,
        request: &FetchRequest,
        on_progress: Option<&ProgressCallback>,
    ) -> Result<FetchOutcome<T>, FetchError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let FetchRequest {
            item_type,
            time_range,
            page_size,
            concurrency,
            max_items,
        } = *request;

        emit(
            on_progress,
            FetchProgress::FetchingItems {
                item_type,
                time_range,
            },
        );

        let first = self
            .get_page::<T>(item_type, time_range, page_size, 0)
            .await?;

        let declared_total = max_items.map_or(first.total, |cap| first.total.min(cap));
        let mut items = first.items;
        items.truncate(declared_total);

        let pending_pages = remaining_pages(declared_total, page_size);
        tracing::debug!(
            %item_type,
            declared_total,
            pages = pending_pages.len() + 1,
            "First page fetched"
        );

        emit(
            on_progress,
            FetchProgress::TotalKnown {
                total: declared_total,
                remaining_pages: pending_pages.len(),
            },
        );
        emit(
            on_progress,
            FetchProgress::FetchedPage {
                offset: 0,
                count: items.len(),
                fetched: items.len(),
                total: declared_total,
            },
        );

        let mut failures = Vec::new();

        if !pending_pages.is_empty() {
            let semaphore = Arc::new(Semaphore::new(concurrency));
            let cancelled = Arc::new(AtomicBool::new(false));
            let mut join_set: JoinSet<PageOutcome<T>> = JoinSet::new();
            let mut pending: BTreeMap<usize, usize> = BTreeMap::new();

            for (offset, limit) in pending_pages {
                pending.insert(offset, limit);
                join_set.spawn(fetch_page_with_permit(
                    self.clone(),
                    Arc::clone(&semaphore),
                    Arc::clone(&cancelled),
                    item_type,
                    time_range,
                    offset,
                    limit,
                ));
            }

            let mut task_error: Option<String> = None;

            while let Some(joined) = join_set.join_next().await {
                let outcome = match joined {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        tracing::warn!(error = %e, "Page task failed");
                        task_error = Some(e.to_string());
                        continue;
                    }
                };

                match outcome {
                    PageOutcome::Fetched {
                        offset,
                        items: page,
                    } => {
                        pending.remove(&offset);
                        let count = page.len();
                        items.extend(page);
                        emit(
                            on_progress,
                            FetchProgress::FetchedPage {
                                offset,
                                count,
                                fetched: items.len(),
                                total: declared_total,
                            },
                        );
                    }
                    PageOutcome::Failed { offset, error } if error.is_fatal() => {
                        tracing::warn!(offset, "Access token rejected, cancelling remaining pages");
                        join_set.abort_all();
                        return Err(error);
                    }
                    PageOutcome::Failed { offset, error } => {
                        let limit = pending.remove(&offset).unwrap_or(page_size);
                        tracing::warn!(offset, error = %error, "Page fetch failed");
                        emit(
                            on_progress,
                            FetchProgress::PageFailed {
                                offset,
                                error: error.to_string(),
                            },
                        );
                        failures.push(PageFailure {
                            offset,
                            limit,
                            error,
                        });
                    }
                    PageOutcome::Cancelled { offset } => {
                        pending.remove(&offset);
                    }
                }
            }

            // Offsets whose task ended without an outcome (panicked workers).
            for (offset, limit) in pending {
                let error = FetchError::Task(
                    task_error
                        .clone()
                        .unwrap_or_else(|| "task ended without a result".to_string()),
                );
                emit(
                    on_progress,
                    FetchProgress::PageFailed {
                        offset,
                        error: error.to_string(),
                    },
                );
                failures.push(PageFailure {
                    offset,
                    limit,
                    error,
                });
            }
        }

        items.truncate(declared_total);
        failures.sort_by_key(|f| f.offset);

        emit(
            on_progress,
            FetchProgress::FetchComplete {
                item_type,
                fetched: items.len(),
                total: declared_total,
                failed_pages: failures.len(),
            },
        );
        tracing::info!(
            %item_type,
            fetched = items.len(),
            declared_total,
            failed_pages = failures.len(),
            "Fetch complete"
        );

        Ok(FetchOutcome {
            items,
            declared_total,
            failures,
        })
    }
}

async fn fetch_page_with_permit<T: DeserializeOwned>(
    client: TopItemsClient,
    semaphore: Arc<Semaphore>,
    cancelled: Arc<AtomicBool>,
    item_type: ItemType,
    time_range: TimeRange,
    offset: usize,
    limit: usize,
) -> PageOutcome<T> {
    let Ok(_permit) = semaphore.acquire().await else {
        return PageOutcome::Failed {
            offset,
            error: FetchError::Task("semaphore closed".to_string()),
        };
    };

    if cancelled.load(Ordering::Acquire) {
        return PageOutcome::Cancelled { offset };
    }

    match client
        .get_page::<T>(item_type, time_range, limit, offset)
        .await
    {
        Ok(page) => PageOutcome::Fetched {
            offset,
            items: page.items,
        },
        Err(error) => {
            if error.is_fatal() {
                cancelled.store(true, Ordering::Release);
            }
            PageOutcome::Failed { offset, error }
        }
    }
}
