use topfetch::fetch::FetchProgress;

/// Logging reporter using tracing for structured output.
pub struct LoggingReporter;

impl LoggingReporter {
    pub fn new() -> Self {
        Self
    }

    pub fn handle(&self, event: FetchProgress) {
        match event {
            FetchProgress::FetchingItems {
                item_type,
                time_range,
            } => {
                tracing::info!(%item_type, %time_range, "Fetching top items");
            }

            FetchProgress::TotalKnown {
                total,
                remaining_pages,
            } => {
                tracing::debug!(total, remaining_pages, "Collection size known");
            }

            FetchProgress::FetchedPage {
                offset,
                count,
                fetched,
                total,
            } => {
                tracing::debug!(offset, count, fetched, total, "Fetched page");
            }

            FetchProgress::PageFailed { offset, error } => {
                tracing::warn!(offset, error = %error, "Page failed");
            }

            FetchProgress::FetchComplete {
                item_type,
                fetched,
                total,
                failed_pages,
            } => {
                if failed_pages > 0 {
                    tracing::warn!(%item_type, fetched, total, failed_pages, "Fetch incomplete");
                } else {
                    tracing::info!(%item_type, fetched, total, "Fetch complete");
                }
            }
        }
    }
}

impl Default for LoggingReporter {
    fn default() -> Self {
        Self::new()
    }
}
