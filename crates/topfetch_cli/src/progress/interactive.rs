use std::sync::Mutex;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use topfetch::fetch::{FetchProgress, ItemType};

/// Bar for the collection currently being fetched.
struct ActiveFetch {
    bar: ProgressBar,
    failed_pages: usize,
}

/// Interactive progress reporter using indicatif.
///
/// Collections are fetched one after another, so page events always belong
/// to the most recently started bar.
pub struct InteractiveReporter {
    multi: MultiProgress,
    active: Mutex<Option<ActiveFetch>>,
}

impl InteractiveReporter {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            active: Mutex::new(None),
        }
    }

    /// Reporter that draws nowhere.
    #[cfg(test)]
    pub fn hidden() -> Self {
        Self {
            multi: MultiProgress::with_draw_target(indicatif::ProgressDrawTarget::hidden()),
            active: Mutex::new(None),
        }
    }

    pub fn handle(&self, event: FetchProgress) {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());

        match event {
            FetchProgress::FetchingItems {
                item_type,
                time_range,
            } => {
                if let Some(previous) = active.take()
                    && !previous.bar.is_finished()
                {
                    previous.bar.abandon();
                }

                let bar = self.multi.add(ProgressBar::new_spinner());
                bar.set_style(Self::spinner_style());
                bar.enable_steady_tick(Duration::from_millis(100));
                bar.set_prefix(format!("{:8}", Self::label(item_type)));
                bar.set_message(format!("Fetching ({})...", time_range.description()));

                *active = Some(ActiveFetch {
                    bar,
                    failed_pages: 0,
                });
            }

            FetchProgress::TotalKnown { total, .. } => {
                if let Some(fetch) = active.as_ref() {
                    // Switch the spinner to a bar in place.
                    fetch.bar.disable_steady_tick();
                    fetch.bar.set_style(Self::bar_style());
                    fetch.bar.set_length(total as u64);
                    fetch.bar.set_message("");
                }
            }

            FetchProgress::FetchedPage { fetched, .. } => {
                if let Some(fetch) = active.as_ref() {
                    fetch.bar.set_position(fetched as u64);
                }
            }

            FetchProgress::PageFailed { offset, .. } => {
                if let Some(fetch) = active.as_mut() {
                    fetch.failed_pages += 1;
                    fetch.bar.set_message(format!(
                        "{} page(s) failed (last at offset {})",
                        fetch.failed_pages, offset
                    ));
                }
            }

            FetchProgress::FetchComplete {
                fetched,
                total,
                failed_pages,
                ..
            } => {
                if let Some(fetch) = active.take() {
                    let msg = if failed_pages > 0 {
                        format!("⚠ {}/{} fetched, {} page(s) failed", fetched, total, failed_pages)
                    } else {
                        format!("✓ {} fetched", fetched)
                    };
                    fetch.bar.finish_with_message(msg);
                }
            }
        }
    }

    /// Position and length of the active bar.
    #[cfg(test)]
    pub fn current_position(&self) -> Option<(u64, u64)> {
        let active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        active
            .as_ref()
            .map(|f| (f.bar.position(), f.bar.length().unwrap_or(0)))
    }

    pub fn finish(&self) {
        let active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(fetch) = active.as_ref()
            && !fetch.bar.is_finished()
        {
            fetch.bar.finish();
        }
    }

    fn label(item_type: ItemType) -> &'static str {
        match item_type {
            ItemType::Tracks => "Tracks",
            ItemType::Artists => "Artists",
        }
    }

    fn spinner_style() -> ProgressStyle {
        ProgressStyle::default_spinner()
            .template("{prefix:.bold.cyan} {spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
    }

    fn bar_style() -> ProgressStyle {
        ProgressStyle::default_bar()
            .template("{prefix:.bold.cyan} [{bar:40.cyan/blue}] {pos:>4}/{len:4} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓░")
    }
}

impl Default for InteractiveReporter {
    fn default() -> Self {
        Self::new()
    }
}
