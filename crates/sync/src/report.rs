//! Summary of one mirror run.

/// Counters collected while walking the gallery.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub page_size: u32,
    pub start_page: u64,
    /// Pages fetched during this run, counted from `start_page`.
    pub pages_fetched: u64,
    /// Absolute index of the last page that was processed.
    pub last_page_index: Option<u64>,
    /// Images on that page.
    pub last_page_items: usize,
    pub images_seen: u64,
    pub downloaded: u64,
    pub skipped_existing: u64,
    /// Existing images whose missing sidecars were written on this run.
    pub metadata_backfilled: u64,
    /// `totalItems` as last reported by the server.  Not trusted.
    pub reported_total_items: Option<u64>,
    /// `false` when the run stopped on a page with no data instead of
    /// reaching the end of the gallery.
    pub completed: bool,
}

impl SyncReport {
    pub fn new(page_size: u32, start_page: u64) -> Self {
        Self {
            page_size,
            start_page,
            ..Default::default()
        }
    }

    /// Gallery size implied by the pages seen: every page before the last
    /// is assumed full.
    pub fn expected_total_items(&self) -> Option<u64> {
        self.last_page_index
            .map(|index| index * u64::from(self.page_size) + self.last_page_items as u64)
    }

    /// Total pages in the gallery, if the end was reached.
    pub fn total_pages(&self) -> Option<u64> {
        if self.completed {
            self.last_page_index.map(|index| index + 1)
        } else {
            None
        }
    }
}
