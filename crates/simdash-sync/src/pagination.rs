use crate::store::{RecordStore, Records};
use std::ops::Range;

/// Derived page numbers for one render. Pages are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageView {
    pub record_count: usize,
    pub page_size: usize,
    pub total_pages: usize,
    pub current_page: usize,
}

impl PageView {
    pub fn compute(record_count: usize, page_size: usize, requested_page: usize) -> Self {
        let page_size = page_size.max(1);
        let total_pages = record_count.div_ceil(page_size).max(1);
        Self {
            record_count,
            page_size,
            total_pages,
            current_page: requested_page.clamp(1, total_pages),
        }
    }

    /// Store positions shown on the current page.
    pub fn range(&self) -> Range<usize> {
        let start = ((self.current_page - 1) * self.page_size).min(self.record_count);
        let end = (start + self.page_size).min(self.record_count);
        start..end
    }

    pub fn has_next(&self) -> bool {
        self.current_page < self.total_pages
    }

    pub fn has_prev(&self) -> bool {
        self.current_page > 1
    }
}

/// Page cursor over the record store. Only `page_size` and the requested
/// page are kept; everything else is recomputed from the store count, so a
/// count change shows up on the next `layout` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    page_size: usize,
    current_page: usize,
}

impl Default for Pagination {
    fn default() -> Self {
        Self::new(1)
    }
}

impl Pagination {
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size: page_size.max(1),
            current_page: 1,
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Applies a new viewport capacity and clamps the page against it.
    pub fn recompute(&mut self, viewport_rows: usize, record_count: usize) -> PageView {
        self.page_size = viewport_rows.max(1);
        self.layout(record_count)
    }

    /// The view for `record_count` without storing the clamp.
    pub fn view(&self, record_count: usize) -> PageView {
        PageView::compute(record_count, self.page_size, self.current_page)
    }

    /// Per-render pass: clamps the current page to the last page for the
    /// given count and returns the resulting view.
    pub fn layout(&mut self, record_count: usize) -> PageView {
        let view = PageView::compute(record_count, self.page_size, self.current_page);
        self.current_page = view.current_page;
        view
    }

    pub fn next_page(&mut self, record_count: usize) -> PageView {
        let view = self.layout(record_count);
        if view.has_next() {
            self.current_page += 1;
        }
        self.layout(record_count)
    }

    pub fn prev_page(&mut self, record_count: usize) -> PageView {
        let view = self.layout(record_count);
        if view.has_prev() {
            self.current_page -= 1;
        }
        self.layout(record_count)
    }

    /// Jumps to the page holding the store position `index`.
    pub fn show_index(&mut self, index: usize, record_count: usize) -> PageView {
        self.current_page = index / self.page_size + 1;
        self.layout(record_count)
    }

    pub fn page_slice<'a>(&mut self, store: &'a RecordStore) -> Records<'a> {
        let range = self.layout(store.len()).range();
        store.window(range.start, range.len())
    }
}

/// Converts a measured viewport height into row capacity and reports when
/// that capacity changes. Fed by both resize events and layout changes that
/// alter the table area without a resize.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewportProbe {
    row_height: u32,
    header_height: u32,
    last_rows: Option<usize>,
}

impl ViewportProbe {
    pub fn new(row_height: u32, header_height: u32) -> Self {
        Self {
            row_height: row_height.max(1),
            header_height,
            last_rows: None,
        }
    }

    pub fn rows_for(&self, height: u32) -> usize {
        (height.saturating_sub(self.header_height) / self.row_height).max(1) as usize
    }

    /// Returns the new row capacity when it differs from the last
    /// observation.
    pub fn observe(&mut self, height: u32) -> Option<usize> {
        let rows = self.rows_for(height);
        if self.last_rows == Some(rows) {
            return None;
        }
        self.last_rows = Some(rows);
        Some(rows)
    }

    pub fn rows(&self) -> Option<usize> {
        self.last_rows
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use crate::store::tests::record;
    use proptest::prelude::*;
    use simdash_core::SimulationStatus;

    proptest! {
        #[test]
        fn slice_length_matches_remaining_records(
            count in 0u64..60,
            size in 1usize..12,
            page in 1usize..12,
        ) {
            let mut store = RecordStore::new();
            store.load((1..=count).map(|id| record(id, SimulationStatus::NotStarted)).collect());
            let mut pagination = Pagination::new(size);
            for _ in 1..page {
                pagination.next_page(store.len());
            }
            let view = pagination.layout(store.len());
            prop_assert!(view.current_page >= 1 && view.current_page <= view.total_pages);

            let len = pagination.page_slice(&store).count();
            let expected = size.min(count as usize - (view.current_page - 1) * size);
            prop_assert_eq!(len, expected);
            prop_assert_eq!(len == 0, count == 0);
        }

        #[test]
        fn recompute_twice_gives_the_same_view(rows in 0usize..40, count in 0usize..200) {
            let mut pagination = Pagination::default();
            let first = pagination.recompute(rows, count);
            prop_assert_eq!(first, pagination.recompute(rows, count));
        }
    }
}
