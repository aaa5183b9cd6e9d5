//! Resumable, time-sliced page search.
//!
//! A session scans one page per step inside a caller-supplied budget so a
//! long scan spreads across frames instead of blocking the interaction loop.

use tracing::warn;

use crate::backend::{DocumentBackend, NormalizedRect};

/// Hit rectangles kept per page; further matches are dropped with a
/// diagnostic.
pub const MAX_SEARCH_HITS: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome {
    /// Budget expired with pages still unscanned; resume next frame.
    Pending,
    Found { page: usize },
    Exhausted,
}

#[derive(Debug)]
pub struct SearchSession {
    needle: String,
    direction: i8,
    /// Signed so stepping can leave the valid range and be detected.
    cursor: isize,
    hits: Vec<NormalizedRect>,
}

impl SearchSession {
    /// Arm a session scanning from `current_page`. When the current page
    /// already displays a hit (repeat find-next), the scan starts one page
    /// past it in the requested direction. Returns `None` for an empty
    /// needle.
    pub fn start(
        needle: &str,
        direction: i8,
        current_page: usize,
        displayed_hit_page: Option<usize>,
    ) -> Option<Self> {
        if needle.is_empty() {
            return None;
        }
        let mut cursor = current_page as isize;
        if displayed_hit_page == Some(current_page) {
            cursor += direction as isize;
        }
        Some(Self {
            needle: needle.to_string(),
            direction,
            cursor,
            hits: Vec::new(),
        })
    }

    pub fn needle(&self) -> &str {
        &self.needle
    }

    pub fn direction(&self) -> i8 {
        self.direction
    }

    /// Page the scan cursor currently points at, if it is in range.
    pub fn cursor_page(&self, page_count: usize) -> Option<usize> {
        if self.cursor >= 0 && (self.cursor as usize) < page_count {
            Some(self.cursor as usize)
        } else {
            None
        }
    }

    /// Hit rectangles recorded by a `Found` outcome.
    pub fn take_hits(&mut self) -> Vec<NormalizedRect> {
        std::mem::take(&mut self.hits)
    }

    /// Scan pages while `has_budget()` allows. A backend failure on a page
    /// is logged and treated as no match; it never escapes the frame.
    pub fn run_slice(
        &mut self,
        backend: &dyn DocumentBackend,
        mut has_budget: impl FnMut() -> bool,
    ) -> SearchOutcome {
        let page_count = backend.page_count();
        while has_budget() {
            let page = match self.cursor_page(page_count) {
                Some(page) => page,
                None => return SearchOutcome::Exhausted,
            };

            let mut hits = match backend.search_page(page, &self.needle) {
                Ok(hits) => hits,
                Err(err) => {
                    warn!(page, error = %err, "page search failed, skipping page");
                    Vec::new()
                }
            };

            if !hits.is_empty() {
                if hits.len() > MAX_SEARCH_HITS {
                    warn!(
                        page,
                        count = hits.len(),
                        cap = MAX_SEARCH_HITS,
                        "too many search hits, truncating"
                    );
                    hits.truncate(MAX_SEARCH_HITS);
                }
                self.hits = hits;
                return SearchOutcome::Found { page };
            }

            self.cursor += self.direction as isize;
        }
        SearchOutcome::Pending
    }
}
