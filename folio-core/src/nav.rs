//! Page navigation history: bounded back/forward stacks and numbered marks.

use std::collections::VecDeque;

pub const HISTORY_CAPACITY: usize = 256;

/// Mark slots addressable by digit prefixes 1-9 (slot 0 is never used).
pub const MARK_SLOTS: usize = 10;

/// Stack with a fixed capacity; pushing past it evicts the oldest entry.
#[derive(Debug, Clone)]
pub struct BoundedStack {
    entries: VecDeque<usize>,
    capacity: usize,
}

impl BoundedStack {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, page: usize) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(page);
    }

    pub fn pop(&mut self) -> Option<usize> {
        self.entries.pop_back()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug)]
pub struct Navigator {
    history: BoundedStack,
    future: BoundedStack,
    marks: [Option<usize>; MARK_SLOTS],
}

impl Default for Navigator {
    fn default() -> Self {
        Self::new()
    }
}

impl Navigator {
    pub fn new() -> Self {
        Self {
            history: BoundedStack::new(HISTORY_CAPACITY),
            future: BoundedStack::new(HISTORY_CAPACITY),
            marks: [None; MARK_SLOTS],
        }
    }

    /// Jump to `target`, clamped to the document range.
    ///
    /// Pushes the departure page and then the landing page. The double push
    /// makes a single `back()` land exactly on the page that was current
    /// before the jump; `back()` collapses the duplicates this creates.
    pub fn jump_to(&mut self, current: &mut usize, target: usize, page_count: usize) {
        let target = target.min(page_count.saturating_sub(1));
        self.future.clear();
        self.history.push(*current);
        *current = target;
        self.history.push(*current);
    }

    /// Walk back to the most recent page different from the current one.
    /// A no-op when the history is empty.
    pub fn back(&mut self, current: &mut usize) {
        if !self.has_history() {
            return;
        }
        let here = *current;
        self.future.push(here);
        while *current == here {
            match self.history.pop() {
                Some(page) => *current = page,
                None => break,
            }
        }
    }

    /// Symmetric to `back()`, replaying pages pushed by it. A no-op when
    /// there is nothing to replay.
    pub fn forward(&mut self, current: &mut usize) {
        if !self.has_future() {
            return;
        }
        let here = *current;
        self.history.push(here);
        while *current == here {
            match self.future.pop() {
                Some(page) => *current = page,
                None => break,
            }
        }
        self.history.push(*current);
    }

    /// Record the current page without jumping (the bare mark command).
    pub fn push_location(&mut self, current: usize) {
        self.history.push(current);
    }

    pub fn set_mark(&mut self, slot: usize, page: usize) {
        if (1..MARK_SLOTS).contains(&slot) {
            self.marks[slot] = Some(page);
        }
    }

    pub fn mark(&self, slot: usize) -> Option<usize> {
        if (1..MARK_SLOTS).contains(&slot) {
            self.marks[slot]
        } else {
            None
        }
    }

    pub fn has_history(&self) -> bool {
        !self.history.is_empty()
    }

    pub fn has_future(&self) -> bool {
        !self.future.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounded_stack_evicts_oldest_past_capacity() {
        let mut stack = BoundedStack::new(4);
        for page in 0..10 {
            stack.push(page);
        }
        assert_eq!(stack.len(), 4);
        assert_eq!(stack.pop(), Some(9));
        assert_eq!(stack.pop(), Some(8));
        assert_eq!(stack.pop(), Some(7));
        assert_eq!(stack.pop(), Some(6));
        assert_eq!(stack.pop(), None);
    }

    #[test]
    fn jump_clamps_target() {
        let mut nav = Navigator::new();
        let mut page = 0;
        nav.jump_to(&mut page, 500, 10);
        assert_eq!(page, 9);
    }

    #[test]
    fn back_after_jump_returns_to_departure_page() {
        let mut nav = Navigator::new();
        let mut page = 3;
        nav.jump_to(&mut page, 7, 10);
        assert_eq!(page, 7);
        nav.back(&mut page);
        assert_eq!(page, 3);
    }

    #[test]
    fn forward_after_back_restores_page() {
        let mut nav = Navigator::new();
        let mut page = 3;
        nav.jump_to(&mut page, 7, 10);
        nav.back(&mut page);
        assert_eq!(page, 3);
        nav.forward(&mut page);
        assert_eq!(page, 7);
    }

    #[test]
    fn back_collapses_duplicate_runs_across_jumps() {
        let mut nav = Navigator::new();
        let mut page = 0;
        nav.jump_to(&mut page, 1, 10);
        nav.jump_to(&mut page, 2, 10);
        nav.jump_to(&mut page, 3, 10);

        nav.back(&mut page);
        assert_eq!(page, 2);
        nav.back(&mut page);
        assert_eq!(page, 1);
        nav.back(&mut page);
        assert_eq!(page, 0);
        // History exhausted; further backs stay put.
        nav.back(&mut page);
        assert_eq!(page, 0);
    }

    #[test]
    fn jump_clears_future() {
        let mut nav = Navigator::new();
        let mut page = 0;
        nav.jump_to(&mut page, 5, 10);
        nav.back(&mut page);
        assert!(nav.has_future());
        nav.jump_to(&mut page, 8, 10);
        assert!(!nav.has_future());
    }

    #[test]
    fn back_with_no_history_leaves_the_stacks_untouched() {
        let mut nav = Navigator::new();
        let mut page = 4;
        nav.back(&mut page);
        assert_eq!(page, 4);
        assert!(!nav.has_future());
        // A later forward must not replay the junk a bare back would push.
        nav.forward(&mut page);
        assert_eq!(page, 4);
        assert!(!nav.has_history());
    }

    #[test]
    fn forward_with_no_future_pushes_nothing_onto_history() {
        let mut nav = Navigator::new();
        let mut page = 4;
        nav.forward(&mut page);
        assert_eq!(page, 4);
        assert!(!nav.has_history());
        nav.back(&mut page);
        assert_eq!(page, 4);
    }

    #[test]
    fn marks_round_trip_and_reject_slot_zero() {
        let mut nav = Navigator::new();
        nav.set_mark(3, 42);
        nav.set_mark(0, 7);
        assert_eq!(nav.mark(3), Some(42));
        assert_eq!(nav.mark(0), None);
        assert_eq!(nav.mark(4), None);
    }

    #[test]
    fn history_survives_overflow_retaining_newest() {
        let mut nav = Navigator::new();
        let mut page = 0;
        for target in 1..=(HISTORY_CAPACITY + 50) {
            nav.jump_to(&mut page, target, usize::MAX);
        }
        // Newest entries are intact even though the oldest were evicted.
        nav.back(&mut page);
        assert_eq!(page, HISTORY_CAPACITY + 49);
    }
}
