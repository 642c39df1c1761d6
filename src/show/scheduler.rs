//! Due-time queue for per-universe frame delivery.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Due {
    at: Duration,
    universe: usize,
}

/// Min-heap of universes keyed by when their next frame is due.
///
/// The player keeps at most one entry per universe: an entry is popped when
/// it fires and re-inserted once the universe's next frame is known.
#[derive(Debug, Default)]
pub struct FrameScheduler {
    queue: BinaryHeap<Reverse<Due>>,
}

impl FrameScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `universe` at anchor-relative time `at`.
    pub fn schedule(&mut self, universe: usize, at: Duration) {
        self.queue.push(Reverse(Due { at, universe }));
    }

    /// Pop the earliest universe due at or before `now`.
    ///
    /// Ties resolve to the lower universe index.
    pub fn pop_due(&mut self, now: Duration) -> Option<usize> {
        match self.queue.peek() {
            Some(Reverse(due)) if due.at <= now => self.queue.pop().map(|Reverse(d)| d.universe),
            _ => None,
        }
    }

    /// Earliest pending due time.
    pub fn next_due(&self) -> Option<Duration> {
        self.queue.peek().map(|Reverse(due)| due.at)
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
