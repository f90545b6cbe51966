use std::time::{Duration, Instant};

/// Stops auto-advance when tracks keep ending right after they start, which
/// is what a directory full of unplayable files looks like.
#[derive(Debug, Clone)]
pub struct FinishGuard {
    min_play: Duration,
    max_fast: u32,
    started: Option<Instant>,
    fast: u32,
}

impl FinishGuard {
    pub fn new(min_play: Duration, max_fast_failures: u32) -> Self {
        Self {
            min_play,
            max_fast: max_fast_failures,
            started: None,
            fast: 0,
        }
    }

    /// A track started playing at `at`.
    pub fn started(&mut self, at: Instant) {
        self.started = Some(at);
    }

    /// The user picked a track; forget earlier failures.
    pub fn reset(&mut self) {
        self.fast = 0;
    }

    pub fn fast_failures(&self) -> u32 {
        self.fast
    }

    /// A track ended on its own at `at`. Returns whether auto-advance may go on.
    pub fn finished(&mut self, at: Instant) -> bool {
        let fast = self
            .started
            .is_some_and(|s| at.saturating_duration_since(s) < self.min_play);
        if fast {
            self.fast += 1;
        } else {
            self.fast = 0;
        }
        self.fast <= self.max_fast
    }
}
