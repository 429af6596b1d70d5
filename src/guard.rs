use std::collections::VecDeque;

pub const RAPID_ACTION_WINDOW: usize = 3;
pub const RAPID_ACTION_THRESHOLD_MS: u64 = 2000;

/// Trips when the last `capacity` automatic actions all fall inside
/// `threshold_ms` of each other.
#[derive(Debug, Clone)]
pub struct RapidActionGuard {
    stamps: VecDeque<u64>,
    capacity: usize,
    threshold_ms: u64,
}

impl Default for RapidActionGuard {
    fn default() -> Self {
        Self::new(RAPID_ACTION_WINDOW, RAPID_ACTION_THRESHOLD_MS)
    }
}

impl RapidActionGuard {
    pub fn new(capacity: usize, threshold_ms: u64) -> Self {
        Self {
            stamps: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
            threshold_ms,
        }
    }

    /// Record an action at `now_ms`. Returns `true` when the guard trips.
    pub fn record(&mut self, now_ms: u64) -> bool {
        self.stamps.push_back(now_ms);
        while self.stamps.len() > self.capacity {
            self.stamps.pop_front();
        }
        match (self.stamps.front(), self.stamps.back()) {
            (Some(oldest), Some(newest)) if self.stamps.len() == self.capacity => {
                newest.saturating_sub(*oldest) < self.threshold_ms
            }
            _ => false,
        }
    }

    pub fn clear(&mut self) {
        self.stamps.clear();
    }

    pub fn len(&self) -> usize {
        self.stamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stamps.is_empty()
    }
}
