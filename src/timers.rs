//! Deadline table for the supervisor's timer families.
//!
//! Nothing here sleeps. The owner asks for the next deadline, waits however
//! its host waits, then pops whatever is due. A family holds at most one
//! deadline; arming it again replaces the old one.

/// One slot per timer family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Recurring presence poll.
    Poll,
    /// Single-shot stall detector.
    Stall,
    /// Delay between deciding on an automatic action and performing it.
    Debounce,
    /// Post-action wait for the busy indicator to clear.
    Settle,
    /// Quiet period after a full reset.
    ResetCooldown,
}

impl TimerKind {
    pub const ALL: [TimerKind; 5] = [
        TimerKind::Poll,
        TimerKind::Stall,
        TimerKind::Debounce,
        TimerKind::Settle,
        TimerKind::ResetCooldown,
    ];

    fn index(self) -> usize {
        match self {
            TimerKind::Poll => 0,
            TimerKind::Stall => 1,
            TimerKind::Debounce => 2,
            TimerKind::Settle => 3,
            TimerKind::ResetCooldown => 4,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    deadline_ms: u64,
    // arm order, breaks ties between equal deadlines
    seq: u64,
}

#[derive(Debug, Default)]
pub struct Timers {
    slots: [Option<Slot>; 5],
    seq: u64,
}

impl Timers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm `kind` to fire at `now_ms + delay_ms`, replacing any live deadline.
    /// Zero delays are bumped to 1 ms so a timer armed while handling a
    /// deadline can never come due in the same pass.
    pub fn arm(&mut self, kind: TimerKind, now_ms: u64, delay_ms: u64) {
        self.seq += 1;
        self.slots[kind.index()] = Some(Slot {
            deadline_ms: now_ms.saturating_add(delay_ms.max(1)),
            seq: self.seq,
        });
    }

    /// Returns whether a live deadline was dropped.
    pub fn cancel(&mut self, kind: TimerKind) -> bool {
        self.slots[kind.index()].take().is_some()
    }

    pub fn cancel_all(&mut self) {
        for kind in TimerKind::ALL {
            self.cancel(kind);
        }
    }

    pub fn is_armed(&self, kind: TimerKind) -> bool {
        self.slots[kind.index()].is_some()
    }

    pub fn deadline(&self, kind: TimerKind) -> Option<u64> {
        self.slots[kind.index()].map(|s| s.deadline_ms)
    }

    pub fn next_deadline(&self) -> Option<u64> {
        self.slots.iter().flatten().map(|s| s.deadline_ms).min()
    }

    /// Remove and return the earliest family due at `now_ms`. The slot is
    /// emptied before the caller acts on it.
    pub fn pop_due(&mut self, now_ms: u64) -> Option<TimerKind> {
        let kind = TimerKind::ALL
            .into_iter()
            .filter_map(|k| self.slots[k.index()].map(|s| (k, s)))
            .filter(|(_, s)| s.deadline_ms <= now_ms)
            .min_by_key(|(_, s)| (s.deadline_ms, s.seq))
            .map(|(k, _)| k)?;
        self.slots[kind.index()] = None;
        Some(kind)
    }
}
