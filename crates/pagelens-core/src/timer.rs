#![forbid(unsafe_code)]

//! Host-polled debounce timer.
//!
//! The engine never schedules callbacks itself; the web glue drives time by
//! polling on animation frames (or a coarse interval) with the current
//! monotonic clock. Arming replaces any earlier deadline, which is exactly
//! the trailing-edge debounce the hover, scroll and navigation paths need.

/// A single re-armable deadline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DebounceTimer {
    deadline_ms: Option<u64>,
}

impl DebounceTimer {
    #[must_use]
    pub const fn new() -> Self {
        Self { deadline_ms: None }
    }

    /// Set (or push back) the deadline to `now_ms + delay_ms`.
    pub fn arm(&mut self, now_ms: u64, delay_ms: u64) {
        self.deadline_ms = Some(now_ms.saturating_add(delay_ms));
    }

    pub fn disarm(&mut self) {
        self.deadline_ms = None;
    }

    #[must_use]
    pub const fn is_armed(&self) -> bool {
        self.deadline_ms.is_some()
    }

    /// Returns true exactly once when the deadline has passed, disarming.
    pub fn fire_due(&mut self, now_ms: u64) -> bool {
        match self.deadline_ms {
            Some(deadline) if now_ms >= deadline => {
                self.deadline_ms = None;
                true
            }
            _ => false,
        }
    }
}
