//! Wall-clock heartbeat aligned to interval boundaries.
//!
//! The reactor checks the heartbeat once per iteration. Firing realigns
//! the reference point to the most recent boundary instead of adding the
//! interval, so iteration jitter never accumulates into drift.

use std::time::Duration;

pub(crate) struct Heartbeat {
    interval_secs: u64,
    prev_boundary: u64,
}

impl Heartbeat {
    pub fn new(interval: Duration, now_secs: u64) -> Self {
        let interval_secs = interval.as_secs().max(1);
        Heartbeat {
            interval_secs,
            prev_boundary: now_secs - now_secs % interval_secs,
        }
    }

    /// True at most once per elapsed interval.
    pub fn due(&mut self, now_secs: u64) -> bool {
        if now_secs.saturating_sub(self.prev_boundary) >= self.interval_secs {
            self.prev_boundary = now_secs - now_secs % self.interval_secs;
            true
        } else {
            false
        }
    }
}
