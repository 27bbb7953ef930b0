use std::time::Duration;

/// One-shot timer counting down from a fixed duration.
///
/// Pure over the owning clock: callers pass the clock's current elapsed
/// value into every query, so the timer itself holds no mutable state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountdownTimer {
    total: Duration,
    started_at: Duration,
}

impl CountdownTimer {
    /// Start counting down `total` from the clock position `now`.
    pub fn start(now: Duration, total: Duration) -> Self {
        Self {
            total,
            started_at: now,
        }
    }

    pub fn remaining(&self, now: Duration) -> Duration {
        let run = now.saturating_sub(self.started_at);
        self.total.saturating_sub(run)
    }

    pub fn expired(&self, now: Duration) -> bool {
        self.remaining(now) == Duration::ZERO
    }

    pub fn total(&self) -> Duration {
        self.total
    }
}
