use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Monotonic elapsed-time source with an explicit reset epoch.
///
/// `elapsed` is non-decreasing between resets and immune to wall-clock
/// adjustments; `reset` opens a new epoch at the current instant.
pub trait Clock: Send {
    fn reset(&mut self);
    fn elapsed(&self) -> Duration;
    /// Block for `d`, as precisely as the platform allows.
    fn sleep(&self, d: Duration);

    fn elapsed_secs(&self) -> f64 {
        self.elapsed().as_secs_f64()
    }
}

/// Production clock backed by `std::time::Instant`.
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    epoch: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn reset(&mut self) {
        self.epoch = Instant::now();
    }

    fn elapsed(&self) -> Duration {
        self.epoch.elapsed()
    }

    fn sleep(&self, d: Duration) {
        crate::sleep::precise_sleep(d);
    }
}

/// Scripted clock for tests and harness code.
///
/// Time only moves when something advances it; `sleep` advances it by the
/// requested amount so settling waits complete instantly under test.
/// Clones share the same underlying time, so a test can hold one handle
/// while the code under test owns another.
#[derive(Debug, Clone)]
pub struct ScriptedClock {
    inner: Arc<Mutex<ScriptedTime>>,
}

#[derive(Debug)]
struct ScriptedTime {
    now: Duration,
    epoch: Duration,
}

impl ScriptedClock {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(ScriptedTime {
                now: Duration::ZERO,
                epoch: Duration::ZERO,
            })),
        }
    }

    pub fn advance(&self, d: Duration) {
        let mut t = self.lock();
        t.now += d;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ScriptedTime> {
        match self.inner.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Default for ScriptedClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ScriptedClock {
    fn reset(&mut self) {
        let mut t = self.lock();
        t.epoch = t.now;
    }

    fn elapsed(&self) -> Duration {
        let t = self.lock();
        t.now - t.epoch
    }

    fn sleep(&self, d: Duration) {
        self.advance(d);
    }
}
