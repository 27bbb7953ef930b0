use serde::{Deserialize, Serialize};

use crate::schedule::MotionSchedule;

/// One recorded boundary crossing: the phase being entered and the
/// elapsed time when the crossing was observed. The terminal entry
/// appended by [`PhaseTracker::finish`] carries `index == phase_count`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhaseChange {
    pub index: usize,
    pub at_secs: f64,
}

/// Tracks which phase (orientation traversal or rotation cycle) the run
/// is in, appends boundary crossings to an ordered log, and accumulates
/// the wall-clock duration actually spent in each phase.
///
/// `check` is idempotent under repeated per-frame polling: a boundary
/// fires exactly once no matter how often it is polled or at what frame
/// rate.
#[derive(Debug, Clone)]
pub struct PhaseTracker {
    phase_secs: f64,
    phase_count: usize,
    index: usize,
    changes: Vec<PhaseChange>,
    durations: Vec<f64>,
    finished: bool,
}

impl PhaseTracker {
    pub fn new(phase_count: usize, phase_secs: f64) -> Self {
        Self {
            phase_secs,
            phase_count,
            index: 0,
            changes: Vec::new(),
            durations: Vec::new(),
            finished: false,
        }
    }

    pub fn for_schedule(schedule: &MotionSchedule) -> Self {
        Self::new(schedule.phase_count(), schedule.phase_secs())
    }

    /// Current phase index, 0-based.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn phase_count(&self) -> usize {
        self.phase_count
    }

    /// Poll for a boundary crossing at elapsed time `t`. Fires at most
    /// one transition per call; with `t` non-decreasing across calls a
    /// boundary can never fire twice.
    pub fn check(&mut self, t: f64) -> Option<PhaseChange> {
        if self.finished || self.index + 1 >= self.phase_count {
            return None;
        }
        let boundary = (self.index as f64 + 1.0) * self.phase_secs;
        if t < boundary {
            return None;
        }
        self.index += 1;
        let change = PhaseChange {
            index: self.index,
            at_secs: t,
        };
        self.changes.push(change);
        let spent: f64 = self.durations.iter().sum();
        self.durations.push(t - spent);
        Some(change)
    }

    /// Close out the final phase at elapsed time `t`. Appends the
    /// terminal log entry so recorded durations sum to `t`. Idempotent.
    pub fn finish(&mut self, t: f64) {
        if self.finished {
            return;
        }
        self.finished = true;
        self.changes.push(PhaseChange {
            index: self.phase_count,
            at_secs: t,
        });
        let spent: f64 = self.durations.iter().sum();
        self.durations.push(t - spent);
    }

    pub fn done(&self) -> bool {
        self.finished
    }

    /// Append-only boundary log, oldest first.
    pub fn changes(&self) -> &[PhaseChange] {
        &self.changes
    }

    /// Wall-clock seconds spent in each completed phase.
    pub fn durations(&self) -> &[f64] {
        &self.durations
    }

    pub fn mean_duration(&self) -> f64 {
        if self.durations.is_empty() {
            0.0
        } else {
            self.durations.iter().sum::<f64>() / self.durations.len() as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundaries_fire_exactly_once_under_repeated_polling() {
        let mut tracker = PhaseTracker::new(8, 2.0);
        let mut fired = Vec::new();
        // Poll at 240 Hz with plenty of duplicate timestamps.
        let mut t = 0.0;
        while t < 16.0 {
            if let Some(ch) = tracker.check(t) {
                fired.push(ch);
            }
            tracker.check(t);
            t += 1.0 / 240.0;
        }
        assert_eq!(fired.len(), 7);
        for (i, ch) in fired.iter().enumerate() {
            assert_eq!(ch.index, i + 1);
            let ideal = (i as f64 + 1.0) * 2.0;
            assert!((ch.at_secs - ideal).abs() <= 1.0 / 240.0 + 1e-9);
        }
    }

    #[test]
    fn last_phase_has_no_outgoing_boundary() {
        let mut tracker = PhaseTracker::new(2, 8.0);
        assert!(tracker.check(7.9).is_none());
        assert!(tracker.check(8.0).is_some());
        // Index 1 is terminal; only finish() can close it.
        assert!(tracker.check(16.0).is_none());
        assert!(tracker.check(1000.0).is_none());
        assert_eq!(tracker.index(), 1);
    }

    #[test]
    fn durations_sum_to_total_elapsed() {
        let mut tracker = PhaseTracker::new(8, 2.0);
        let mut t: f64 = 0.0;
        while t < 16.1 {
            tracker.check(t.min(16.1));
            t += 0.016;
        }
        tracker.finish(16.1);
        let sum: f64 = tracker.durations().iter().sum();
        assert!((sum - 16.1).abs() < 1e-9);
        assert_eq!(tracker.changes().len(), 8);
        assert_eq!(tracker.changes().last().map(|c| c.index), Some(8));
        assert!((tracker.mean_duration() - 16.1 / 8.0).abs() < 1e-9);
    }

    #[test]
    fn finish_is_idempotent() {
        let mut tracker = PhaseTracker::new(2, 8.0);
        tracker.check(8.0);
        tracker.finish(16.0);
        tracker.finish(17.0);
        assert_eq!(tracker.changes().len(), 2);
        assert!(tracker.done());
    }
}
