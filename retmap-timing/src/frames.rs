use std::time::Duration;

/// Per-frame wall-clock deltas, kept for post-hoc diagnostics only; the
/// stimulus schedule is driven by the clock, never by frame count.
#[derive(Debug, Default, Clone)]
pub struct FrameIntervals {
    deltas: Vec<f64>,
}

/// Summary statistics over the recorded intervals.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameStats {
    pub mean_secs: f64,
    pub jitter_secs: f64,
    pub min_secs: f64,
    pub max_secs: f64,
    pub effective_fps: f64,
}

impl FrameIntervals {
    pub fn new() -> Self {
        Self { deltas: Vec::new() }
    }

    pub fn record(&mut self, delta: Duration) {
        self.deltas.push(delta.as_secs_f64());
    }

    pub fn len(&self) -> usize {
        self.deltas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deltas.is_empty()
    }

    pub fn all(&self) -> &[f64] {
        &self.deltas
    }

    /// Intervals minus the first entry; the startup frame includes
    /// one-time setup cost and is excluded from the persisted artifact.
    pub fn excluding_startup(&self) -> &[f64] {
        if self.deltas.is_empty() {
            &[]
        } else {
            &self.deltas[1..]
        }
    }

    /// Frames whose interval exceeded 1.5x the nominal refresh period.
    pub fn overruns(&self, nominal_secs: f64) -> usize {
        let limit = nominal_secs * 1.5;
        self.deltas.iter().filter(|&&d| d > limit).count()
    }

    pub fn stats(&self) -> FrameStats {
        if self.deltas.is_empty() {
            return FrameStats {
                mean_secs: 0.0,
                jitter_secs: 0.0,
                min_secs: 0.0,
                max_secs: 0.0,
                effective_fps: 0.0,
            };
        }
        let n = self.deltas.len() as f64;
        let mean = self.deltas.iter().sum::<f64>() / n;
        let var = self.deltas.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / n;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for &d in &self.deltas {
            min = min.min(d);
            max = max.max(d);
        }
        FrameStats {
            mean_secs: mean,
            jitter_secs: var.sqrt(),
            min_secs: min,
            max_secs: max,
            effective_fps: if mean > 0.0 { 1.0 / mean } else { 0.0 },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorded(deltas_ms: &[u64]) -> FrameIntervals {
        let mut f = FrameIntervals::new();
        for &ms in deltas_ms {
            f.record(Duration::from_millis(ms));
        }
        f
    }

    #[test]
    fn excludes_startup_frame_from_artifact() {
        let f = recorded(&[120, 16, 17, 16]);
        assert_eq!(f.len(), 4);
        assert_eq!(f.excluding_startup().len(), 3);
        assert!((f.excluding_startup()[0] - 0.016).abs() < 1e-9);
        assert!(FrameIntervals::new().excluding_startup().is_empty());
    }

    #[test]
    fn counts_overruns_against_nominal_period() {
        let f = recorded(&[16, 16, 40, 16, 33]);
        // 60 Hz nominal: anything above 25 ms is an overrun.
        assert_eq!(f.overruns(1.0 / 60.0), 2);
    }

    #[test]
    fn stats_over_uniform_intervals() {
        let f = recorded(&[20, 20, 20, 20]);
        let s = f.stats();
        assert!((s.mean_secs - 0.020).abs() < 1e-9);
        assert!(s.jitter_secs < 1e-9);
        assert!((s.effective_fps - 50.0).abs() < 1e-6);
    }

    #[test]
    fn stats_on_empty_log_are_zero() {
        let s = FrameIntervals::new().stats();
        assert_eq!(s.effective_fps, 0.0);
        assert_eq!(s.mean_secs, 0.0);
    }
}
