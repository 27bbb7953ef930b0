use crate::config::{
    FixationConfig, RotationConfig, SweepConfig, BAR_ORIENTATIONS_DEG, BAR_ORIENTATION_ORDER,
    BAR_PATHS, ORIENTATION_COUNT,
};

/// Contrast polarity of the checkerboard texture for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Contrast {
    Positive,
    Negative,
}

impl Contrast {
    pub fn sign(self) -> f32 {
        match self {
            Contrast::Positive => 1.0,
            Contrast::Negative => -1.0,
        }
    }
}

/// Square-wave contrast reversal: positive for the first half of each
/// flicker period.
pub fn contrast_at(t: f64, flicker_secs: f64) -> Contrast {
    if t.rem_euclid(flicker_secs) < flicker_secs / 2.0 {
        Contrast::Positive
    } else {
        Contrast::Negative
    }
}

/// Fixation cross color for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrossColor {
    Red,
    Green,
}

impl FixationConfig {
    pub fn color_at(&self, t: f64) -> CrossColor {
        if !self.color_change || t.rem_euclid(self.color_change_secs) < self.color_change_secs / 2.0
        {
            CrossColor::Red
        } else {
            CrossColor::Green
        }
    }

    pub fn angle_at(&self, t: f64) -> f32 {
        if self.rotating {
            (t * self.rotation_hz * 360.0) as f32
        } else {
            0.0
        }
    }
}

/// Stimulus parameters for one frame. Transient: recomputed every frame
/// from elapsed time alone, never persisted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StimulusFrame {
    /// Bar center in normalized units (y half-extent = 1); zero for the
    /// wedge, which pivots about the origin.
    pub position: [f32; 2],
    /// Bar orientation or wedge rotation, degrees.
    pub orientation_deg: f32,
    pub contrast: Contrast,
    /// Orientation index (sweep) or completed-cycle index (rotation).
    pub phase: usize,
}

/// Maps elapsed time to stimulus parameters for the selected modality.
///
/// Sampling is defined on `[0, total_secs)`; beyond that the last valid
/// sample is returned and callers are expected to have stopped once the
/// governing countdown expired.
#[derive(Debug, Clone)]
pub enum MotionSchedule {
    Sweep(SweepConfig),
    Rotation(RotationConfig),
}

impl MotionSchedule {
    pub fn total_secs(&self) -> f64 {
        match self {
            MotionSchedule::Sweep(c) => c.total_secs(),
            MotionSchedule::Rotation(c) => c.total_secs(),
        }
    }

    /// Duration of one phase (orientation traversal or revolution).
    pub fn phase_secs(&self) -> f64 {
        match self {
            MotionSchedule::Sweep(c) => c.phase_secs(),
            MotionSchedule::Rotation(c) => c.period_secs(),
        }
    }

    pub fn phase_count(&self) -> usize {
        match self {
            MotionSchedule::Sweep(_) => ORIENTATION_COUNT,
            MotionSchedule::Rotation(c) => c.cycles as usize,
        }
    }

    pub fn flicker_secs(&self) -> f64 {
        match self {
            MotionSchedule::Sweep(c) => c.flicker_secs,
            MotionSchedule::Rotation(c) => c.flicker_secs,
        }
    }

    pub fn sample(&self, t: f64) -> StimulusFrame {
        // Clamp into the scheduled window; motion is undefined past the
        // end, so the last valid sample is held.
        let t = t.clamp(0.0, self.total_secs() - 1e-9);
        match self {
            MotionSchedule::Sweep(c) => sample_sweep(c, t),
            MotionSchedule::Rotation(c) => sample_rotation(c, t),
        }
    }
}

fn sample_sweep(c: &SweepConfig, t: f64) -> StimulusFrame {
    let d = c.phase_secs();
    let phase = ((t / d) as usize).min(ORIENTATION_COUNT - 1);
    let ordered = BAR_ORIENTATION_ORDER[phase];
    let frac = ((t % c.cycle_secs) / c.cycle_secs) as f32;

    let [start, end] = BAR_PATHS[ordered];
    let position = [
        start[0] + (end[0] - start[0]) * frac,
        start[1] + (end[1] - start[1]) * frac,
    ];

    StimulusFrame {
        position,
        orientation_deg: BAR_ORIENTATIONS_DEG[ordered],
        contrast: contrast_at(t, c.flicker_secs),
        phase,
    }
}

fn sample_rotation(c: &RotationConfig, t: f64) -> StimulusFrame {
    let phase = ((t * c.rotation_hz) as usize).min(c.cycles as usize - 1);
    StimulusFrame {
        position: [0.0, 0.0],
        orientation_deg: -(t * c.rotation_hz * 360.0) as f32,
        contrast: contrast_at(t, c.flicker_secs),
        phase,
    }
}
