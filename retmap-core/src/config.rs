use serde::{Deserialize, Serialize};

/// Number of bar orientations in the sweep modality.
pub const ORIENTATION_COUNT: usize = 8;

/// Bar orientation angles, degrees, one per traversal direction.
pub const BAR_ORIENTATIONS_DEG: [f32; ORIENTATION_COUNT] =
    [0.0, 45.0, 90.0, 135.0, 180.0, 225.0, 270.0, 315.0];

/// Traversal endpoints for each orientation, in normalized screen units
/// (y half-extent = 1): `[start, end]` per orientation. The 1.4 factor
/// makes the bar enter and leave fully off-screen.
pub const BAR_PATHS: [[[f32; 2]; 2]; ORIENTATION_COUNT] = [
    [[0.0, 1.4], [0.0, -1.4]],
    [[1.4, 1.4], [-1.4, -1.4]],
    [[1.4, 0.0], [-1.4, 0.0]],
    [[1.4, -1.4], [-1.4, 1.4]],
    [[0.0, -1.4], [0.0, 1.4]],
    [[-1.4, -1.4], [1.4, 1.4]],
    [[-1.4, 0.0], [1.4, 0.0]],
    [[-1.4, 1.4], [1.4, -1.4]],
];

/// Order in which the eight orientations are traversed. This permutation
/// counter-balances the design across the run; it is part of the
/// experimental protocol, not an implementation choice. Do not reorder.
pub const BAR_ORIENTATION_ORDER: [usize; ORIENTATION_COUNT] = [0, 5, 2, 7, 4, 1, 6, 3];

/// Sweeping-bar modality parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepConfig {
    /// Seconds for one traversal of the screen.
    pub cycle_secs: f64,
    /// Traversals per orientation before advancing to the next.
    pub passes_per_orientation: u32,
    /// Seconds for one full black/white contrast reversal.
    pub flicker_secs: f64,
    /// Bar size as a fraction of (screen width, screen height).
    pub bar_size: (f32, f32),
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            cycle_secs: 64.0,
            passes_per_orientation: 1,
            flicker_secs: 0.2,
            bar_size: (1.0, 1.0 / 8.0),
        }
    }
}

impl SweepConfig {
    /// Seconds spent on one orientation.
    pub fn phase_secs(&self) -> f64 {
        self.cycle_secs * f64::from(self.passes_per_orientation)
    }

    pub fn total_secs(&self) -> f64 {
        self.phase_secs() * ORIENTATION_COUNT as f64
    }
}

/// Rotating-wedge modality parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RotationConfig {
    /// Full revolutions in the run.
    pub cycles: u32,
    /// Revolutions per second; the sign of the drawn angle encodes the
    /// rotation direction.
    pub rotation_hz: f64,
    /// Seconds for one full black/white contrast reversal.
    pub flicker_secs: f64,
    /// Angular width of the wedge, degrees.
    pub wedge_width_deg: f32,
    /// Angular position of the wedge at t = 0, degrees.
    pub initial_wedge_deg: f32,
}

impl Default for RotationConfig {
    fn default() -> Self {
        let wedge_width_deg = 22.5;
        Self {
            cycles: 12,
            rotation_hz: 1.0 / 64.0,
            flicker_secs: 0.2,
            wedge_width_deg,
            initial_wedge_deg: 90.0 - wedge_width_deg / 4.0,
        }
    }
}

impl RotationConfig {
    /// Seconds for one full revolution.
    pub fn period_secs(&self) -> f64 {
        1.0 / self.rotation_hz
    }

    pub fn total_secs(&self) -> f64 {
        f64::from(self.cycles) * self.period_secs()
    }
}

/// Fixation cross appearance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixationConfig {
    /// Alternate the cross color in a square wave.
    pub color_change: bool,
    /// Seconds for one full red/green alternation.
    pub color_change_secs: f64,
    /// Slowly rotate the cross.
    pub rotating: bool,
    /// Cross revolutions per second when rotating.
    pub rotation_hz: f64,
    /// Cross arm length, pixels.
    pub size_px: f32,
}

impl Default for FixationConfig {
    fn default() -> Self {
        Self {
            color_change: false,
            color_change_secs: 15.0,
            rotating: false,
            rotation_hz: 0.05,
            size_px: 20.0,
        }
    }
}

/// Spider-web background grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridConfig {
    pub enabled: bool,
    /// Concentric ring count.
    pub rings: u32,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            rings: 4,
        }
    }
}

/// Circular aperture clipping the stimulus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApertureConfig {
    pub enabled: bool,
    /// Diameter in normalized units (y half-extent = 1).
    pub diameter: f32,
}

impl Default for ApertureConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            diameter: 2.5,
        }
    }
}
