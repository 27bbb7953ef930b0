pub mod config;
pub mod phase;
pub mod schedule;

pub use config::{
    ApertureConfig, FixationConfig, GridConfig, RotationConfig, SweepConfig, BAR_ORIENTATIONS_DEG,
    BAR_ORIENTATION_ORDER, BAR_PATHS, ORIENTATION_COUNT,
};
pub use phase::{PhaseChange, PhaseTracker};
pub use schedule::{contrast_at, CrossColor, Contrast, MotionSchedule, StimulusFrame};
