use retmap_core::{
    ApertureConfig, FixationConfig, GridConfig, MotionSchedule, RotationConfig, SweepConfig,
};
use serde::{Deserialize, Serialize};

/// Stimulus modality for the run, selected once at session setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Modality {
    /// Checkerboard bar sweeping across eight orientations.
    Bars,
    /// Checkerboard wedge rotating about fixation.
    Wedge,
}

impl Modality {
    /// Short tag used in output folder names.
    pub fn label(self) -> &'static str {
        match self {
            Modality::Bars => "bars",
            Modality::Wedge => "polAng",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantInfo {
    pub subject: String,
    pub operator: String,
}

/// Everything one run needs, assembled once at startup. No process-wide
/// globals: schedules and trackers are built from this struct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub modality: Modality,
    pub sweep: SweepConfig,
    pub rotation: RotationConfig,
    pub fixation: FixationConfig,
    pub grid: GridConfig,
    pub aperture: ApertureConfig,
    /// Fixation-only wait before and after the stimulation loop.
    pub settle_secs: f64,
    /// Gate the run on the hardware trigger channel instead of the
    /// keyboard.
    pub use_button_box: bool,
    /// Acquisition hardware reports active-low.
    pub mri_polarity: bool,
    pub debug_overlay: bool,
    /// Seconds between FPS overlay refreshes.
    pub fps_update_secs: f64,
}

impl SessionConfig {
    pub fn bars() -> Self {
        Self {
            modality: Modality::Bars,
            sweep: SweepConfig::default(),
            rotation: RotationConfig::default(),
            fixation: FixationConfig {
                color_change: true,
                ..FixationConfig::default()
            },
            grid: GridConfig::default(),
            aperture: ApertureConfig::default(),
            settle_secs: 12.0,
            use_button_box: false,
            mri_polarity: false,
            debug_overlay: false,
            fps_update_secs: 1.0,
        }
    }

    pub fn wedge() -> Self {
        Self {
            modality: Modality::Wedge,
            fixation: FixationConfig {
                color_change_secs: 2.0,
                ..FixationConfig::default()
            },
            ..Self::bars()
        }
    }

    pub fn schedule(&self) -> MotionSchedule {
        match self.modality {
            Modality::Bars => MotionSchedule::Sweep(self.sweep.clone()),
            Modality::Wedge => MotionSchedule::Rotation(self.rotation.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modality_selects_the_schedule_variant() {
        assert!(matches!(
            SessionConfig::bars().schedule(),
            MotionSchedule::Sweep(_)
        ));
        assert!(matches!(
            SessionConfig::wedge().schedule(),
            MotionSchedule::Rotation(_)
        ));
    }

    #[test]
    fn bars_alternate_the_fixation_color() {
        assert!(SessionConfig::bars().fixation.color_change);
        assert!(!SessionConfig::wedge().fixation.color_change);
    }
}
