use std::collections::VecDeque;
use std::time::Instant;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    /// The device could not be opened or configured. Fatal at startup:
    /// response capture cannot proceed.
    #[error("response device unavailable: {0}")]
    Unavailable(String),
    /// A register or log read failed mid-session. Logged and skipped;
    /// polling continues.
    #[error("device read failed: {0}")]
    Read(String),
}

/// One logged digital-input transition: the raw register bit pattern and
/// the device's own timestamp, seconds since its marker was set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DinTransition {
    pub bits: u16,
    pub device_time: f64,
}

/// Register-level surface of a VPixx-style digital-input controller.
///
/// `open` selects the device, sets the onset marker, enables hardware
/// debouncing and starts transition logging. The poller is the sole
/// owner of the handle; no other code touches the device.
pub trait DinDevice: Send {
    fn open(&mut self) -> Result<(), DeviceError>;
    /// Refresh the local register cache from the hardware.
    fn update_register_cache(&mut self) -> Result<(), DeviceError>;
    /// Transitions logged since the previous drain.
    fn pending_transitions(&mut self) -> Result<usize, DeviceError>;
    /// Drain the transition log.
    fn read_transitions(&mut self) -> Result<Vec<DinTransition>, DeviceError>;
    /// Current digital-input levels.
    fn din_value(&mut self) -> Result<u16, DeviceError>;
    fn close(&mut self);
}

/// Response-box channels, one bit each in the input register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Button {
    Red = 0,
    Yellow = 1,
    Green = 2,
    Blue = 3,
    /// Scanner trigger line; idles high and goes low on the start pulse.
    Trigger = 4,
}

pub const BUTTON_COUNT: usize = 5;

impl Button {
    pub const ALL: [Button; BUTTON_COUNT] = [
        Button::Red,
        Button::Yellow,
        Button::Green,
        Button::Blue,
        Button::Trigger,
    ];

    pub fn bit(self) -> u16 {
        1 << (self as u16)
    }
}

/// XOR mask applied to the raw register before bits are extracted. The
/// MRI acquisition chain reports active-low, so its five button bits are
/// inverted.
pub fn polarity_mask(mri: bool) -> u16 {
    if mri {
        0x001f
    } else {
        0x0000
    }
}

/// Hardware-free [`DinDevice`] for rehearsal runs and tests: reports no
/// button activity, optionally emitting a single trigger pulse after a
/// delay so the gating wait can be exercised without a scanner.
#[derive(Debug)]
pub struct SimulatedDevice {
    opened_at: Option<Instant>,
    trigger_after_secs: Option<f64>,
    queued: VecDeque<DinTransition>,
    levels: u16,
}

impl SimulatedDevice {
    /// Quiet device: every line holds its idle level forever.
    pub fn idle() -> Self {
        Self {
            opened_at: None,
            trigger_after_secs: None,
            queued: VecDeque::new(),
            levels: Button::Trigger.bit(),
        }
    }

    /// Device that pulls the trigger line low `secs` after opening.
    pub fn with_trigger_after(secs: f64) -> Self {
        Self {
            trigger_after_secs: Some(secs),
            ..Self::idle()
        }
    }
}

impl DinDevice for SimulatedDevice {
    fn open(&mut self) -> Result<(), DeviceError> {
        self.opened_at = Some(Instant::now());
        Ok(())
    }

    fn update_register_cache(&mut self) -> Result<(), DeviceError> {
        let opened_at = self
            .opened_at
            .ok_or_else(|| DeviceError::Read("device not open".into()))?;
        if let Some(after) = self.trigger_after_secs {
            let elapsed = opened_at.elapsed().as_secs_f64();
            if elapsed >= after {
                self.trigger_after_secs = None;
                self.levels &= !Button::Trigger.bit();
                self.queued.push_back(DinTransition {
                    bits: self.levels,
                    device_time: elapsed,
                });
            }
        }
        Ok(())
    }

    fn pending_transitions(&mut self) -> Result<usize, DeviceError> {
        Ok(self.queued.len())
    }

    fn read_transitions(&mut self) -> Result<Vec<DinTransition>, DeviceError> {
        Ok(self.queued.drain(..).collect())
    }

    fn din_value(&mut self) -> Result<u16, DeviceError> {
        Ok(self.levels)
    }

    fn close(&mut self) {
        self.opened_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn button_bits_are_distinct() {
        let mut mask = 0u16;
        for b in Button::ALL {
            assert_eq!(mask & b.bit(), 0);
            mask |= b.bit();
        }
        assert_eq!(mask, 0x001f);
    }

    #[test]
    fn polarity_mask_covers_the_button_bits() {
        assert_eq!(polarity_mask(false), 0x0000);
        assert_eq!(polarity_mask(true), 0x001f);
    }

    #[test]
    fn simulated_device_fires_a_delayed_trigger() {
        let mut dev = SimulatedDevice::with_trigger_after(0.0);
        dev.open().unwrap();
        dev.update_register_cache().unwrap();
        assert_eq!(dev.pending_transitions().unwrap(), 1);
        let batch = dev.read_transitions().unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].bits & Button::Trigger.bit(), 0);
        assert!(dev.read_transitions().unwrap().is_empty());
    }

    #[test]
    fn simulated_device_requires_open() {
        let mut dev = SimulatedDevice::idle();
        assert!(matches!(
            dev.update_register_cache(),
            Err(DeviceError::Read(_))
        ));
    }
}
