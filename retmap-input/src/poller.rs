use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::device::{Button, DeviceError, DinDevice, BUTTON_COUNT};

/// Level and last-change time of one button channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ButtonState {
    pub level: bool,
    /// Poller-clock time of the most recent edge on this channel.
    pub changed_at: Duration,
}

/// Immutable snapshot of all button channels, copied out whole so the
/// reader never observes a partially-updated state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ButtonSnapshot {
    buttons: [ButtonState; BUTTON_COUNT],
}

impl ButtonSnapshot {
    /// Initial state: all lines low except the trigger, which idles high.
    fn initial() -> Self {
        let mut buttons = [ButtonState {
            level: false,
            changed_at: Duration::ZERO,
        }; BUTTON_COUNT];
        buttons[Button::Trigger as usize].level = true;
        Self { buttons }
    }

    pub fn button(&self, b: Button) -> ButtonState {
        self.buttons[b as usize]
    }

    pub fn level(&self, b: Button) -> bool {
        self.buttons[b as usize].level
    }

    /// True once the scanner trigger has pulled its idle-high line low.
    pub fn trigger_active(&self) -> bool {
        !self.level(Button::Trigger)
    }
}

struct Shared {
    stop: AtomicBool,
    snapshot: Mutex<ButtonSnapshot>,
}

/// Background busy-poll loop over a digital-input device.
///
/// The loop refreshes the register cache, drains any logged edge
/// transitions, applies the polarity mask and updates per-button levels
/// and timestamps. It deliberately never sleeps between iterations:
/// response-timing precision is worth a core. The stop flag is checked
/// once per iteration, so shutdown latency is bounded by one poll.
///
/// The handle stops and joins the thread on `stop()` and again on drop,
/// so a panic in the frame loop cannot leave the device open or the
/// thread running.
pub struct InputPoller {
    shared: Arc<Shared>,
    thread: Option<JoinHandle<()>>,
    initial_bits: Option<u16>,
}

impl InputPoller {
    /// Open the device and start polling. An open failure is fatal;
    /// read failures after startup are logged and polling continues.
    pub fn start(
        mut device: impl DinDevice + 'static,
        polarity_mask: u16,
    ) -> Result<Self, DeviceError> {
        device.open()?;
        let initial_bits = match device.din_value() {
            Ok(bits) => {
                info!("input poller started; initial register state {bits:016b}");
                Some(bits)
            }
            Err(e) => {
                warn!(error = %e, "could not read initial register state");
                None
            }
        };

        let shared = Arc::new(Shared {
            stop: AtomicBool::new(false),
            snapshot: Mutex::new(ButtonSnapshot::initial()),
        });

        let worker = Arc::clone(&shared);
        let thread = std::thread::Builder::new()
            .name("din-poller".into())
            .spawn(move || {
                let epoch = Instant::now();
                loop {
                    if let Err(e) = poll_once(&mut device, polarity_mask, &worker, epoch) {
                        warn!(error = %e, "transient device read failure, continuing");
                    }
                    if worker.stop.load(Ordering::Acquire) {
                        break;
                    }
                }
                device.close();
                info!("input poller exited");
            })
            .map_err(|e| DeviceError::Unavailable(format!("poller thread: {e}")))?;

        Ok(Self {
            shared,
            thread: Some(thread),
            initial_bits,
        })
    }

    /// Raw register state read at startup, for the session record. `None`
    /// when that first read failed.
    pub fn initial_register(&self) -> Option<u16> {
        self.initial_bits
    }

    /// Latest published state. Never blocks longer than the poller's
    /// brief update window.
    pub fn snapshot(&self) -> ButtonSnapshot {
        match self.shared.snapshot.lock() {
            Ok(g) => *g,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Signal the loop to stop and wait for it to finish its current
    /// iteration.
    pub fn stop(mut self) {
        self.signal_and_join();
    }

    fn signal_and_join(&mut self) {
        self.shared.stop.store(true, Ordering::Release);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for InputPoller {
    fn drop(&mut self) {
        self.signal_and_join();
    }
}

fn poll_once(
    device: &mut impl DinDevice,
    polarity_mask: u16,
    shared: &Shared,
    epoch: Instant,
) -> Result<(), DeviceError> {
    device.update_register_cache()?;
    if device.pending_transitions()? == 0 {
        return Ok(());
    }
    let batch = device.read_transitions()?;
    let now = epoch.elapsed();

    let mut guard = match shared.snapshot.lock() {
        Ok(g) => g,
        Err(poisoned) => poisoned.into_inner(),
    };
    for transition in batch {
        let bits = transition.bits ^ polarity_mask;
        for b in Button::ALL {
            let level = bits & b.bit() != 0;
            let state = &mut guard.buttons[b as usize];
            if level != state.level {
                state.level = level;
                state.changed_at = now;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DinTransition;
    use std::collections::VecDeque;

    /// Scripted device: each poll iteration serves the next batch of
    /// transitions (or an error) from a queue.
    struct ScriptedDevice {
        script: VecDeque<Result<Vec<DinTransition>, DeviceError>>,
        fail_open: bool,
        opened: bool,
        closed: Arc<AtomicBool>,
    }

    impl ScriptedDevice {
        fn new(script: Vec<Result<Vec<DinTransition>, DeviceError>>) -> Self {
            Self {
                script: script.into(),
                fail_open: false,
                opened: false,
                closed: Arc::new(AtomicBool::new(false)),
            }
        }

        fn closed_flag(&self) -> Arc<AtomicBool> {
            Arc::clone(&self.closed)
        }
    }

    impl DinDevice for ScriptedDevice {
        fn open(&mut self) -> Result<(), DeviceError> {
            if self.fail_open {
                return Err(DeviceError::Unavailable("no device on bus".into()));
            }
            self.opened = true;
            Ok(())
        }

        fn update_register_cache(&mut self) -> Result<(), DeviceError> {
            Ok(())
        }

        fn pending_transitions(&mut self) -> Result<usize, DeviceError> {
            Ok(match self.script.front() {
                Some(Ok(batch)) => batch.len(),
                Some(Err(_)) => 1,
                None => 0,
            })
        }

        fn read_transitions(&mut self) -> Result<Vec<DinTransition>, DeviceError> {
            self.script.pop_front().unwrap_or(Ok(Vec::new()))
        }

        fn din_value(&mut self) -> Result<u16, DeviceError> {
            Ok(Button::Trigger.bit())
        }

        fn close(&mut self) {
            self.closed.store(true, Ordering::Release);
        }
    }

    fn tr(bits: u16) -> DinTransition {
        DinTransition {
            bits,
            device_time: 0.0,
        }
    }

    fn wait_for<F: Fn() -> bool>(cond: F) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while !cond() {
            assert!(Instant::now() < deadline, "condition not met in time");
            std::thread::yield_now();
        }
    }

    #[test]
    fn open_failure_is_fatal() {
        let mut dev = ScriptedDevice::new(Vec::new());
        dev.fail_open = true;
        let err = InputPoller::start(dev, 0).err().unwrap();
        assert!(matches!(err, DeviceError::Unavailable(_)));
    }

    #[test]
    fn snapshot_reflects_last_level_per_channel() {
        // Trigger high throughout; red pressed then released, green
        // pressed and held.
        let idle = Button::Trigger.bit();
        let dev = ScriptedDevice::new(vec![
            Ok(vec![tr(idle | Button::Red.bit())]),
            Ok(vec![tr(idle), tr(idle | Button::Green.bit())]),
        ]);
        let poller = InputPoller::start(dev, 0).unwrap();
        wait_for(|| poller.snapshot().level(Button::Green));

        let snap = poller.snapshot();
        assert!(!snap.level(Button::Red));
        assert!(snap.level(Button::Green));
        assert!(snap.level(Button::Trigger));
        assert!(!snap.trigger_active());
        // Red changed twice; its last edge is no earlier than green's
        // first and both are after the epoch.
        assert!(snap.button(Button::Green).changed_at >= snap.button(Button::Red).changed_at);
        poller.stop();
    }

    #[test]
    fn polarity_mask_inverts_active_low_hardware() {
        // Active-low hardware: raw patterns are the bitwise inverse of
        // the logical levels on the five button lines. Red pressed, then
        // released, with the trigger logically high throughout.
        let mask = crate::device::polarity_mask(true);
        let red_pressed = (Button::Red.bit() | Button::Trigger.bit()) ^ mask;
        let idle = Button::Trigger.bit() ^ mask;
        let dev = ScriptedDevice::new(vec![Ok(vec![tr(red_pressed)]), Ok(vec![tr(idle)])]);
        let poller = InputPoller::start(dev, mask).unwrap();

        // Red starts low with a zero timestamp; low again with a recorded
        // edge means both masked batches have been applied.
        wait_for(|| {
            let snap = poller.snapshot();
            !snap.level(Button::Red) && snap.button(Button::Red).changed_at > Duration::ZERO
        });
        let snap = poller.snapshot();
        assert!(!snap.level(Button::Red));
        assert!(snap.level(Button::Trigger));
        assert!(!snap.trigger_active());
        poller.stop();
    }

    #[test]
    fn initial_register_state_is_exposed_for_the_session_record() {
        let dev = ScriptedDevice::new(Vec::new());
        let poller = InputPoller::start(dev, 0).unwrap();
        assert_eq!(poller.initial_register(), Some(Button::Trigger.bit()));
        poller.stop();
    }

    #[test]
    fn transient_read_errors_do_not_stop_polling() {
        let idle = Button::Trigger.bit();
        let dev = ScriptedDevice::new(vec![
            Err(DeviceError::Read("malformed log frame".into())),
            Ok(vec![tr(idle | Button::Blue.bit())]),
        ]);
        let poller = InputPoller::start(dev, 0).unwrap();
        wait_for(|| poller.snapshot().level(Button::Blue));
        poller.stop();
    }

    #[test]
    fn stop_joins_promptly_and_closes_the_device() {
        let dev = ScriptedDevice::new(Vec::new());
        let closed = dev.closed_flag();
        let poller = InputPoller::start(dev, 0).unwrap();
        std::thread::sleep(Duration::from_millis(20));
        let begun = Instant::now();
        poller.stop();
        assert!(begun.elapsed() < Duration::from_millis(500));
        assert!(closed.load(Ordering::Acquire));
    }

    #[test]
    fn drop_stops_the_poller() {
        let dev = ScriptedDevice::new(Vec::new());
        let closed = dev.closed_flag();
        {
            let _poller = InputPoller::start(dev, 0).unwrap();
        }
        assert!(closed.load(Ordering::Acquire));
    }

    #[test]
    fn timestamps_are_monotonic_per_channel() {
        let idle = Button::Trigger.bit();
        let dev = ScriptedDevice::new(vec![
            Ok(vec![tr(idle | Button::Red.bit())]),
            Ok(vec![tr(idle)]),
            Ok(vec![tr(idle | Button::Red.bit())]),
        ]);
        let poller = InputPoller::start(dev, 0).unwrap();
        let mut last = Duration::ZERO;
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            let at = poller.snapshot().button(Button::Red).changed_at;
            assert!(at >= last);
            last = at;
            if poller.snapshot().level(Button::Red) && last > Duration::ZERO {
                break;
            }
        }
        poller.stop();
    }
}
