use std::time::Duration;

use anyhow::Result;
use serde::Serialize;
use tracing::info;

use retmap_core::{CrossColor, MotionSchedule, PhaseChange, PhaseTracker, StimulusFrame};
use retmap_input::InputPoller;
use retmap_timing::{Clock, CountdownTimer, FrameIntervals};

use crate::config::{Modality, SessionConfig};
use crate::log::EventSink;

pub const READY_MESSAGE: &str = "Hit a key when ready.";
pub const SCANNER_MESSAGE: &str = "Waiting for the scanner...";

/// Keys the loop cares about; everything else maps to `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Escape,
    Q,
    /// Extra cancel key, honored in the wedge modality only.
    F,
    /// Scanner trigger keys.
    Num5,
    T,
    Other,
}

/// Source of keyboard-ish control events, drained once per frame.
pub trait ControlInput {
    fn poll(&mut self) -> Vec<Key>;
}

/// Debug overlay contents.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Overlay {
    pub fps: f64,
    /// 1-based phase index for display.
    pub phase: usize,
    pub phase_count: usize,
    pub elapsed_secs: f64,
}

/// Everything the renderer needs for one stimulation frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StimulusView {
    pub frame: StimulusFrame,
    pub cross_color: CrossColor,
    pub cross_angle_deg: f32,
    pub overlay: Option<Overlay>,
}

/// What to show this frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FrameView<'a> {
    Message(&'a str),
    /// Grid and fixation cross only (settling waits).
    Fixation,
    Stimulus(StimulusView),
}

/// Rendering collaborator. `present` blocks until the display's next
/// refresh slot; that call paces the loop.
pub trait Presenter {
    fn present(&mut self, view: &FrameView<'_>) -> Result<()>;
    /// Frames that missed their presentation deadline so far.
    fn dropped_frames(&self) -> u64;
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub total_secs: f64,
    pub phase_changes: Vec<PhaseChange>,
    pub phase_durations: Vec<f64>,
    pub mean_phase_secs: f64,
    pub dropped_frames: u64,
    pub cancelled: bool,
}

/// The sole driver of a run: gating wait, settling fixation, the timed
/// stimulation loop, and the closing settling fixation.
///
/// The poller is never called synchronously except to read its latest
/// snapshot; all stimulus and phase computation happens inside one loop
/// iteration, with `Presenter::present` as the only suspension point.
pub struct FrameLoop<C: Clock> {
    config: SessionConfig,
    clock: C,
    schedule: MotionSchedule,
    tracker: PhaseTracker,
    frames: FrameIntervals,
    cancelled: bool,
}

impl<C: Clock> FrameLoop<C> {
    pub fn new(config: SessionConfig, clock: C) -> Self {
        let schedule = config.schedule();
        let tracker = PhaseTracker::for_schedule(&schedule);
        Self {
            config,
            clock,
            schedule,
            tracker,
            frames: FrameIntervals::new(),
            cancelled: false,
        }
    }

    /// Per-frame deltas recorded so far; available even when `run`
    /// returned an error, so the artifact can still be persisted.
    pub fn frame_intervals(&self) -> &FrameIntervals {
        &self.frames
    }

    pub fn run(
        &mut self,
        presenter: &mut dyn Presenter,
        input: &mut dyn ControlInput,
        poller: Option<&InputPoller>,
        sink: &mut dyn EventSink,
    ) -> Result<RunSummary> {
        self.wait_ready(presenter, input)?;
        self.wait_trigger(presenter, input, poller, sink)?;

        // Settling fixation before the timing epoch begins.
        presenter.present(&FrameView::Fixation)?;
        self.clock.sleep(Duration::from_secs_f64(self.config.settle_secs));

        if !self.cancelled {
            self.stimulate(presenter, input, sink)?;
        } else {
            sink.record("cancelled before stimulation began");
        }

        // Settling fixation after the loop; runs on cancellation too.
        presenter.present(&FrameView::Fixation)?;
        self.clock.sleep(Duration::from_secs_f64(self.config.settle_secs));

        let dropped = presenter.dropped_frames();
        sink.record(&format!("overall, {dropped} frames were dropped"));

        Ok(RunSummary {
            total_secs: self.tracker.durations().iter().sum(),
            phase_changes: self.tracker.changes().to_vec(),
            phase_durations: self.tracker.durations().to_vec(),
            mean_phase_secs: self.tracker.mean_duration(),
            dropped_frames: dropped,
            cancelled: self.cancelled,
        })
    }

    /// Instruction screen until any key.
    fn wait_ready(
        &mut self,
        presenter: &mut dyn Presenter,
        input: &mut dyn ControlInput,
    ) -> Result<()> {
        loop {
            presenter.present(&FrameView::Message(READY_MESSAGE))?;
            if !input.poll().is_empty() {
                return Ok(());
            }
        }
    }

    /// Gating wait: block until the external start signal. With a button
    /// box attached the trigger channel going idle-to-active releases
    /// the wait; otherwise the `5`/`t` keys do. Decoupling this wait
    /// from the clock reset is what keeps the stimulus epoch aligned to
    /// the acquisition system.
    fn wait_trigger(
        &mut self,
        presenter: &mut dyn Presenter,
        input: &mut dyn ControlInput,
        poller: Option<&InputPoller>,
        sink: &mut dyn EventSink,
    ) -> Result<()> {
        sink.record("waiting for scanner trigger");
        loop {
            presenter.present(&FrameView::Message(SCANNER_MESSAGE))?;
            if let Some(p) = poller {
                if p.snapshot().trigger_active() {
                    sink.record("hardware trigger received");
                    return Ok(());
                }
            }
            for key in input.poll() {
                match key {
                    Key::Num5 | Key::T if poller.is_none() => {
                        sink.record("keyboard trigger received");
                        return Ok(());
                    }
                    k if self.is_cancel(k) => {
                        self.cancelled = true;
                        return Ok(());
                    }
                    _ => {}
                }
            }
        }
    }

    fn stimulate(
        &mut self,
        presenter: &mut dyn Presenter,
        input: &mut dyn ControlInput,
        sink: &mut dyn EventSink,
    ) -> Result<()> {
        let phase_count = self.tracker.phase_count();
        let total = Duration::from_secs_f64(self.schedule.total_secs());

        self.clock.reset();
        let countdown = CountdownTimer::start(self.clock.elapsed(), total);
        sink.record(&format!(
            "first phase 1/{phase_count} at {:.6} s",
            self.clock.elapsed_secs()
        ));

        let mut last_mark = self.clock.elapsed();
        let mut fps = 0.0;
        let mut last_fps_update = 0.0;

        loop {
            // Countdown expiry is checked before the cancel flag; see
            // DESIGN.md on the loop-condition ordering.
            if countdown.expired(self.clock.elapsed()) {
                break;
            }
            if self.cancelled {
                break;
            }
            let t = self.clock.elapsed_secs();

            let frame = self.schedule.sample(t);
            if let Some(change) = self.tracker.check(t) {
                sink.record(&format!(
                    "phase change {}/{phase_count} at {:.6} s",
                    change.index + 1,
                    change.at_secs
                ));
            }

            let overlay = if self.config.debug_overlay {
                if t - last_fps_update > self.config.fps_update_secs {
                    fps = self.frames.stats().effective_fps;
                    last_fps_update = t;
                }
                Some(Overlay {
                    fps,
                    phase: self.tracker.index() + 1,
                    phase_count,
                    elapsed_secs: t,
                })
            } else {
                None
            };

            let view = StimulusView {
                frame,
                cross_color: self.config.fixation.color_at(t),
                cross_angle_deg: self.config.fixation.angle_at(t),
                overlay,
            };
            presenter.present(&FrameView::Stimulus(view))?;

            for key in input.poll() {
                if self.is_cancel(key) {
                    // Honored at the top of the next iteration, after
                    // this frame's render has completed.
                    self.cancelled = true;
                }
            }

            let now = self.clock.elapsed();
            self.frames.record(now - last_mark);
            last_mark = now;
        }

        let t_end = self.clock.elapsed_secs();
        self.tracker.finish(t_end);
        sink.record(&format!("total time spent: {t_end:.6} s"));
        sink.record(&format!("phase durations: {:?}", self.tracker.durations()));
        sink.record(&format!(
            "mean phase duration: {:.6} s",
            self.tracker.mean_duration()
        ));
        info!(
            total_secs = t_end,
            cancelled = self.cancelled,
            "stimulation loop finished"
        );
        Ok(())
    }

    fn is_cancel(&self, key: Key) -> bool {
        match key {
            Key::Escape | Key::Q => true,
            Key::F => self.config.modality == Modality::Wedge,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use retmap_core::{RotationConfig, SweepConfig};
    use retmap_timing::ScriptedClock;
    use std::collections::VecDeque;

    const FRAME: f64 = 1.0 / 60.0;

    /// Advances the shared scripted clock by one frame interval per
    /// present, standing in for the display's vsync.
    struct FakePresenter {
        clock: ScriptedClock,
        stimulus_frames: usize,
        fixation_frames: usize,
    }

    impl FakePresenter {
        fn new(clock: ScriptedClock) -> Self {
            Self {
                clock,
                stimulus_frames: 0,
                fixation_frames: 0,
            }
        }
    }

    impl Presenter for FakePresenter {
        fn present(&mut self, view: &FrameView<'_>) -> Result<()> {
            match view {
                FrameView::Stimulus(_) => self.stimulus_frames += 1,
                FrameView::Fixation => self.fixation_frames += 1,
                FrameView::Message(_) => {}
            }
            self.clock.advance(Duration::from_secs_f64(FRAME));
            Ok(())
        }

        fn dropped_frames(&self) -> u64 {
            0
        }
    }

    /// Serves queued key batches first, then optionally a cancel key
    /// once the shared clock passes a threshold.
    struct ScriptedInput {
        queue: VecDeque<Vec<Key>>,
        cancel_at: Option<(f64, ScriptedClock)>,
    }

    impl ScriptedInput {
        fn start_sequence() -> Self {
            Self {
                queue: VecDeque::from([vec![Key::Other], vec![Key::Num5]]),
                cancel_at: None,
            }
        }

        fn with_cancel_at(mut self, secs: f64, clock: ScriptedClock) -> Self {
            self.cancel_at = Some((secs, clock));
            self
        }
    }

    impl ControlInput for ScriptedInput {
        fn poll(&mut self) -> Vec<Key> {
            if let Some(batch) = self.queue.pop_front() {
                return batch;
            }
            if let Some((at, clock)) = &self.cancel_at {
                if clock.elapsed_secs() >= *at {
                    self.cancel_at = None;
                    return vec![Key::Escape];
                }
            }
            Vec::new()
        }
    }

    #[derive(Default)]
    struct VecSink(Vec<String>);

    impl EventSink for VecSink {
        fn record(&mut self, msg: &str) {
            self.0.push(msg.to_string());
        }
    }

    fn short_sweep_config() -> SessionConfig {
        let mut config = SessionConfig::bars();
        config.sweep = SweepConfig {
            cycle_secs: 2.0,
            ..SweepConfig::default()
        };
        config.settle_secs = 1.0;
        config
    }

    #[test]
    fn sweep_run_logs_eight_phase_changes_near_ideal_boundaries() {
        let clock = ScriptedClock::new();
        let mut frame_loop = FrameLoop::new(short_sweep_config(), clock.clone());
        let mut presenter = FakePresenter::new(clock.clone());
        let mut input = ScriptedInput::start_sequence();
        let mut sink = VecSink::default();

        let summary = frame_loop
            .run(&mut presenter, &mut input, None, &mut sink)
            .unwrap();

        assert!(!summary.cancelled);
        assert_eq!(summary.phase_changes.len(), 8);
        for (i, change) in summary.phase_changes.iter().enumerate() {
            assert_eq!(change.index, i + 1);
            let ideal = (i as f64 + 1.0) * 2.0;
            assert!(
                (change.at_secs - ideal).abs() <= FRAME + 1e-9,
                "change {} at {} vs ideal {}",
                change.index,
                change.at_secs,
                ideal
            );
        }
        // Recorded phase durations account for the whole run.
        let sum: f64 = summary.phase_durations.iter().sum();
        assert!((sum - summary.total_secs).abs() < 1e-9);
        assert!((summary.total_secs - 16.0).abs() <= 2.0 * FRAME);
        assert!((summary.mean_phase_secs - summary.total_secs / 8.0).abs() < 1e-9);
    }

    #[test]
    fn rotation_run_logs_two_cycle_boundaries() {
        let clock = ScriptedClock::new();
        let mut config = SessionConfig::wedge();
        config.rotation = RotationConfig {
            cycles: 2,
            rotation_hz: 1.0 / 8.0,
            ..RotationConfig::default()
        };
        config.settle_secs = 1.0;
        let mut frame_loop = FrameLoop::new(config, clock.clone());
        let mut presenter = FakePresenter::new(clock.clone());
        let mut input = ScriptedInput::start_sequence();
        let mut sink = VecSink::default();

        let summary = frame_loop
            .run(&mut presenter, &mut input, None, &mut sink)
            .unwrap();

        assert_eq!(summary.phase_changes.len(), 2);
        assert!((summary.phase_changes[0].at_secs - 8.0).abs() <= FRAME + 1e-9);
        assert!((summary.phase_changes[1].at_secs - 16.0).abs() <= 2.0 * FRAME);
    }

    #[test]
    fn cancellation_mid_run_exits_after_current_frame_and_still_settles() {
        let clock = ScriptedClock::new();
        let mut frame_loop = FrameLoop::new(short_sweep_config(), clock.clone());
        let mut presenter = FakePresenter::new(clock.clone());
        let mut input = ScriptedInput::start_sequence().with_cancel_at(5.0, clock.clone());
        let mut sink = VecSink::default();

        let summary = frame_loop
            .run(&mut presenter, &mut input, None, &mut sink)
            .unwrap();

        assert!(summary.cancelled);
        // Exited right after the frame in which cancel arrived.
        assert!((summary.total_secs - 5.0).abs() <= 2.0 * FRAME);
        let frame_sum: f64 = frame_loop.frame_intervals().all().iter().sum();
        assert!(frame_sum <= summary.total_secs + 1e-9);
        // The post-stimulus settling wait still executed: the shared
        // clock has advanced a full settle period past loop exit.
        assert!(clock.elapsed_secs() >= summary.total_secs + 1.0 - 1e-9);
        // Both settling fixations were presented.
        assert_eq!(presenter.fixation_frames, 2);
    }

    #[test]
    fn f_key_cancels_only_the_wedge_modality() {
        let clock = ScriptedClock::new();
        let bars = FrameLoop::new(short_sweep_config(), clock.clone());
        assert!(!bars.is_cancel(Key::F));
        assert!(bars.is_cancel(Key::Escape));
        assert!(bars.is_cancel(Key::Q));

        let wedge = FrameLoop::new(SessionConfig::wedge(), clock);
        assert!(wedge.is_cancel(Key::F));
        assert!(!wedge.is_cancel(Key::T));
    }

    #[test]
    fn frame_intervals_match_the_presenter_pacing() {
        let clock = ScriptedClock::new();
        let mut frame_loop = FrameLoop::new(short_sweep_config(), clock.clone());
        let mut presenter = FakePresenter::new(clock.clone());
        let mut input = ScriptedInput::start_sequence();
        let mut sink = VecSink::default();

        frame_loop
            .run(&mut presenter, &mut input, None, &mut sink)
            .unwrap();

        let frames = frame_loop.frame_intervals();
        assert_eq!(frames.len(), presenter.stimulus_frames);
        let stats = frames.stats();
        assert!((stats.mean_secs - FRAME).abs() < 1e-9);
        assert_eq!(frames.overruns(FRAME), 0);
    }
}
