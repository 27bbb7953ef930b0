pub mod clock;
pub mod countdown;
pub mod frames;
pub mod sleep;

pub use clock::{Clock, MonotonicClock, ScriptedClock};
pub use countdown::CountdownTimer;
pub use frames::{FrameIntervals, FrameStats};
pub use sleep::precise_sleep;
