pub mod config;
pub mod log;
pub mod run;

pub use config::{Modality, ParticipantInfo, SessionConfig};
pub use log::{create_out_folder, write_frame_durations, EventSink, NullSink, SessionLog};
pub use run::{
    ControlInput, FrameLoop, FrameView, Key, Overlay, Presenter, RunSummary, StimulusView,
    READY_MESSAGE, SCANNER_MESSAGE,
};
