pub mod device;
pub mod poller;

pub use device::{
    polarity_mask, Button, DeviceError, DinDevice, DinTransition, SimulatedDevice, BUTTON_COUNT,
};
pub use poller::{ButtonSnapshot, ButtonState, InputPoller};
