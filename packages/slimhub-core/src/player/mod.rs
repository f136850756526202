//! Per-player leaf models: volume and gain mapping, the graphic display,
//! the infrared remote table and visualiser parameter blocks.

mod display;
mod remote;
mod visualisation;
mod volume;

pub use display::{Display, Transition, DISPLAY_HEIGHT, DISPLAY_WIDTH, FRAME_BYTES};
pub use remote::RemoteButton;
pub use visualisation::{
    Bandwidth, ChannelMode, Clipping, Orientation, SpectrumAnalyser, SpectrumChannel,
    Visualisation,
};
pub use volume::{Volume, OLD_GAIN_MAP};
