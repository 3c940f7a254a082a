mod source;
mod synthetic;
mod types;

pub use source::{ChannelSource, FrameSource, NextFrame};
pub use synthetic::SyntheticSource;
pub use types::{Frame, FrameGeometry};
