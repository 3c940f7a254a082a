//! Post-hoc tools over a finished session: reading containers back,
//! exporting frames and encoding video.

mod reader;
mod video;

pub use crate::metadata::read_metadata_log;
pub use reader::{extract_frames, ContainerReader};
pub use video::{encode_container, ffmpeg_args, pixel_format, VideoSaver};
