//! A library for recording triggered frame streams into rotating raw
//! container files.
//!
//! This library provides functionality for:
//! - Acquiring frames from a triggered source until the trigger goes quiet
//! - Rotating fixed-size containers with a pre-opened successor
//! - Logging per-frame metadata that correlates with container byte offsets
//! - Reading finished sessions back, exporting frames and encoding video

pub mod acquisition;
pub mod cli;
pub mod config;
pub mod consumer;
pub mod error;
pub mod frame;
pub mod logging;
pub mod metadata;
pub mod storage;

pub use acquisition::{
    run_sessions, AcquisitionController, ExitReason, SessionReport, SessionState, SessionSummary,
};
pub use config::{Config, SessionConfig};
pub use consumer::{encode_container, extract_frames, ContainerReader, VideoSaver};
pub use error::{CaptureError, Result};
pub use frame::{ChannelSource, Frame, FrameGeometry, FrameSource, NextFrame, SyntheticSource};
pub use metadata::{read_metadata_log, MetadataLog, MetadataRecord};
pub use storage::{FsStorage, RotationManager, StorageBackend};

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the library
///
/// Sets up logging and announces the version. Call it once, before any
/// session is started.
///
/// # Arguments
///
/// * `verbosity` - 0 for info, 1 for debug, anything higher for trace
/// * `log_file` - Optional path to a log file. If None, logs will only be output to stdout.
pub fn initialize(verbosity: u8, log_file: Option<&str>) -> anyhow::Result<()> {
    logging::setup_logging(verbosity, log_file)?;
    logging::log_app_start(VERSION);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty(), "Version should not be empty");
    }
}
