use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{CaptureError, Result};
use crate::frame::FrameGeometry;

/// Everything one acquisition session needs, for exactly one frame source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub source_identifier: String,
    pub frames_per_container: u32,
    pub total_containers: u32,
    pub rotation_margin: u32,
    pub next_frame_timeout_ms: u64,
    pub save_folder: PathBuf,
    pub geometry: FrameGeometry,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            source_identifier: "cam0".to_string(),
            frames_per_container: 1000,
            total_containers: 10,
            rotation_margin: 50,
            next_frame_timeout_ms: 1000,
            save_folder: PathBuf::from("output"),
            geometry: FrameGeometry::default(),
        }
    }
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source_identifier(mut self, source_identifier: &str) -> Self {
        self.source_identifier = source_identifier.to_string();
        self
    }

    pub fn with_containers(mut self, frames_per_container: u32, total_containers: u32) -> Self {
        self.frames_per_container = frames_per_container;
        self.total_containers = total_containers;
        self
    }

    pub fn with_rotation_margin(mut self, rotation_margin: u32) -> Self {
        self.rotation_margin = rotation_margin;
        self
    }

    /// The timeout is kept in whole milliseconds, rounded up so that a
    /// non-zero wait never becomes zero.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        let millis = timeout.as_nanos().div_ceil(1_000_000);
        self.next_frame_timeout_ms = u64::try_from(millis).unwrap_or(u64::MAX);
        self
    }

    pub fn with_save_folder(mut self, save_folder: &Path) -> Self {
        self.save_folder = save_folder.to_path_buf();
        self
    }

    pub fn with_geometry(mut self, geometry: FrameGeometry) -> Self {
        self.geometry = geometry;
        self
    }

    pub fn next_frame_timeout(&self) -> Duration {
        Duration::from_millis(self.next_frame_timeout_ms)
    }

    pub fn payload_size(&self) -> usize {
        self.geometry.payload_size()
    }

    /// Frame count in the active container at which its successor is opened.
    pub fn rotation_point(&self) -> u32 {
        self.frames_per_container.saturating_sub(self.rotation_margin)
    }

    pub fn max_frames(&self) -> u64 {
        u64::from(self.frames_per_container) * u64::from(self.total_containers)
    }

    pub fn validate(&self) -> Result<()> {
        if self.source_identifier.is_empty() {
            return Err(CaptureError::configuration("Source identifier cannot be empty"));
        }
        if !self
            .source_identifier
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(CaptureError::configuration(format!(
                "Source identifier {:?} may only contain letters, digits, '-' and '_'",
                self.source_identifier
            )));
        }
        if self.frames_per_container == 0 {
            return Err(CaptureError::configuration(
                "Frames per container must be greater than 0",
            ));
        }
        if self.total_containers == 0 {
            return Err(CaptureError::configuration(
                "Total containers must be greater than 0",
            ));
        }
        if self.rotation_margin >= self.frames_per_container {
            return Err(CaptureError::configuration(format!(
                "Rotation margin ({}) must be smaller than frames per container ({})",
                self.rotation_margin, self.frames_per_container
            )));
        }
        if self.next_frame_timeout_ms == 0 {
            return Err(CaptureError::configuration(
                "Next frame timeout must be greater than 0",
            ));
        }
        self.geometry
            .validate()
            .map_err(CaptureError::ConfigurationInvalid)?;
        Ok(())
    }
}
