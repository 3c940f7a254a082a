use serde::{Deserialize, Serialize};

/// One fixed-size unit of sensor data as delivered by a frame source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub sequence_id: u64,
    /// Capture time in nanoseconds since an arbitrary, source-defined epoch.
    pub timestamp: u64,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(sequence_id: u64, timestamp: u64, payload: Vec<u8>) -> Self {
        Self {
            sequence_id,
            timestamp,
            payload,
        }
    }

    pub fn payload_size(&self) -> usize {
        self.payload.len()
    }
}

/// Frame geometry is never stored in the containers, so every reader of a
/// container needs this alongside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameGeometry {
    pub width: u32,
    pub height: u32,
    #[serde(default = "default_bytes_per_pixel")]
    pub bytes_per_pixel: u32,
}

fn default_bytes_per_pixel() -> u32 {
    1
}

impl Default for FrameGeometry {
    fn default() -> Self {
        Self {
            width: 1440,
            height: 1080,
            bytes_per_pixel: 1,
        }
    }
}

impl FrameGeometry {
    pub fn new(width: u32, height: u32, bytes_per_pixel: u32) -> Self {
        Self {
            width,
            height,
            bytes_per_pixel,
        }
    }

    pub fn payload_size(&self) -> usize {
        self.width as usize * self.height as usize * self.bytes_per_pixel as usize
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.width == 0 || self.height == 0 {
            return Err("Width and height must be greater than 0".to_string());
        }
        if self.bytes_per_pixel == 0 {
            return Err("Bytes per pixel must be greater than 0".to_string());
        }
        Ok(())
    }
}
