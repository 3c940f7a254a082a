use anyhow::{Context, Result};
use log::{debug, error, info};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};

use super::reader::ContainerReader;
use crate::frame::FrameGeometry;

pub fn pixel_format(bytes_per_pixel: u32) -> Option<&'static str> {
    match bytes_per_pixel {
        1 => Some("gray"),
        2 => Some("gray16le"),
        3 => Some("rgb24"),
        _ => None,
    }
}

pub fn ffmpeg_args(geometry: FrameGeometry, fps: f32, output_path: &Path) -> Result<Vec<String>> {
    let pixel_format = pixel_format(geometry.bytes_per_pixel).with_context(|| {
        format!(
            "No ffmpeg pixel format for {} bytes per pixel",
            geometry.bytes_per_pixel
        )
    })?;

    Ok(vec![
        "-f".to_string(),
        "rawvideo".to_string(),
        "-pixel_format".to_string(),
        pixel_format.to_string(),
        "-video_size".to_string(),
        format!("{}x{}", geometry.width, geometry.height),
        "-framerate".to_string(),
        fps.to_string(),
        "-i".to_string(),
        "-".to_string(),
        "-c:v".to_string(),
        "libx264".to_string(),
        "-preset".to_string(),
        "ultrafast".to_string(),
        "-y".to_string(),
        output_path.to_string_lossy().into_owned(),
    ])
}

/// Pipes raw frames into an ffmpeg child process.
pub struct VideoSaver {
    ffmpeg_process: Option<Child>,
    output_path: PathBuf,
    frames: u64,
}

impl VideoSaver {
    pub fn new(geometry: FrameGeometry, fps: f32, output_path: &Path) -> Result<Self> {
        let args = ffmpeg_args(geometry, fps, output_path)?;
        let ffmpeg_process = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .context("Failed to start ffmpeg process")?;

        info!("Started ffmpeg process for {}", output_path.display());

        Ok(Self {
            ffmpeg_process: Some(ffmpeg_process),
            output_path: output_path.to_path_buf(),
            frames: 0,
        })
    }

    pub fn write_frame(&mut self, payload: &[u8]) -> Result<()> {
        let stdin = self
            .ffmpeg_process
            .as_mut()
            .and_then(|process| process.stdin.as_mut())
            .context("Failed to get stdin of ffmpeg process")?;

        stdin
            .write_all(payload)
            .context("Failed to write frame data to ffmpeg")?;

        debug!("Wrote frame {} to video", self.frames);
        self.frames += 1;

        Ok(())
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn finalize(mut self) -> Result<()> {
        let mut process = self
            .ffmpeg_process
            .take()
            .context("ffmpeg process already finalized")?;

        // Close stdin to signal end of input to ffmpeg
        drop(process.stdin.take());

        let output = process
            .wait_with_output()
            .context("Failed to wait for ffmpeg process")?;

        if output.status.success() {
            info!(
                "Saved {} frames to {}",
                self.frames,
                self.output_path.display()
            );
            Ok(())
        } else {
            let error_message = String::from_utf8_lossy(&output.stderr);
            error!("FFmpeg error: {}", error_message);
            Err(anyhow::anyhow!("FFmpeg process failed"))
        }
    }
}

impl Drop for VideoSaver {
    fn drop(&mut self) {
        if let Some(mut process) = self.ffmpeg_process.take() {
            if let Err(e) = process.kill() {
                error!("Failed to kill ffmpeg process: {}", e);
            }
            let _ = process.wait();
        }
    }
}

/// Encodes every whole frame of a container into a video file.
pub fn encode_container(reader: &mut ContainerReader, fps: f32, output_path: &Path) -> Result<u64> {
    let mut saver = VideoSaver::new(reader.geometry(), fps, output_path)?;
    for payload in reader.frames() {
        let payload = payload.context("Failed to read frame from container")?;
        saver.write_frame(&payload)?;
    }
    let frames = saver.frames();
    saver.finalize()?;
    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_formats() {
        assert_eq!(pixel_format(1), Some("gray"));
        assert_eq!(pixel_format(2), Some("gray16le"));
        assert_eq!(pixel_format(3), Some("rgb24"));
        assert_eq!(pixel_format(4), None);
    }

    #[test]
    fn test_ffmpeg_args() {
        let args = ffmpeg_args(
            FrameGeometry::new(1440, 1080, 1),
            25.0,
            Path::new("out/cam0_file0.mp4"),
        )
        .unwrap();
        assert_eq!(args[3], "gray");
        assert_eq!(args[5], "1440x1080");
        assert_eq!(args[7], "25");
        assert_eq!(args.last().unwrap(), "out/cam0_file0.mp4");

        assert!(ffmpeg_args(FrameGeometry::new(4, 4, 4), 25.0, Path::new("x.mp4")).is_err());
    }
}
