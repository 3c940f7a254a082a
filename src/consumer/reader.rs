use image::{GrayImage, ImageBuffer};
use log::{info, warn};
use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::error::{CaptureError, Result};
use crate::frame::FrameGeometry;

/// Random access to the frames of a closed container.
///
/// A trailing partial frame, left behind when a write failed mid-frame, is
/// ignored rather than treated as an error.
pub struct ContainerReader {
    path: PathBuf,
    file: File,
    geometry: FrameGeometry,
    len: u64,
}

impl ContainerReader {
    pub fn open(path: &Path, geometry: FrameGeometry) -> Result<Self> {
        geometry.validate().map_err(CaptureError::ConfigurationInvalid)?;
        let file = File::open(path)?;
        let len = file.metadata()?.len();

        let reader = Self {
            path: path.to_path_buf(),
            file,
            geometry,
            len,
        };
        if reader.trailing_bytes() > 0 {
            warn!(
                "{} ends with a partial frame of {} bytes; it will be ignored",
                path.display(),
                reader.trailing_bytes()
            );
        }
        Ok(reader)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn geometry(&self) -> FrameGeometry {
        self.geometry
    }

    fn payload_size(&self) -> u64 {
        self.geometry.payload_size() as u64
    }

    pub fn frame_count(&self) -> u64 {
        self.len / self.payload_size()
    }

    pub fn trailing_bytes(&self) -> u64 {
        self.len % self.payload_size()
    }

    pub fn read_frame(&mut self, k: u64) -> Result<Vec<u8>> {
        if k >= self.frame_count() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "frame {} requested but {} holds {} frames",
                    k,
                    self.path.display(),
                    self.frame_count()
                ),
            )
            .into());
        }
        let mut payload = vec![0u8; self.geometry.payload_size()];
        self.file.seek(SeekFrom::Start(k * self.payload_size()))?;
        self.file.read_exact(&mut payload)?;
        Ok(payload)
    }

    pub fn frames(&mut self) -> impl Iterator<Item = Result<Vec<u8>>> + '_ {
        (0..self.frame_count()).map(move |k| self.read_frame(k))
    }

    /// Only single-byte (mono 8-bit) geometries map onto a grayscale image.
    pub fn frame_image(&mut self, k: u64) -> Result<GrayImage> {
        if self.geometry.bytes_per_pixel != 1 {
            return Err(CaptureError::configuration(format!(
                "cannot build an 8-bit image from {} bytes per pixel",
                self.geometry.bytes_per_pixel
            )));
        }
        let payload = self.read_frame(k)?;
        ImageBuffer::from_raw(self.geometry.width, self.geometry.height, payload).ok_or_else(|| {
            CaptureError::configuration("frame payload does not match image dimensions")
        })
    }
}

/// Writes every `every`-th frame of the container as a PNG into `out_dir`.
/// Returns how many images were written.
pub fn extract_frames(reader: &mut ContainerReader, out_dir: &Path, every: u64) -> Result<u64> {
    fs::create_dir_all(out_dir)?;
    let stem = reader
        .path()
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "container".to_string());

    let mut written = 0;
    for k in (0..reader.frame_count()).step_by(every.max(1) as usize) {
        let image = reader.frame_image(k)?;
        let path = out_dir.join(format!("{}_frame{:06}.png", stem, k));
        image
            .save(&path)
            .map_err(|e| CaptureError::storage(&path, e))?;
        written += 1;
    }

    info!(
        "Extracted {} of {} frames from {}",
        written,
        reader.frame_count(),
        reader.path().display()
    );
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn container(dir: &Path, frames: &[u8], extra: &[u8]) -> PathBuf {
        let path = dir.join("cam0_file0.raw");
        let mut bytes = Vec::new();
        for value in frames {
            bytes.extend(std::iter::repeat(*value).take(6));
        }
        bytes.extend_from_slice(extra);
        fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn test_reads_frames_at_offsets() {
        let dir = tempfile::tempdir().unwrap();
        let path = container(dir.path(), &[10, 20, 30], &[]);
        let mut reader = ContainerReader::open(&path, FrameGeometry::new(3, 2, 1)).unwrap();

        assert_eq!(reader.frame_count(), 3);
        assert_eq!(reader.trailing_bytes(), 0);
        assert_eq!(reader.read_frame(1).unwrap(), vec![20; 6]);
        assert!(reader.read_frame(3).is_err());

        let all: Vec<Vec<u8>> = reader.frames().collect::<Result<_>>().unwrap();
        assert_eq!(all, vec![vec![10; 6], vec![20; 6], vec![30; 6]]);
    }

    #[test]
    fn test_trailing_partial_frame_is_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let path = container(dir.path(), &[1, 2], &[9, 9, 9]);
        let mut reader = ContainerReader::open(&path, FrameGeometry::new(3, 2, 1)).unwrap();

        assert_eq!(reader.frame_count(), 2);
        assert_eq!(reader.trailing_bytes(), 3);
        assert_eq!(reader.frames().count(), 2);
    }

    #[test]
    fn test_frame_image_and_extract() {
        let dir = tempfile::tempdir().unwrap();
        let path = container(dir.path(), &[0, 50, 100, 150, 200], &[]);
        let mut reader = ContainerReader::open(&path, FrameGeometry::new(3, 2, 1)).unwrap();

        let image = reader.frame_image(2).unwrap();
        assert_eq!(image.dimensions(), (3, 2));
        assert_eq!(image.get_pixel(1, 1).0, [100]);

        let out = dir.path().join("png");
        assert_eq!(extract_frames(&mut reader, &out, 2).unwrap(), 3);
        assert!(out.join("cam0_file0_frame000004.png").exists());
    }

    #[test]
    fn test_frame_image_rejects_multibyte_pixels() {
        let dir = tempfile::tempdir().unwrap();
        let path = container(dir.path(), &[1, 2], &[]);
        let mut reader = ContainerReader::open(&path, FrameGeometry::new(3, 1, 2)).unwrap();
        assert!(reader.frame_image(0).is_err());
    }
}
