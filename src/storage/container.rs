use log::trace;
use serde::{Deserialize, Serialize};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::error::{CaptureError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContainerState {
    /// Created on disk, not yet receiving frames.
    Created,
    Active,
    /// Immutable from here on; belongs to whoever reads it back.
    Closed,
}

/// What remains known about a container once it is closed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSummary {
    pub index: u32,
    pub path: PathBuf,
    pub frames: u32,
    pub bytes_written: u64,
}

/// One rotating output file: a headerless run of fixed-size frame payloads.
pub struct Container<W: Write> {
    index: u32,
    path: PathBuf,
    writer: Option<W>,
    bytes_written: u64,
    frames: u32,
    state: ContainerState,
}

impl<W: Write> Container<W> {
    pub fn new(index: u32, path: PathBuf, writer: W) -> Self {
        Self {
            index,
            path,
            writer: Some(writer),
            bytes_written: 0,
            frames: 0,
            state: ContainerState::Created,
        }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn frames(&self) -> u32 {
        self.frames
    }

    pub fn state(&self) -> ContainerState {
        self.state
    }

    pub fn activate(&mut self) {
        if self.state == ContainerState::Created {
            self.state = ContainerState::Active;
        }
    }

    /// Appends one whole payload. On any error, including a short write, the
    /// bytes that did land still count towards `bytes_written` and the
    /// container stops accepting frames.
    pub fn write(&mut self, payload: &[u8]) -> Result<()> {
        if self.state != ContainerState::Active {
            return Err(CaptureError::storage(
                &self.path,
                format!("container is {:?}, not active", self.state),
            ));
        }
        let writer = self.writer.as_mut().ok_or_else(|| {
            CaptureError::storage(&self.path, "container handle already released")
        })?;

        let mut landed = 0;
        let outcome = write_counted(writer, payload, &mut landed);
        self.bytes_written += landed as u64;
        if let Err(e) = outcome {
            self.state = ContainerState::Closed;
            return Err(CaptureError::storage(&self.path, e));
        }

        self.frames += 1;
        trace!(
            "Container {} now holds {} frames ({} bytes)",
            self.index,
            self.frames,
            self.bytes_written
        );
        Ok(())
    }

    /// Flushes and releases the handle. Closing twice is a no-op.
    pub fn close(&mut self) -> Result<()> {
        self.state = ContainerState::Closed;
        match self.writer.take() {
            Some(mut writer) => writer
                .flush()
                .map_err(|e| CaptureError::storage(&self.path, e)),
            None => Ok(()),
        }
    }

    pub fn summary(&self) -> ContainerSummary {
        ContainerSummary {
            index: self.index,
            path: self.path.clone(),
            frames: self.frames,
            bytes_written: self.bytes_written,
        }
    }
}

/// `write_all`, but reporting how much of `payload` was accepted before a
/// failure.
fn write_counted<W: Write>(writer: &mut W, payload: &[u8], landed: &mut usize) -> io::Result<()> {
    while *landed < payload.len() {
        match writer.write(&payload[*landed..]) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    format!("short write: {} of {} bytes", landed, payload.len()),
                ))
            }
            Ok(n) => *landed += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingWriter {
        data: Vec<u8>,
        flushes: usize,
        accept: usize,
    }

    impl Write for CountingWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let n = buf.len().min(self.accept);
            self.accept -= n;
            self.data.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            self.flushes += 1;
            Ok(())
        }
    }

    fn writer(accept: usize) -> CountingWriter {
        CountingWriter {
            data: Vec::new(),
            flushes: 0,
            accept,
        }
    }

    #[test]
    fn test_write_requires_activation() {
        let mut container = Container::new(0, PathBuf::from("c0.raw"), writer(usize::MAX));
        assert!(container.write(&[1, 2]).is_err());
        container.activate();
        container.write(&[1, 2]).unwrap();
        container.write(&[3, 4]).unwrap();
        assert_eq!(container.frames(), 2);
        assert_eq!(container.bytes_written(), 4);
    }

    #[test]
    fn test_short_write_is_storage_failure() {
        let mut container = Container::new(3, PathBuf::from("c3.raw"), writer(3));
        container.activate();
        container.write(&[0; 2]).unwrap();
        let err = container.write(&[0; 2]).unwrap_err();
        assert!(matches!(err, CaptureError::StorageWriteFailed { .. }));
        assert_eq!(container.frames(), 1);
        // the partial frame is on disk and must be accounted for
        assert_eq!(container.bytes_written(), 3);
        assert_eq!(container.summary().bytes_written, 3);
        assert_eq!(container.state(), ContainerState::Closed);
        assert!(container.write(&[0; 2]).is_err());
    }

    #[test]
    fn test_failed_write_still_releases_handle() {
        struct Broken {
            flushes: usize,
        }
        impl Write for Broken {
            fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::Other, "disk gone"))
            }
            fn flush(&mut self) -> io::Result<()> {
                self.flushes += 1;
                Ok(())
            }
        }

        let mut container = Container::new(1, PathBuf::from("c1.raw"), Broken { flushes: 0 });
        container.activate();
        assert!(container.write(&[7; 4]).is_err());
        assert_eq!(container.bytes_written(), 0);
        assert_eq!(container.frames(), 0);
        container.close().unwrap();
        assert_eq!(container.state(), ContainerState::Closed);
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut container = Container::new(0, PathBuf::from("c0.raw"), writer(usize::MAX));
        container.activate();
        container.write(&[9; 4]).unwrap();
        container.close().unwrap();
        container.close().unwrap();
        assert_eq!(container.state(), ContainerState::Closed);
        assert!(container.write(&[9; 4]).is_err());
    }

    #[test]
    fn test_close_flushes_once() {
        use std::cell::RefCell;
        use std::rc::Rc;

        struct Shared(Rc<RefCell<CountingWriter>>);
        impl Write for Shared {
            fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
                self.0.borrow_mut().write(buf)
            }
            fn flush(&mut self) -> io::Result<()> {
                self.0.borrow_mut().flush()
            }
        }

        let inner = Rc::new(RefCell::new(writer(usize::MAX)));
        let mut container = Container::new(0, PathBuf::from("c0.raw"), Shared(Rc::clone(&inner)));
        container.activate();
        container.close().unwrap();
        container.close().unwrap();
        assert_eq!(inner.borrow().flushes, 1);
    }
}
