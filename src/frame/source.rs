use crossbeam_channel::{Receiver, RecvTimeoutError};
use log::debug;
use std::time::Duration;

use super::types::Frame;
use crate::error::Result;

/// Outcome of a single bounded wait on a frame source.
#[derive(Debug)]
pub enum NextFrame {
    Frame(Frame),
    /// Nothing arrived within the timeout; for a triggered sensor this means
    /// the trigger signal is gone.
    Timeout,
    /// The device failed and will not deliver further frames.
    Fatal(String),
}

/// The narrow contract the acquisition controller needs from a device.
///
/// `begin` and `end` bracket the session. `end` is called exactly once for
/// every `begin`, including when `begin` itself failed, so implementations
/// must tolerate ending an acquisition that never started.
pub trait FrameSource {
    fn begin(&mut self) -> Result<()>;

    fn next_frame(&mut self, timeout: Duration) -> NextFrame;

    fn end(&mut self) -> Result<()>;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn begin(&mut self) -> Result<()> {
        (**self).begin()
    }

    fn next_frame(&mut self, timeout: Duration) -> NextFrame {
        (**self).next_frame(timeout)
    }

    fn end(&mut self) -> Result<()> {
        (**self).end()
    }
}

/// Adapts a producer thread that pushes frames into a channel.
pub struct ChannelSource {
    receiver: Receiver<Frame>,
}

impl ChannelSource {
    pub fn new(receiver: Receiver<Frame>) -> Self {
        Self { receiver }
    }
}

impl FrameSource for ChannelSource {
    fn begin(&mut self) -> Result<()> {
        debug!("Channel source ready, {} frames queued", self.receiver.len());
        Ok(())
    }

    fn next_frame(&mut self, timeout: Duration) -> NextFrame {
        match self.receiver.recv_timeout(timeout) {
            Ok(frame) => NextFrame::Frame(frame),
            Err(RecvTimeoutError::Timeout) => NextFrame::Timeout,
            Err(RecvTimeoutError::Disconnected) => {
                NextFrame::Fatal("frame producer disconnected".to_string())
            }
        }
    }

    fn end(&mut self) -> Result<()> {
        Ok(())
    }
}
