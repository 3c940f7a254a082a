use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use log::{debug, info, warn};
use rand::Rng;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::source::{FrameSource, NextFrame};
use super::types::{Frame, FrameGeometry};
use crate::error::{CaptureError, Result};

/// Simulates an externally triggered sensor.
///
/// A producer thread emits frames at a fixed rate into a bounded queue, the
/// way a camera fills its acquisition buffers. When the queue is full the
/// frame is lost and counted, as a device buffer overrun would be. With a
/// trigger budget the producer goes quiet after that many frames, which the
/// consumer observes as a timeout.
pub struct SyntheticSource {
    name: String,
    geometry: FrameGeometry,
    fps: f32,
    trigger_frames: Option<u64>,
    buffer_frames: usize,
    receiver: Option<Receiver<Frame>>,
    stop: Arc<AtomicBool>,
    dropped: Arc<AtomicU64>,
    producer: Option<JoinHandle<()>>,
}

impl SyntheticSource {
    pub fn new(name: &str, geometry: FrameGeometry, fps: f32) -> Self {
        Self {
            name: name.to_string(),
            geometry,
            fps,
            trigger_frames: None,
            buffer_frames: 64,
            receiver: None,
            stop: Arc::new(AtomicBool::new(false)),
            dropped: Arc::new(AtomicU64::new(0)),
            producer: None,
        }
    }

    pub fn with_trigger_frames(mut self, trigger_frames: Option<u64>) -> Self {
        self.trigger_frames = trigger_frames;
        self
    }

    pub fn with_buffer_frames(mut self, buffer_frames: usize) -> Self {
        self.buffer_frames = buffer_frames.max(1);
        self
    }

    /// Frames the producer had to discard because the queue was full.
    pub fn dropped_frames(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

fn produce(
    sender: Sender<Frame>,
    payload_size: usize,
    period: Duration,
    trigger_frames: Option<u64>,
    stop: Arc<AtomicBool>,
    dropped: Arc<AtomicU64>,
) {
    let start = Instant::now();
    let mut next_due = start;
    let mut rng = rand::thread_rng();
    let mut sequence_id = 0u64;

    while !stop.load(Ordering::Relaxed) {
        if trigger_frames.is_some_and(|limit| sequence_id >= limit) {
            debug!("Trigger budget of {} frames exhausted", sequence_id);
            break;
        }

        let now = Instant::now();
        if now < next_due {
            thread::sleep(next_due - now);
        }
        next_due += period;

        let mut payload = vec![0u8; payload_size];
        rng.fill(&mut payload[..]);
        let timestamp = start.elapsed().as_nanos() as u64;

        match sender.try_send(Frame::new(sequence_id, timestamp, payload)) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                dropped.fetch_add(1, Ordering::Relaxed);
            }
            Err(TrySendError::Disconnected(_)) => return,
        }
        sequence_id += 1;
    }

    // Hold the sender open so a silent trigger reads as a timeout, not a
    // disconnected device.
    while !stop.load(Ordering::Relaxed) {
        thread::sleep(Duration::from_millis(5));
    }
}

impl FrameSource for SyntheticSource {
    fn begin(&mut self) -> Result<()> {
        if self.producer.is_some() {
            return Err(CaptureError::source_unavailable(format!(
                "acquisition already running on {}",
                self.name
            )));
        }
        if !(self.fps > 0.0) {
            return Err(CaptureError::source_unavailable(format!(
                "{} has no usable frame rate ({})",
                self.name, self.fps
            )));
        }

        let (sender, receiver) = bounded(self.buffer_frames);
        let payload_size = self.geometry.payload_size();
        let period = Duration::try_from_secs_f64(1.0 / f64::from(self.fps)).map_err(|e| {
            CaptureError::source_unavailable(format!(
                "{} cannot pace frames at {} fps: {}",
                self.name, self.fps, e
            ))
        })?;
        let trigger_frames = self.trigger_frames;
        let stop = Arc::clone(&self.stop);
        let dropped = Arc::clone(&self.dropped);
        stop.store(false, Ordering::Relaxed);

        let producer = thread::Builder::new()
            .name(format!("{}-trigger", self.name))
            .spawn(move || produce(sender, payload_size, period, trigger_frames, stop, dropped))
            .map_err(|e| CaptureError::source_unavailable(e.to_string()))?;

        info!(
            "Started synthetic acquisition on {} at {} fps ({} byte frames)",
            self.name, self.fps, payload_size
        );
        self.receiver = Some(receiver);
        self.producer = Some(producer);
        Ok(())
    }

    fn next_frame(&mut self, timeout: Duration) -> NextFrame {
        let Some(receiver) = self.receiver.as_ref() else {
            return NextFrame::Fatal(format!("acquisition not started on {}", self.name));
        };
        match receiver.recv_timeout(timeout) {
            Ok(frame) => NextFrame::Frame(frame),
            Err(RecvTimeoutError::Timeout) => NextFrame::Timeout,
            Err(RecvTimeoutError::Disconnected) => {
                NextFrame::Fatal(format!("producer thread of {} stopped", self.name))
            }
        }
    }

    fn end(&mut self) -> Result<()> {
        self.stop.store(true, Ordering::Relaxed);
        self.receiver = None;
        if let Some(producer) = self.producer.take() {
            producer.join().map_err(|_| {
                CaptureError::fatal_source(format!("{} producer panicked", self.name))
            })?;
            let dropped = self.dropped_frames();
            if dropped > 0 {
                warn!("{} dropped {} frames on buffer overrun", self.name, dropped);
            }
            info!("Stopped synthetic acquisition on {}", self.name);
        }
        Ok(())
    }
}

impl Drop for SyntheticSource {
    fn drop(&mut self) {
        if let Err(e) = self.end() {
            log::error!("Failed to stop acquisition on source drop {:?}", e);
        }
    }
}
