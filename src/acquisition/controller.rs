use chrono::{DateTime, Local};
use log::{debug, error, info, trace, warn};
use std::time::Instant;

use super::report::{ExitReason, SessionReport, SessionState};
use crate::config::SessionConfig;
use crate::error::{CaptureError, Result};
use crate::frame::{Frame, FrameSource, NextFrame};
use crate::metadata::{log_file_name, MetadataLog, MetadataRecord};
use crate::storage::{FsStorage, RotationManager, StorageBackend};

/// Leading frames thrown away after acquisition starts; triggered sensors
/// deliver a corrupted first frame.
pub const WARMUP_FRAMES: u32 = 1;

enum Outcome {
    Completed,
    TriggerLost,
}

/// Drives one session: pulls frames from a single source, writes them into
/// rotating containers and logs each one, then releases everything exactly
/// once however the session ends.
pub struct AcquisitionController<S: FrameSource, B: StorageBackend = FsStorage> {
    config: SessionConfig,
    source: S,
    rotation: RotationManager<B>,
    log: Option<MetadataLog>,
    started_at: DateTime<Local>,
    source_started: bool,
    frames_written: u64,
    states: Vec<SessionState>,
}

impl<S: FrameSource> AcquisitionController<S, FsStorage> {
    pub fn new(config: SessionConfig, source: S) -> Result<Self> {
        Self::with_backend(config, source, FsStorage)
    }
}

impl<S: FrameSource, B: StorageBackend> AcquisitionController<S, B> {
    /// Rejects an invalid configuration before touching storage or the source.
    pub fn with_backend(config: SessionConfig, source: S, backend: B) -> Result<Self> {
        config.validate()?;
        let rotation = RotationManager::new(
            backend,
            &config.save_folder,
            &config.source_identifier,
            config.total_containers,
        );

        Ok(Self {
            config,
            source,
            rotation,
            log: None,
            started_at: Local::now(),
            source_started: false,
            frames_written: 0,
            states: vec![SessionState::Initializing],
        })
    }

    pub fn state(&self) -> SessionState {
        self.states
            .last()
            .copied()
            .unwrap_or(SessionState::Initializing)
    }

    pub fn run(mut self) -> SessionReport {
        let timer = Instant::now();
        info!(
            "Starting session for {}: {} containers of {} frames",
            self.config.source_identifier,
            self.config.total_containers,
            self.config.frames_per_container
        );

        let exit = match self.acquire() {
            Ok(Outcome::Completed) => ExitReason::Completed,
            Ok(Outcome::TriggerLost) => ExitReason::TriggerLost,
            Err(e) => {
                error!("Session for {} aborted: {}", self.config.source_identifier, e);
                ExitReason::Failed(e)
            }
        };
        let exit = self.stop(exit);
        self.transition(SessionState::Terminated);

        info!(
            "Session for {} ended ({}) after {:?}: {} frames in {} containers",
            self.config.source_identifier,
            exit,
            timer.elapsed(),
            self.frames_written,
            self.rotation.containers().len()
        );

        SessionReport {
            source_identifier: self.config.source_identifier.clone(),
            started_at: self.started_at,
            frames_written: self.frames_written,
            containers: self.rotation.containers().to_vec(),
            metadata_path: self.log.as_ref().map(|log| log.path().to_path_buf()),
            exit,
            states: std::mem::take(&mut self.states),
        }
    }

    fn transition(&mut self, next: SessionState) {
        let current = self.state();
        if current != next {
            debug!("{}: {:?} -> {:?}", self.config.source_identifier, current, next);
            self.states.push(next);
        }
    }

    fn acquire(&mut self) -> Result<Outcome> {
        self.initialize()?;

        self.source_started = true;
        self.source.begin().map_err(|e| match e {
            CaptureError::SourceUnavailable(_) => e,
            other => CaptureError::source_unavailable(other.to_string()),
        })?;

        self.transition(SessionState::Warmup);
        if let Some(outcome) = self.warmup()? {
            return Ok(outcome);
        }

        self.transition(SessionState::Recording);
        self.record()
    }

    fn initialize(&mut self) -> Result<()> {
        let log_path = self.config.save_folder.join(log_file_name(
            &self.config.source_identifier,
            &self.started_at,
        ));
        self.log = Some(MetadataLog::create(&log_path)?);

        self.rotation.open_next(0)?;
        self.rotation.switch()?;
        Ok(())
    }

    fn warmup(&mut self) -> Result<Option<Outcome>> {
        let timeout = self.config.next_frame_timeout();
        for _ in 0..WARMUP_FRAMES {
            match self.source.next_frame(timeout) {
                NextFrame::Frame(frame) => {
                    debug!("Discarded warm-up frame {}", frame.sequence_id);
                }
                NextFrame::Timeout => return self.trigger_lost().map(Some),
                NextFrame::Fatal(reason) => return Err(CaptureError::fatal_source(reason)),
            }
        }
        Ok(None)
    }

    fn record(&mut self) -> Result<Outcome> {
        let timeout = self.config.next_frame_timeout();
        let frames_per_container = self.config.frames_per_container;
        let rotation_point = self.config.rotation_point();
        let total_containers = self.config.total_containers;

        loop {
            let frame = match self.source.next_frame(timeout) {
                NextFrame::Frame(frame) => frame,
                NextFrame::Timeout => return self.trigger_lost(),
                NextFrame::Fatal(reason) => return Err(CaptureError::fatal_source(reason)),
            };
            let active = self.accept(frame)?;

            let written = self.rotation.active_frames();
            let has_successor = active + 1 < total_containers;

            if written == rotation_point && has_successor {
                self.transition(SessionState::Rotating);
                self.rotation.open_next(active + 1)?;
            }

            if written == frames_per_container {
                if !has_successor {
                    return Ok(Outcome::Completed);
                }
                self.rotation.switch()?;
                self.transition(SessionState::Recording);
            }
        }
    }

    /// Writes the payload, then its metadata record. Returns the index of the
    /// container that received it.
    fn accept(&mut self, frame: Frame) -> Result<u32> {
        let expected = self.config.payload_size();
        if frame.payload_size() != expected {
            return Err(CaptureError::fatal_source(format!(
                "frame {} carries {} bytes, expected {}",
                frame.sequence_id,
                frame.payload_size(),
                expected
            )));
        }

        let container_index = self.rotation.active_index().ok_or_else(|| {
            CaptureError::storage(self.rotation.directory(), "no active container")
        })?;
        self.rotation.write(&frame.payload)?;

        let log = self.log.as_mut().ok_or_else(|| {
            CaptureError::storage(&self.config.save_folder, "metadata log not open")
        })?;
        log.append(&MetadataRecord {
            sequence_id: frame.sequence_id,
            timestamp: frame.timestamp,
            source_identifier: self.config.source_identifier.clone(),
            container_index,
        })?;

        self.frames_written += 1;
        trace!(
            "Frame {} stored in container {}",
            frame.sequence_id,
            container_index
        );
        Ok(container_index)
    }

    fn trigger_lost(&mut self) -> Result<Outcome> {
        self.transition(SessionState::TriggerLost);
        warn!(
            "Trigger signal disconnected. Stopped recording for {} after {} frames",
            self.config.source_identifier, self.frames_written
        );
        self.close_outputs()?;
        Ok(Outcome::TriggerLost)
    }

    /// Attempts every close even when an earlier one fails.
    fn close_outputs(&mut self) -> Result<()> {
        let containers = self.rotation.close_all();
        let log = match self.log.as_mut() {
            Some(log) => log.close(),
            None => Ok(()),
        };
        containers.and(log)
    }

    fn stop(&mut self, exit: ExitReason) -> ExitReason {
        self.transition(SessionState::Stopping);
        let mut exit = exit;

        if let Err(e) = self.close_outputs() {
            error!(
                "Failed to close outputs of {}: {}",
                self.config.source_identifier, e
            );
            if !exit.is_fatal() {
                exit = ExitReason::Failed(e);
            }
        }

        if self.source_started {
            self.source_started = false;
            if let Err(e) = self.source.end() {
                error!(
                    "Failed to end acquisition on {}: {}",
                    self.config.source_identifier, e
                );
            }
        }

        exit
    }
}
