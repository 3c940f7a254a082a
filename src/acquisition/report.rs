use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::SessionConfig;
use crate::error::{CaptureError, Result};
use crate::frame::FrameGeometry;
use crate::storage::ContainerSummary;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Initializing,
    Warmup,
    Recording,
    /// Successor container pre-opened, active one not yet full.
    Rotating,
    TriggerLost,
    Stopping,
    Terminated,
}

#[derive(Debug)]
pub enum ExitReason {
    /// Every container of the session target was filled.
    Completed,
    /// The trigger went quiet; what was recorded is valid.
    TriggerLost,
    Failed(CaptureError),
}

impl ExitReason {
    pub fn is_fatal(&self) -> bool {
        matches!(self, ExitReason::Failed(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            ExitReason::Completed => "Completed",
            ExitReason::TriggerLost => "TriggerLost",
            ExitReason::Failed(e) => e.kind(),
        }
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::Completed => write!(f, "completed"),
            ExitReason::TriggerLost => write!(f, "trigger lost"),
            ExitReason::Failed(e) => write!(f, "failed: {}", e),
        }
    }
}

/// What the caller gets back from a session, whatever way it ended.
#[derive(Debug)]
pub struct SessionReport {
    pub source_identifier: String,
    pub started_at: DateTime<Local>,
    pub frames_written: u64,
    pub containers: Vec<ContainerSummary>,
    pub metadata_path: Option<PathBuf>,
    pub exit: ExitReason,
    /// Every state the controller passed through, in order.
    pub states: Vec<SessionState>,
}

impl SessionReport {
    pub fn final_state(&self) -> Option<SessionState> {
        self.states.last().copied()
    }

    pub fn containers_closed(&self) -> usize {
        self.containers.len()
    }

    pub fn bytes_written(&self) -> u64 {
        self.containers.iter().map(|c| c.bytes_written).sum()
    }
}

/// On-disk record of a finished session, read back by the post-hoc tools.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub source_identifier: String,
    pub started_at: String,
    pub geometry: FrameGeometry,
    pub frames_per_container: u32,
    pub total_containers: u32,
    pub rotation_margin: u32,
    pub frames_written: u64,
    pub containers: Vec<ContainerSummary>,
    pub metadata_log: Option<PathBuf>,
    pub exit_reason: String,
    pub error: Option<String>,
}

impl SessionSummary {
    pub fn new(report: &SessionReport, config: &SessionConfig) -> Self {
        Self {
            source_identifier: report.source_identifier.clone(),
            started_at: report.started_at.to_rfc3339(),
            geometry: config.geometry,
            frames_per_container: config.frames_per_container,
            total_containers: config.total_containers,
            rotation_margin: config.rotation_margin,
            frames_written: report.frames_written,
            containers: report.containers.clone(),
            metadata_log: report.metadata_path.clone(),
            exit_reason: report.exit.name().to_string(),
            error: match &report.exit {
                ExitReason::Failed(e) => Some(e.to_string()),
                _ => None,
            },
        }
    }

    pub fn file_name(source_identifier: &str) -> String {
        format!("{}_session.json", source_identifier)
    }

    pub fn write(&self, directory: &Path) -> Result<PathBuf> {
        let path = directory.join(Self::file_name(&self.source_identifier));
        let json = serde_json::to_string_pretty(self)?;
        fs::write(&path, json).map_err(|e| CaptureError::storage(&path, e))?;
        Ok(path)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}
