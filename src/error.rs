use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Invalid configuration: {0}")]
    ConfigurationInvalid(String),

    #[error("Frame source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Fatal frame source error: {0}")]
    FatalSource(String),

    #[error("Storage write failed for {}: {reason}", path.display())]
    StorageWriteFailed { path: PathBuf, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CaptureError>;

// Helper functions for creating errors
impl CaptureError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        CaptureError::ConfigurationInvalid(msg.into())
    }

    pub fn source_unavailable(msg: impl Into<String>) -> Self {
        CaptureError::SourceUnavailable(msg.into())
    }

    pub fn fatal_source(msg: impl Into<String>) -> Self {
        CaptureError::FatalSource(msg.into())
    }

    pub fn storage(path: &Path, reason: impl ToString) -> Self {
        CaptureError::StorageWriteFailed {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }

    /// Short, stable name of the error kind, used in session summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            CaptureError::ConfigurationInvalid(_) => "ConfigurationInvalid",
            CaptureError::SourceUnavailable(_) => "SourceUnavailable",
            CaptureError::FatalSource(_) => "FatalSourceError",
            CaptureError::StorageWriteFailed { .. } => "StorageWriteFailed",
            CaptureError::Io(_) => "Io",
            CaptureError::Serialization(_) => "Serialization",
        }
    }
}
