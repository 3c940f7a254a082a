//! The capture state machine and what it reports back.

mod controller;
mod report;
mod runner;

pub use controller::{AcquisitionController, WARMUP_FRAMES};
pub use report::{ExitReason, SessionReport, SessionState, SessionSummary};
pub use runner::run_sessions;
