use crossbeam::channel::unbounded;
use log::{error, info};

use super::controller::AcquisitionController;
use super::report::SessionReport;
use crate::config::SessionConfig;
use crate::error::{CaptureError, Result};
use crate::frame::FrameSource;

/// Runs one independent session per source, each on its own thread, and
/// returns their outcomes in the order the sessions were given.
///
/// Sessions share nothing but possibly the destination folder; their files
/// are namespaced by source identifier.
pub fn run_sessions<S>(sessions: Vec<(SessionConfig, S)>) -> Vec<Result<SessionReport>>
where
    S: FrameSource + Send,
{
    let count = sessions.len();
    let mut results: Vec<Option<Result<SessionReport>>> = (0..count).map(|_| None).collect();
    let (report_sender, report_receiver) = unbounded::<(usize, Result<SessionReport>)>();

    let scope_result = crossbeam::thread::scope(|scope| {
        for (position, (config, source)) in sessions.into_iter().enumerate() {
            let report_sender = report_sender.clone();
            scope.spawn(move |_| {
                let outcome = AcquisitionController::new(config, source).map(|c| c.run());
                if let Err(e) = report_sender.send((position, outcome)) {
                    error!("Failed to hand session report back: {}", e);
                }
            });
        }
        drop(report_sender);

        for (position, outcome) in report_receiver.iter() {
            match &outcome {
                Ok(report) => info!(
                    "Session {} finished ({}): {} frames in {} containers",
                    report.source_identifier,
                    report.exit,
                    report.frames_written,
                    report.containers_closed()
                ),
                Err(e) => error!("Session {} could not start: {}", position, e),
            }
            results[position] = Some(outcome);
        }
    });

    if scope_result.is_err() {
        error!("At least one session thread panicked");
    }

    results
        .into_iter()
        .map(|slot| {
            slot.unwrap_or_else(|| Err(CaptureError::fatal_source("session thread panicked")))
        })
        .collect()
}
