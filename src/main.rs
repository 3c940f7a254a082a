use drift_recorder::{
    acquisition::{run_sessions, SessionSummary},
    cli::{CliArgs, Command, ConvertArgs, ExtractArgs, RecordArgs},
    config::Config,
    consumer::{encode_container, extract_frames, ContainerReader},
    frame::SyntheticSource,
    logging,
};

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info, warn};
use std::path::{Path, PathBuf};

fn main() -> Result<()> {
    // Parse command-line arguments
    let cli_args = CliArgs::parse();

    // Setup logging
    logging::setup_logging(cli_args.verbose, cli_args.log_file.as_deref())?;
    logging::log_app_start(env!("CARGO_PKG_VERSION"));

    match &cli_args.command {
        Command::Record(args) => record(args),
        Command::Convert(args) => convert(args),
        Command::Extract(args) => extract(args),
    }
}

fn record(args: &RecordArgs) -> Result<()> {
    // Load configuration
    let config = Config::load(args)?;
    logging::log_app_config(&config);

    let sessions: Vec<_> = config
        .session_configs()
        .into_iter()
        .zip(&config.sources)
        .map(|(session, source)| {
            let frame_source = SyntheticSource::new(&source.identifier, config.geometry, source.fps)
                .with_trigger_frames(source.trigger_frames)
                .with_buffer_frames(source.buffer_frames);
            (session, frame_source)
        })
        .collect();
    let session_configs: Vec<_> = sessions.iter().map(|(session, _)| session.clone()).collect();

    info!("Starting {} acquisition sessions", sessions.len());
    let results = run_sessions(sessions);

    let mut failures = 0;
    for (session, result) in session_configs.iter().zip(results) {
        match result {
            Ok(report) => {
                if report.exit.is_fatal() {
                    error!("Session {} ended with {}", report.source_identifier, report.exit);
                    failures += 1;
                }
                let summary = SessionSummary::new(&report, session);
                let path = summary.write(&session.save_folder).with_context(|| {
                    format!("Failed to write summary for {}", session.source_identifier)
                })?;
                info!("Session summary saved to {}", path.display());
            }
            Err(e) => {
                error!("Session {} did not run: {}", session.source_identifier, e);
                failures += 1;
            }
        }
    }

    if failures > 0 {
        return Err(anyhow::anyhow!("{} of {} sessions failed", failures, session_configs.len()));
    }

    info!("All sessions finished, application shutting down");
    Ok(())
}

/// Containers are looked up where they were recorded, falling back to the
/// summary's own folder when the session was moved.
fn resolve_container(summary_path: &Path, recorded: &Path) -> PathBuf {
    if recorded.exists() {
        return recorded.to_path_buf();
    }
    match (summary_path.parent(), recorded.file_name()) {
        (Some(dir), Some(name)) => dir.join(name),
        _ => recorded.to_path_buf(),
    }
}

fn convert(args: &ConvertArgs) -> Result<()> {
    let summary = SessionSummary::load(&args.summary)
        .with_context(|| format!("Failed to load session summary {}", args.summary.display()))?;
    let output_dir = match &args.output {
        Some(dir) => dir.clone(),
        None => args.summary.parent().map(Path::to_path_buf).unwrap_or_default(),
    };
    std::fs::create_dir_all(&output_dir)
        .with_context(|| format!("Failed to create output folder {}", output_dir.display()))?;

    for container in &summary.containers {
        if container.frames == 0 {
            warn!("Skipping empty container {}", container.path.display());
            continue;
        }
        let path = resolve_container(&args.summary, &container.path);
        let mut reader = ContainerReader::open(&path, summary.geometry)
            .with_context(|| format!("Failed to open container {}", path.display()))?;

        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("container{}", container.index));
        let video_path = output_dir.join(format!("{}.mp4", stem));
        let frames = encode_container(&mut reader, args.fps, &video_path)?;
        info!("Encoded {} frames into {}", frames, video_path.display());
    }

    Ok(())
}

fn extract(args: &ExtractArgs) -> Result<()> {
    let summary = SessionSummary::load(&args.summary)
        .with_context(|| format!("Failed to load session summary {}", args.summary.display()))?;

    let mut total = 0;
    for container in &summary.containers {
        let path = resolve_container(&args.summary, &container.path);
        let mut reader = ContainerReader::open(&path, summary.geometry)
            .with_context(|| format!("Failed to open container {}", path.display()))?;
        total += extract_frames(&mut reader, &args.output, args.every)?;
    }

    info!("Extracted {} frames into {}", total, args.output.display());
    Ok(())
}
