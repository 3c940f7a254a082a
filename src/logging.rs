use anyhow::Result;
use chrono::Local;
use fern::colors::{Color, ColoredLevelConfig};
use log::{debug, info, LevelFilter};
use std::io;

pub fn setup_logging(verbosity: u8, log_file: Option<&str>) -> Result<()> {
    let colors = ColoredLevelConfig::new()
        .error(Color::Red)
        .warn(Color::Yellow)
        .info(Color::Green)
        .debug(Color::Blue)
        .trace(Color::Magenta);

    let mut base_config = fern::Dispatch::new();

    base_config = match verbosity {
        0 => base_config.level(LevelFilter::Info),
        1 => base_config.level(LevelFilter::Debug),
        _ => base_config.level(LevelFilter::Trace),
    };

    // Separate file config so we can include year, month and day in file logs
    let file_config = fern::Dispatch::new().format(|out, message, record| {
        out.finish(format_args!(
            "{}[{}][{}] {}",
            Local::now().format("[%Y-%m-%d][%H:%M:%S%.3f]"),
            record.target(),
            record.level(),
            message
        ))
    });

    let stdout_config = fern::Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "{}[{}][{}] {}",
                Local::now().format("[%H:%M:%S%.3f]"),
                record.target(),
                colors.color(record.level()),
                message
            ))
        })
        .chain(io::stdout());

    base_config = base_config.chain(stdout_config);

    if let Some(log_file) = log_file {
        base_config = base_config.chain(file_config.chain(fern::log_file(log_file)?));
    }

    base_config.apply()?;

    info!("Logging system initialized");
    debug!("Debug logging enabled");

    Ok(())
}

pub fn log_app_start(version: &str) {
    info!("Starting Drift Recorder v{}", version);
}

pub fn log_app_config(config: &crate::config::Config) {
    info!("Application configured with:");
    info!("  Session:");
    info!("    Frames per container: {}", config.session.frames_per_container);
    info!("    Total containers: {}", config.session.total_containers);
    info!("    Rotation margin: {}", config.session.rotation_margin);
    info!("    Next frame timeout: {} ms", config.session.next_frame_timeout_ms);
    info!("  Geometry:");
    info!(
        "    Resolution: {}x{} ({} bytes per pixel, {} bytes per frame)",
        config.geometry.width,
        config.geometry.height,
        config.geometry.bytes_per_pixel,
        config.geometry.payload_size()
    );
    info!("  Output:");
    info!("    Save folder: {}", config.output.save_folder);
    info!("  Sources:");
    for source in &config.sources {
        match source.trigger_frames {
            Some(frames) => info!(
                "    {}: {} fps, trigger stops after {} frames",
                source.identifier, source.fps, frames
            ),
            None => info!("    {}: {} fps", source.identifier, source.fps),
        }
    }
}
