use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Also write logs to this file
    #[arg(long, global = true)]
    pub log_file: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Record every configured source into rotating container files
    Record(RecordArgs),
    /// Encode the containers of a finished session to MP4 with ffmpeg
    Convert(ConvertArgs),
    /// Export every n-th frame of a finished session as PNG
    Extract(ExtractArgs),
}

#[derive(Args, Debug, Default)]
pub struct RecordArgs {
    #[arg(long)]
    pub config: Option<String>,

    #[arg(long)]
    pub frames_per_container: Option<u32>,

    #[arg(long)]
    pub total_containers: Option<u32>,

    #[arg(long)]
    pub rotation_margin: Option<u32>,

    #[arg(long)]
    pub timeout_ms: Option<u64>,

    #[arg(long)]
    pub width: Option<u32>,

    #[arg(long)]
    pub height: Option<u32>,

    #[arg(long)]
    pub bytes_per_pixel: Option<u32>,

    /// Frame rate applied to every source
    #[arg(long)]
    pub fps: Option<f32>,

    /// Stop triggering every source after this many frames
    #[arg(long)]
    pub trigger_frames: Option<u64>,

    #[arg(long)]
    pub save_folder: Option<String>,
}

#[derive(Args, Debug)]
pub struct ConvertArgs {
    /// Session summary written by `record`
    pub summary: PathBuf,

    #[arg(long, default_value_t = 25.0)]
    pub fps: f32,

    /// Output folder, defaults to the folder holding the summary
    #[arg(long)]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct ExtractArgs {
    /// Session summary written by `record`
    pub summary: PathBuf,

    #[arg(long, default_value_t = 10)]
    pub every: u64,

    #[arg(long, default_value = "frames")]
    pub output: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_record_overrides() {
        let args = CliArgs::parse_from([
            "drift_recorder",
            "-vv",
            "record",
            "--frames-per-container",
            "500",
            "--fps",
            "120",
            "--save-folder",
            "/data",
        ]);
        assert_eq!(args.verbose, 2);
        match args.command {
            Command::Record(record) => {
                assert_eq!(record.frames_per_container, Some(500));
                assert_eq!(record.fps, Some(120.0));
                assert_eq!(record.save_folder.as_deref(), Some("/data"));
                assert!(record.total_containers.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_extract_defaults() {
        let args = CliArgs::parse_from(["drift_recorder", "extract", "out/cam0_session.json"]);
        match args.command {
            Command::Extract(extract) => {
                assert_eq!(extract.every, 10);
                assert_eq!(extract.output, PathBuf::from("frames"));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
