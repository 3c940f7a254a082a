use anyhow::{Context, Result};
use log::{info, warn};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use super::session::SessionConfig;
use crate::cli::RecordArgs;
use crate::frame::FrameGeometry;

pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub session: SessionSettings,
    pub geometry: FrameGeometry,
    pub output: OutputConfig,
    pub sources: Vec<SourceConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionSettings {
    pub frames_per_container: u32,
    pub total_containers: u32,
    #[serde(default = "default_rotation_margin")]
    pub rotation_margin: u32,
    #[serde(default = "default_timeout_ms")]
    pub next_frame_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    pub save_folder: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub identifier: String,
    #[serde(default = "default_fps")]
    pub fps: f32,
    #[serde(default)]
    pub trigger_frames: Option<u64>,
    #[serde(default = "default_buffer_frames")]
    pub buffer_frames: usize,
}

fn default_rotation_margin() -> u32 {
    50
}

fn default_timeout_ms() -> u64 {
    1000
}

fn default_fps() -> f32 {
    100.0
}

fn default_buffer_frames() -> usize {
    64
}

impl Default for Config {
    fn default() -> Self {
        let session = SessionConfig::default();
        Self {
            session: SessionSettings {
                frames_per_container: session.frames_per_container,
                total_containers: session.total_containers,
                rotation_margin: session.rotation_margin,
                next_frame_timeout_ms: session.next_frame_timeout_ms,
            },
            geometry: session.geometry,
            output: OutputConfig {
                save_folder: session.save_folder.to_string_lossy().into_owned(),
            },
            sources: vec![SourceConfig {
                identifier: session.source_identifier,
                fps: default_fps(),
                trigger_frames: None,
                buffer_frames: default_buffer_frames(),
            }],
        }
    }
}

impl Config {
    pub fn load(cli_args: &RecordArgs) -> Result<Self> {
        let mut config = match cli_args.config.as_deref() {
            Some(path) => Self::from_file(Path::new(path))?,
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_PATH))?
            }
            None => {
                info!("No configuration file given, using built-in defaults");
                Self::default()
            }
        };

        // Override config with CLI arguments
        config.override_with_cli_args(cli_args);

        config.validate()?;
        config.ensure_save_folder()?;

        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        info!("Loading configuration from {}", path.display());

        let config_str = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    fn override_with_cli_args(&mut self, args: &RecordArgs) {
        if let Some(frames_per_container) = args.frames_per_container {
            self.session.frames_per_container = frames_per_container;
        }
        if let Some(total_containers) = args.total_containers {
            self.session.total_containers = total_containers;
        }
        if let Some(rotation_margin) = args.rotation_margin {
            self.session.rotation_margin = rotation_margin;
        }
        if let Some(timeout_ms) = args.timeout_ms {
            self.session.next_frame_timeout_ms = timeout_ms;
        }

        if let Some(width) = args.width {
            self.geometry.width = width;
        }
        if let Some(height) = args.height {
            self.geometry.height = height;
        }
        if let Some(bytes_per_pixel) = args.bytes_per_pixel {
            self.geometry.bytes_per_pixel = bytes_per_pixel;
        }

        for source in self.sources.iter_mut() {
            if let Some(fps) = args.fps {
                source.fps = fps;
            }
            if args.trigger_frames.is_some() {
                source.trigger_frames = args.trigger_frames;
            }
        }

        if let Some(save_folder) = &args.save_folder {
            self.output.save_folder = save_folder.clone();
        }
    }

    /// One session per configured source; each is validated on its own.
    pub fn session_configs(&self) -> Vec<SessionConfig> {
        self.sources
            .iter()
            .map(|source| {
                SessionConfig::new()
                    .with_source_identifier(&source.identifier)
                    .with_containers(
                        self.session.frames_per_container,
                        self.session.total_containers,
                    )
                    .with_rotation_margin(self.session.rotation_margin)
                    .with_timeout(std::time::Duration::from_millis(
                        self.session.next_frame_timeout_ms,
                    ))
                    .with_save_folder(&self.save_folder())
                    .with_geometry(self.geometry)
            })
            .collect()
    }

    pub fn save_folder(&self) -> PathBuf {
        PathBuf::from(&self.output.save_folder)
    }

    pub fn validate(&self) -> Result<()> {
        if self.sources.is_empty() {
            return Err(anyhow::anyhow!("At least one source must be configured"));
        }

        let mut seen = HashSet::new();
        for source in &self.sources {
            if !seen.insert(source.identifier.as_str()) {
                return Err(anyhow::anyhow!(
                    "Source identifier {} is configured twice; its files would collide",
                    source.identifier
                ));
            }
            if source.fps <= 0.0 {
                return Err(anyhow::anyhow!(
                    "FPS of source {} must be greater than 0",
                    source.identifier
                ));
            }
        }

        for session in self.session_configs() {
            session.validate().with_context(|| {
                format!("Invalid session for source {}", session.source_identifier)
            })?;
        }

        if self.output.save_folder.is_empty() {
            return Err(anyhow::anyhow!("Save folder cannot be empty"));
        }

        Ok(())
    }

    fn ensure_save_folder(&self) -> Result<()> {
        let save_folder = Path::new(&self.output.save_folder);
        if !save_folder.exists() {
            warn!("Save folder does not exist. Creating it.");
            fs::create_dir_all(save_folder).with_context(|| {
                format!("Failed to create save folder: {}", self.output.save_folder)
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[session]
frames_per_container = 2000
total_containers = 5

[geometry]
width = 1440
height = 1080

[output]
save_folder = "recordings"

[[sources]]
identifier = "21187335"
fps = 150.0

[[sources]]
identifier = "21187336"
trigger_frames = 9000
buffer_frames = 128
"#;

    #[test]
    fn test_parse_sample_with_defaults() {
        let config: Config = toml::from_str(SAMPLE).unwrap();
        assert_eq!(config.session.rotation_margin, 50);
        assert_eq!(config.session.next_frame_timeout_ms, 1000);
        assert_eq!(config.geometry.bytes_per_pixel, 1);
        assert_eq!(config.sources.len(), 2);
        assert_eq!(config.sources[1].fps, 100.0);
        assert_eq!(config.sources[1].trigger_frames, Some(9000));
        assert!(config.validate().is_ok());

        let sessions = config.session_configs();
        assert_eq!(sessions[0].source_identifier, "21187335");
        assert_eq!(sessions[1].frames_per_container, 2000);
        assert_eq!(sessions[1].save_folder, PathBuf::from("recordings"));
    }

    #[test]
    fn test_cli_overrides_apply() {
        let mut config: Config = toml::from_str(SAMPLE).unwrap();
        let args = RecordArgs {
            rotation_margin: Some(20),
            fps: Some(60.0),
            save_folder: Some("elsewhere".to_string()),
            ..Default::default()
        };
        config.override_with_cli_args(&args);
        assert_eq!(config.session.rotation_margin, 20);
        assert_eq!(config.session.frames_per_container, 2000);
        assert!(config.sources.iter().all(|s| s.fps == 60.0));
        assert_eq!(config.sources[1].trigger_frames, Some(9000));
        assert_eq!(config.output.save_folder, "elsewhere");
    }

    #[test]
    fn test_duplicate_sources_rejected() {
        let mut config = Config::default();
        config.sources.push(config.sources[0].clone());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_margin_not_below_container_size_rejected() {
        let mut config = Config::default();
        config.session.frames_per_container = 40;
        config.session.rotation_margin = 40;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_creates_save_folder() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("rec.toml");
        let save_folder = dir.path().join("nested").join("out");
        fs::write(&config_path, SAMPLE).unwrap();

        let args = RecordArgs {
            config: Some(config_path.to_string_lossy().into_owned()),
            save_folder: Some(save_folder.to_string_lossy().into_owned()),
            ..Default::default()
        };
        let config = Config::load(&args).unwrap();
        assert!(save_folder.is_dir());
        assert_eq!(config.sources.len(), 2);
    }
}
