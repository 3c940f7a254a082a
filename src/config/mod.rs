mod loader;
mod session;

pub use loader::{Config, OutputConfig, SessionSettings, SourceConfig, DEFAULT_CONFIG_PATH};
pub use session::SessionConfig;
