mod args;

pub use args::{CliArgs, Command, ConvertArgs, ExtractArgs, RecordArgs};
