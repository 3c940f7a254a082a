mod container;
mod rotation;

pub use container::{Container, ContainerState, ContainerSummary};
pub use rotation::{container_file_name, RotationManager};

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

/// Where container bytes end up.
pub trait StorageBackend {
    type Writer: Write;

    fn create(&mut self, path: &Path) -> io::Result<Self::Writer>;
}

/// Plain files, written unbuffered so each frame reaches the OS before its
/// metadata line does. An existing file is never reopened; it belongs to an
/// earlier session.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsStorage;

impl StorageBackend for FsStorage {
    type Writer = File;

    fn create(&mut self, path: &Path) -> io::Result<File> {
        OpenOptions::new().write(true).create_new(true).open(path)
    }
}
