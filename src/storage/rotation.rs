use log::{debug, error, info, warn};
use std::io;
use std::path::{Path, PathBuf};

use super::container::{Container, ContainerSummary};
use super::StorageBackend;
use crate::error::{CaptureError, Result};

/// Container files sort in index order: the index is zero-padded to the
/// width of the session's container count.
pub fn container_file_name(source_identifier: &str, index: u32, total_containers: u32) -> String {
    let width = total_containers.max(1).to_string().len();
    format!("{}_file{:0width$}.raw", source_identifier, index, width = width)
}

/// Owns the active container and at most one pre-opened successor.
pub struct RotationManager<B: StorageBackend> {
    backend: B,
    directory: PathBuf,
    source_identifier: String,
    total_containers: u32,
    active: Option<Container<B::Writer>>,
    pending: Option<Container<B::Writer>>,
    closed: Vec<ContainerSummary>,
}

impl<B: StorageBackend> RotationManager<B> {
    pub fn new(
        backend: B,
        directory: &Path,
        source_identifier: &str,
        total_containers: u32,
    ) -> Self {
        Self {
            backend,
            directory: directory.to_path_buf(),
            source_identifier: source_identifier.to_string(),
            total_containers,
            active: None,
            pending: None,
            closed: Vec::new(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn container_path(&self, index: u32) -> PathBuf {
        self.directory.join(container_file_name(
            &self.source_identifier,
            index,
            self.total_containers,
        ))
    }

    /// Creates container `index` and holds it ready without routing writes to it.
    pub fn open_next(&mut self, index: u32) -> Result<()> {
        if index >= self.total_containers {
            return Err(CaptureError::configuration(format!(
                "container {} is beyond the session target of {}",
                index, self.total_containers
            )));
        }
        if let Some(pending) = &self.pending {
            return Err(CaptureError::storage(
                pending.path(),
                "a pre-opened container is already waiting",
            ));
        }

        let path = self.container_path(index);
        let writer = self.backend.create(&path).map_err(|e| {
            if e.kind() == io::ErrorKind::AlreadyExists {
                warn!("Refusing to overwrite existing container {}", path.display());
                CaptureError::storage(&path, "container already exists from an earlier session")
            } else {
                CaptureError::storage(&path, e)
            }
        })?;

        debug!("Pre-opened container {} at {}", index, path.display());
        self.pending = Some(Container::new(index, path, writer));
        Ok(())
    }

    /// Closes the active container (if any) and starts routing writes to the
    /// pre-opened one. Returns the index of the new active container.
    pub fn switch(&mut self) -> Result<u32> {
        let mut next = self.pending.take().ok_or_else(|| {
            CaptureError::storage(&self.directory, "no pre-opened container to switch to")
        })?;

        if let Some(mut previous) = self.active.take() {
            let result = previous.close();
            info!(
                "Closed container {} with {} frames",
                previous.index(),
                previous.frames()
            );
            self.closed.push(previous.summary());
            if let Err(e) = result {
                self.pending = Some(next);
                return Err(e);
            }
        }

        next.activate();
        let index = next.index();
        info!("Saving frames to container {}/{}", index + 1, self.total_containers);
        self.active = Some(next);
        Ok(index)
    }

    pub fn write(&mut self, payload: &[u8]) -> Result<()> {
        match self.active.as_mut() {
            Some(container) => container.write(payload),
            None => Err(CaptureError::storage(&self.directory, "no active container")),
        }
    }

    pub fn active_index(&self) -> Option<u32> {
        self.active.as_ref().map(|c| c.index())
    }

    pub fn active_frames(&self) -> u32 {
        self.active.as_ref().map_or(0, |c| c.frames())
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Closes every open container. Safe to call repeatedly; every container
    /// is attempted even if an earlier close fails, and the first failure is
    /// returned.
    pub fn close_all(&mut self) -> Result<()> {
        let mut first_error = None;
        for mut container in [self.active.take(), self.pending.take()].into_iter().flatten() {
            if let Err(e) = container.close() {
                first_error.get_or_insert(e);
            }
            if container.frames() == 0 {
                debug!("Container {} closed empty", container.index());
            }
            self.closed.push(container.summary());
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Summaries of all closed containers, in the order they were closed.
    pub fn containers(&self) -> &[ContainerSummary] {
        &self.closed
    }
}

impl<B: StorageBackend> Drop for RotationManager<B> {
    fn drop(&mut self) {
        if let Err(e) = self.close_all() {
            error!("Failed to close containers on drop {:?}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::testing::{RecordingStorage, StorageEvent};
    use crate::storage::FsStorage;

    #[test]
    fn test_container_file_name_padding() {
        assert_eq!(container_file_name("cam0", 3, 5), "cam0_file3.raw");
        assert_eq!(container_file_name("cam0", 3, 10), "cam0_file03.raw");
        assert_eq!(container_file_name("cam0", 42, 250), "cam0_file042.raw");
        assert_eq!(container_file_name("cam0", 0, 0), "cam0_file0.raw");
    }

    #[test]
    fn test_rotation_cycle_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = RotationManager::new(FsStorage, dir.path(), "cam0", 2);

        manager.open_next(0).unwrap();
        assert_eq!(manager.switch().unwrap(), 0);
        manager.write(&[1; 8]).unwrap();
        manager.open_next(1).unwrap();
        assert!(manager.has_pending());
        manager.write(&[2; 8]).unwrap();
        assert_eq!(manager.switch().unwrap(), 1);
        manager.write(&[3; 8]).unwrap();
        manager.close_all().unwrap();
        manager.close_all().unwrap();

        let summaries = manager.containers();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].frames, 2);
        assert_eq!(summaries[1].frames, 1);
        assert_eq!(std::fs::read(&summaries[0].path).unwrap(), [[1u8; 8], [2u8; 8]].concat());
        assert_eq!(std::fs::read(&summaries[1].path).unwrap(), vec![3u8; 8]);
    }

    #[test]
    fn test_open_next_rejects_index_past_target() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = RotationManager::new(FsStorage, dir.path(), "cam0", 1);
        assert!(matches!(
            manager.open_next(1),
            Err(CaptureError::ConfigurationInvalid(_))
        ));
    }

    #[test]
    fn test_open_next_unwritable_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("does").join("not").join("exist");
        let mut manager = RotationManager::new(FsStorage, &missing, "cam0", 1);
        assert!(matches!(
            manager.open_next(0),
            Err(CaptureError::StorageWriteFailed { .. })
        ));
    }

    #[test]
    fn test_open_next_never_overwrites_existing_container() {
        let dir = tempfile::tempdir().unwrap();
        let existing = dir.path().join("cam0_file0.raw");
        std::fs::write(&existing, [0xAA; 8]).unwrap();

        let mut manager = RotationManager::new(FsStorage, dir.path(), "cam0", 2);
        assert!(matches!(
            manager.open_next(0),
            Err(CaptureError::StorageWriteFailed { .. })
        ));
        assert!(!manager.has_pending());
        assert_eq!(std::fs::read(&existing).unwrap(), vec![0xAA; 8]);
    }

    #[test]
    fn test_switch_without_pending_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = RotationManager::new(FsStorage, dir.path(), "cam0", 1);
        assert!(manager.switch().is_err());
        assert!(manager.write(&[0; 4]).is_err());
    }

    #[test]
    fn test_close_all_keeps_empty_pre_opened_container() {
        let dir = tempfile::tempdir().unwrap();
        let storage = RecordingStorage::new();
        let events = storage.events();
        let mut manager = RotationManager::new(storage, dir.path(), "cam0", 3);
        manager.open_next(0).unwrap();
        manager.switch().unwrap();
        manager.write(&[5; 4]).unwrap();
        manager.open_next(1).unwrap();
        manager.close_all().unwrap();

        let summaries = manager.containers();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[1].frames, 0);
        assert!(summaries[1].path.exists());

        let flushes = events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| matches!(e, StorageEvent::Flushed(_)))
            .count();
        assert_eq!(flushes, 2);
    }
}
