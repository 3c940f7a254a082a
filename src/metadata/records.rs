use chrono::{DateTime, Local};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use crate::error::{CaptureError, Result};

pub const METADATA_HEADER: &str = "sequence_id,timestamp,source_identifier,container_index";

/// One accepted frame, as correlated after the fact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataRecord {
    pub sequence_id: u64,
    pub timestamp: u64,
    pub source_identifier: String,
    pub container_index: u32,
}

impl MetadataRecord {
    pub fn to_line(&self) -> String {
        format!(
            "{},{},{},{}\n",
            self.sequence_id, self.timestamp, self.source_identifier, self.container_index
        )
    }

    pub fn parse(line: &str) -> Option<Self> {
        let mut fields = line.trim_end().split(',');
        let record = Self {
            sequence_id: fields.next()?.parse().ok()?,
            timestamp: fields.next()?.parse().ok()?,
            source_identifier: fields.next()?.to_string(),
            container_index: fields.next()?.parse().ok()?,
        };
        match fields.next() {
            Some(_) => None,
            None => Some(record),
        }
    }
}

pub fn log_file_name(source_identifier: &str, started_at: &DateTime<Local>) -> String {
    format!(
        "{}_logfile_{}.csv",
        source_identifier,
        started_at.format("%d%m%Y_%H%M%S")
    )
}

/// Append-only per-session frame log.
///
/// Every record is handed to the writer and flushed before `append` returns,
/// so it never reaches storage ahead of the frame bytes it describes.
pub struct MetadataLog<W: Write = File> {
    path: PathBuf,
    writer: Option<W>,
    records: u64,
}

impl MetadataLog<File> {
    pub fn create(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|e| CaptureError::storage(path, e))?;
        info!("Metadata log created at {}", path.display());
        Self::from_writer(path, file)
    }
}

impl<W: Write> MetadataLog<W> {
    pub fn from_writer(path: &Path, mut writer: W) -> Result<Self> {
        writer
            .write_all(format!("{}\n", METADATA_HEADER).as_bytes())
            .and_then(|_| writer.flush())
            .map_err(|e| CaptureError::storage(path, e))?;

        Ok(Self {
            path: path.to_path_buf(),
            writer: Some(writer),
            records: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn records(&self) -> u64 {
        self.records
    }

    pub fn is_closed(&self) -> bool {
        self.writer.is_none()
    }

    pub fn append(&mut self, record: &MetadataRecord) -> Result<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| CaptureError::storage(&self.path, "metadata log already closed"))?;

        writer
            .write_all(record.to_line().as_bytes())
            .and_then(|_| writer.flush())
            .map_err(|e| CaptureError::storage(&self.path, e))?;
        self.records += 1;
        Ok(())
    }

    /// Flush then release. Closing twice is a no-op.
    pub fn close(&mut self) -> Result<()> {
        match self.writer.take() {
            Some(mut writer) => {
                debug!(
                    "Closing metadata log {} after {} records",
                    self.path.display(),
                    self.records
                );
                writer.flush().map_err(|e| CaptureError::storage(&self.path, e))
            }
            None => Ok(()),
        }
    }
}

impl<W: Write> Drop for MetadataLog<W> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            error!("Failed to close metadata log on drop {:?}", e);
        }
    }
}

/// Reads a metadata log back. A malformed final line (a record cut short by
/// a crash) is skipped with a warning; malformed lines anywhere else are errors.
pub fn read_metadata_log(path: &Path) -> Result<Vec<MetadataRecord>> {
    let reader = BufReader::new(File::open(path)?);
    let mut lines = reader.lines();

    let header = lines.next().transpose()?;
    if header.as_deref().map(str::trim_end) != Some(METADATA_HEADER) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("{} does not start with a metadata header", path.display()),
        )
        .into());
    }

    let mut records = Vec::new();
    let mut malformed: Option<(usize, String)> = None;
    for (number, line) in lines.enumerate() {
        let line = line?;
        if let Some((bad_number, bad_line)) = malformed.take() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("malformed record on line {}: {:?}", bad_number + 2, bad_line),
            )
            .into());
        }
        match MetadataRecord::parse(&line) {
            Some(record) => records.push(record),
            None => malformed = Some((number, line)),
        }
    }

    if let Some((number, line)) = malformed {
        warn!(
            "Ignoring truncated final record on line {} of {}: {:?}",
            number + 2,
            path.display(),
            line
        );
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(sequence_id: u64, container_index: u32) -> MetadataRecord {
        MetadataRecord {
            sequence_id,
            timestamp: sequence_id * 1_000,
            source_identifier: "cam0".to_string(),
            container_index,
        }
    }

    #[test]
    fn test_log_file_name_format() {
        let started = Local.with_ymd_and_hms(2024, 3, 7, 9, 5, 2).unwrap();
        assert_eq!(log_file_name("cam0", &started), "cam0_logfile_07032024_090502.csv");
    }

    #[test]
    fn test_header_and_records_written() {
        let mut buffer = Vec::new();
        {
            let mut log = MetadataLog::from_writer(Path::new("mem.csv"), &mut buffer).unwrap();
            log.append(&record(4, 0)).unwrap();
            log.append(&record(5, 1)).unwrap();
            assert_eq!(log.records(), 2);
            log.close().unwrap();
        }
        let text = String::from_utf8(buffer).unwrap();
        assert_eq!(text, format!("{}\n4,4000,cam0,0\n5,5000,cam0,1\n", METADATA_HEADER));
    }

    #[test]
    fn test_append_after_close_fails_and_close_is_idempotent() {
        let mut log = MetadataLog::from_writer(Path::new("mem.csv"), Vec::new()).unwrap();
        log.close().unwrap();
        log.close().unwrap();
        assert!(log.is_closed());
        assert!(matches!(
            log.append(&record(1, 0)),
            Err(CaptureError::StorageWriteFailed { .. })
        ));
    }

    #[test]
    fn test_read_back_round_trip_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cam0_logfile.csv");
        let mut log = MetadataLog::create(&path).unwrap();
        for i in 0..3 {
            log.append(&record(i, 0)).unwrap();
        }
        log.close().unwrap();

        let records = read_metadata_log(&path).unwrap();
        assert_eq!(records, vec![record(0, 0), record(1, 0), record(2, 0)]);
    }

    #[test]
    fn test_create_refuses_existing_log() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cam0_logfile_18102026_120000.csv");
        std::fs::write(&path, "earlier session\n").unwrap();

        assert!(matches!(
            MetadataLog::create(&path),
            Err(CaptureError::StorageWriteFailed { .. })
        ));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "earlier session\n");
    }

    #[test]
    fn test_read_tolerates_truncated_final_line_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");

        std::fs::write(&path, format!("{}\n1,10,cam0,0\n2,20,ca", METADATA_HEADER)).unwrap();
        assert_eq!(read_metadata_log(&path).unwrap().len(), 1);

        std::fs::write(&path, format!("{}\n1,10\n2,20,cam0,0\n", METADATA_HEADER)).unwrap();
        assert!(read_metadata_log(&path).is_err());

        std::fs::write(&path, "FrameID,Timestamp\n").unwrap();
        assert!(read_metadata_log(&path).is_err());
    }
}
