mod records;

pub use records::{log_file_name, read_metadata_log, MetadataLog, MetadataRecord, METADATA_HEADER};
