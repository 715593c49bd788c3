//! Append-only JSON Lines store.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use super::RecordSink;
use crate::error::StoreError;
use crate::survey::RespondentRecord;

/// Writes one JSON object per line, keys in fixed column order, flushing
/// after every record so an interrupted run keeps everything accepted so far.
#[derive(Debug)]
pub struct JsonlStore {
    path: PathBuf,
    writer: BufWriter<File>,
    with_provenance: bool,
    written: usize,
}

impl JsonlStore {
    /// Creates (or truncates) the file at `path`.
    pub fn create(path: &Path, with_provenance: bool) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        tracing::debug!(path = %path.display(), "Record store created");
        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            with_provenance,
            written: 0,
        })
    }

    /// File this store writes to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records appended through this handle.
    pub fn written(&self) -> usize {
        self.written
    }
}

impl RecordSink for JsonlStore {
    fn append(&mut self, record: &RespondentRecord) -> Result<(), StoreError> {
        let row = Value::Object(record.to_row(self.with_provenance));
        serde_json::to_writer(&mut self.writer, &row)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        self.written += 1;
        Ok(())
    }
}

/// Reads every record from a JSON Lines file written by [`JsonlStore`].
pub fn read_records(path: &Path) -> Result<Vec<RespondentRecord>, StoreError> {
    let reader = BufReader::new(File::open(path)?);
    let mut records = Vec::new();

    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim_start_matches('\u{feff}').trim();
        if line.is_empty() {
            continue;
        }
        let row: Map<String, Value> = serde_json::from_str(line)?;
        let record = RespondentRecord::from_row(&row).map_err(|reason| StoreError::MalformedRow {
            line: idx + 1,
            reason,
        })?;
        records.push(record);
    }

    tracing::debug!(path = %path.display(), records = records.len(), "Records read");
    Ok(records)
}
