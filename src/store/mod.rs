//! Output store.
//!
//! Finalized records are appended one at a time through a [`RecordSink`];
//! [`JsonlStore`] persists them incrementally and [`write_parquet`] writes a
//! columnar snapshot once a stage completes.

pub mod jsonl;
pub mod snapshot;

use crate::error::StoreError;
use crate::survey::{RespondentRecord, CLUSTER_COLUMN, PROVENANCE_COLUMN, SOURCE_SEQ_COLUMN};

pub use jsonl::{read_records, JsonlStore};
pub use snapshot::{records_to_record_batch, write_parquet};

/// Append-only destination for finalized records.
pub trait RecordSink: Send {
    /// Appends one record. Earlier records are never rewritten.
    fn append(&mut self, record: &RespondentRecord) -> Result<(), StoreError>;
}

impl RecordSink for Vec<RespondentRecord> {
    fn append(&mut self, record: &RespondentRecord) -> Result<(), StoreError> {
        self.push(record.clone());
        Ok(())
    }
}

/// Fixed output column order: answer columns, then metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnLayout {
    /// Answer column labels in schema order.
    pub answer_columns: Vec<String>,
    /// Whether the provenance column is present.
    pub with_provenance: bool,
}

impl ColumnLayout {
    /// Layout for synthesized records.
    pub fn generated(answer_columns: Vec<String>) -> Self {
        Self {
            answer_columns,
            with_provenance: false,
        }
    }

    /// Layout for jittered records.
    pub fn jittered(answer_columns: Vec<String>) -> Self {
        Self {
            answer_columns,
            with_provenance: true,
        }
    }

    /// Every header in output order.
    pub fn headers(&self) -> Vec<String> {
        let mut headers = self.answer_columns.clone();
        headers.push(CLUSTER_COLUMN.to_string());
        headers.push(SOURCE_SEQ_COLUMN.to_string());
        if self.with_provenance {
            headers.push(PROVENANCE_COLUMN.to_string());
        }
        headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::survey::Answer;

    #[test]
    fn test_headers_order() {
        let layout = ColumnLayout::jittered(vec!["1. 年级".to_string()]);
        assert_eq!(layout.headers(), vec!["1. 年级", "簇编号", "原问卷序号", "抖动来源"]);
        assert_eq!(
            ColumnLayout::generated(vec![]).headers(),
            vec!["簇编号", "原问卷序号"]
        );
    }

    #[test]
    fn test_vec_sink_collects() {
        let mut sink: Vec<RespondentRecord> = Vec::new();
        let record = RespondentRecord::new(vec![Answer::new("1. 年级", "A")], "0", 1);
        RecordSink::append(&mut sink, &record).expect("append");
        assert_eq!(sink, vec![record]);
    }
}
