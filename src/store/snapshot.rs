//! Parquet snapshots of a record set.
//!
//! Every answer column and the cluster id are nullable Utf8; the source
//! sequence is UInt64. Files are ZSTD-compressed.

use std::path::Path;
use std::sync::Arc;

use arrow::array::{ArrayRef, StringBuilder, UInt64Builder};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;

use super::ColumnLayout;
use crate::error::StoreError;
use crate::survey::{RespondentRecord, CLUSTER_COLUMN, PROVENANCE_COLUMN, SOURCE_SEQ_COLUMN};

/// Arrow schema for a layout.
pub fn snapshot_schema(layout: &ColumnLayout) -> Schema {
    let mut fields: Vec<Field> = layout
        .answer_columns
        .iter()
        .map(|label| Field::new(label.as_str(), DataType::Utf8, true))
        .collect();
    fields.push(Field::new(CLUSTER_COLUMN, DataType::Utf8, true));
    fields.push(Field::new(SOURCE_SEQ_COLUMN, DataType::UInt64, false));
    if layout.with_provenance {
        fields.push(Field::new(PROVENANCE_COLUMN, DataType::Utf8, true));
    }
    Schema::new(fields)
}

/// Convert records into an Arrow RecordBatch.
///
/// Answers are looked up by column label; a record without a column yields
/// a null cell.
pub fn records_to_record_batch(
    records: &[RespondentRecord],
    layout: &ColumnLayout,
) -> Result<RecordBatch, StoreError> {
    let schema = Arc::new(snapshot_schema(layout));

    let mut answers: Vec<StringBuilder> = layout
        .answer_columns
        .iter()
        .map(|_| StringBuilder::new())
        .collect();
    let mut cluster = StringBuilder::new();
    let mut source_seq = UInt64Builder::new();
    let mut provenance = StringBuilder::new();

    for record in records {
        for (builder, label) in answers.iter_mut().zip(&layout.answer_columns) {
            builder.append_option(record.answer_by_label(label));
        }
        cluster.append_value(record.cluster_id());
        source_seq.append_value(record.source_seq());
        provenance.append_option(record.provenance());
    }

    let mut columns: Vec<ArrayRef> = answers
        .into_iter()
        .map(|mut builder| Arc::new(builder.finish()) as ArrayRef)
        .collect();
    columns.push(Arc::new(cluster.finish()));
    columns.push(Arc::new(source_seq.finish()));
    if layout.with_provenance {
        columns.push(Arc::new(provenance.finish()));
    }

    Ok(RecordBatch::try_new(schema, columns)?)
}

/// Write records to a Parquet file on disk.
///
/// Returns the number of rows written.
pub fn write_parquet(
    records: &[RespondentRecord],
    layout: &ColumnLayout,
    output_path: &Path,
) -> Result<usize, StoreError> {
    if records.is_empty() {
        return Err(StoreError::NoRecords);
    }

    let batch = records_to_record_batch(records, layout)?;

    if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let file = std::fs::File::create(output_path)?;
    let props = WriterProperties::builder()
        .set_compression(Compression::ZSTD(Default::default()))
        .build();

    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))?;
    writer.write(&batch)?;
    writer.close()?;

    tracing::info!(
        path = %output_path.display(),
        rows = records.len(),
        "Parquet snapshot written"
    );
    Ok(records.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::survey::Answer;
    use arrow::array::{Array, StringArray, UInt64Array};
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

    fn records() -> Vec<RespondentRecord> {
        let mut second = RespondentRecord::new(vec![Answer::new("1. 年级", "B")], "2", 9);
        second.annotate("随机抖动");
        vec![
            RespondentRecord::new(
                vec![Answer::new("1. 年级", "A"), Answer::new("2. 满意度", "5")],
                "0",
                1,
            ),
            second,
        ]
    }

    fn layout() -> ColumnLayout {
        ColumnLayout::jittered(vec!["1. 年级".to_string(), "2. 满意度".to_string()])
    }

    #[test]
    fn test_record_batch_columns() {
        let batch = records_to_record_batch(&records(), &layout()).expect("batch");
        assert_eq!(batch.num_rows(), 2);
        assert_eq!(batch.num_columns(), 5);

        let satisfaction = batch
            .column(1)
            .as_any()
            .downcast_ref::<StringArray>()
            .expect("utf8");
        assert_eq!(satisfaction.value(0), "5");
        assert!(satisfaction.is_null(1));

        let seq = batch
            .column(3)
            .as_any()
            .downcast_ref::<UInt64Array>()
            .expect("u64");
        assert_eq!(seq.value(1), 9);

        let provenance = batch
            .column(4)
            .as_any()
            .downcast_ref::<StringArray>()
            .expect("utf8");
        assert!(provenance.is_null(0));
        assert_eq!(provenance.value(1), "原问卷9-随机抖动");
    }

    #[test]
    fn test_write_and_read_back() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("jittered.parquet");

        let rows = write_parquet(&records(), &layout(), &path).expect("written");
        assert_eq!(rows, 2);

        let file = std::fs::File::open(&path).expect("open");
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)
            .expect("reader")
            .build()
            .expect("build");
        let total: usize = reader.map(|b| b.expect("batch").num_rows()).sum();
        assert_eq!(total, 2);
    }

    #[test]
    fn test_empty_is_rejected() {
        let dir = tempfile::tempdir().expect("temp dir");
        let err = write_parquet(&[], &layout(), &dir.path().join("x.parquet")).unwrap_err();
        assert!(matches!(err, StoreError::NoRecords));
    }
}
