//! Encode record batches as Parquet for upload in load jobs.
//!
//! Parquet keeps column types intact (microsecond UTC timestamps stay
//! timestamps) so the warehouse does not have to re-infer them from text.

use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use tracing::debug;

use crate::error::WarehouseError;

/// Write `batch` to an in-memory Parquet file with Zstd compression.
pub fn encode_parquet(batch: &RecordBatch) -> Result<Vec<u8>, WarehouseError> {
    let props = WriterProperties::builder()
        .set_compression(Compression::ZSTD(Default::default()))
        .build();

    let mut buf = Vec::new();
    let mut writer = ArrowWriter::try_new(&mut buf, batch.schema(), Some(props))?;
    writer.write(batch)?;
    writer.close()?;

    debug!(rows = batch.num_rows(), bytes = buf.len(), "Encoded batch as Parquet");
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow::array::{Int64Array, StringArray, TimestampMicrosecondArray};
    use arrow::datatypes::{DataType, Field, Schema};
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

    use super::*;

    fn read_back(data: Vec<u8>) -> Vec<RecordBatch> {
        let reader = ParquetRecordBatchReaderBuilder::try_new(bytes::Bytes::from(data))
            .unwrap()
            .build()
            .unwrap();
        reader.map(|b| b.unwrap()).collect()
    }

    fn sample_batch() -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("time", bucketlog_core::schema::timestamp_type(), false),
            Field::new("bucket", DataType::Utf8, false),
            Field::new("storage_byte_hours", DataType::Int64, false),
        ]));
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(
                    TimestampMicrosecondArray::from(vec![1_000_000, 2_000_000])
                        .with_timezone("UTC"),
                ),
                Arc::new(StringArray::from(vec!["a", "b"])),
                Arc::new(Int64Array::from(vec![10, 20])),
            ],
        )
        .unwrap()
    }

    #[test]
    fn encoded_bytes_are_parquet() {
        let bytes = encode_parquet(&sample_batch()).unwrap();
        assert!(bytes.len() > 4);
        assert_eq!(&bytes[..4], b"PAR1");
    }

    #[test]
    fn timestamps_survive_encoding() {
        let batches = read_back(encode_parquet(&sample_batch()).unwrap());
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].num_rows(), 2);
        assert_eq!(
            *batches[0].schema().field(0).data_type(),
            bucketlog_core::schema::timestamp_type()
        );
    }
}
