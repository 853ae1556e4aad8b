//! Parse a classified source file into a write-ready record batch.
//!
//! Source files are CSV with a header row. Columns are typed by name from the
//! read-side descriptor, the leading `time` column is derived per kind, and
//! the result is projected onto the write-side descriptor.

use std::io::Cursor;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, TimestampMicrosecondArray};
use arrow::compute::{cast, concat_batches};
use arrow::csv::reader::Format;
use arrow::csv::ReaderBuilder;
use arrow::datatypes::{DataType, Field, Schema};
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use thiserror::Error;
use tracing::debug;

use bucketlog_core::schema::timestamp_type;
use bucketlog_core::SchemaDescriptor;

use crate::classify::{SourceFile, STORAGE_MARKER};
use crate::schema::{describe, RecordKind, TIME_FIELD, TIME_MICROS_FIELD};

#[derive(Debug, Error)]
pub enum TransformError {
    /// The file could not be read as CSV with the expected column types.
    #[error("CSV parse error: {0}")]
    Csv(#[source] ArrowError),

    /// Casting or assembling the write-side batch failed.
    #[error("arrow error: {0}")]
    Arrow(#[from] ArrowError),

    #[error("file has no header row")]
    MissingHeader,

    #[error("column {0} missing from file")]
    MissingColumn(String),

    #[error("required column {column} has {nulls} null value(s)")]
    NullInRequired { column: String, nulls: usize },

    #[error("cannot derive report time from {name}: {reason}")]
    BadFileName { name: String, reason: String },

    #[error("{0} is neither a usage nor a storage file")]
    Unsupported(String),
}

/// One source file's rows in write-side shape, ready for a load job.
#[derive(Debug, Clone)]
pub struct IngestBatch {
    pub file: SourceFile,
    pub kind: RecordKind,
    /// Write-side descriptor the batch conforms to.
    pub schema: SchemaDescriptor,
    pub batch: RecordBatch,
}

impl IngestBatch {
    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }
}

/// Build the [`IngestBatch`] for `file` from its raw content.
pub fn transform(file: &SourceFile, data: Bytes) -> Result<IngestBatch, TransformError> {
    let kind = file
        .kind
        .record_kind()
        .ok_or_else(|| TransformError::Unsupported(file.name.clone()))?;

    let read = describe(kind, true);
    let write = describe(kind, false);
    let parsed = parse_csv(data, &read)?;

    let time: ArrayRef = match kind {
        RecordKind::Usage => usage_time(&parsed)?,
        RecordKind::Storage => {
            let at = storage_timestamp_from_name(&file.name)?;
            Arc::new(
                TimestampMicrosecondArray::from_value(at.timestamp_micros(), parsed.num_rows())
                    .with_timezone("UTC"),
            )
        }
    };

    let batch = project(&parsed, time, &write)?;
    debug!(file = %file.name, kind = %kind, rows = batch.num_rows(), "Transformed source file");

    Ok(IngestBatch {
        file: file.clone(),
        kind,
        schema: write,
        batch,
    })
}

/// Parse CSV with a header row. Known columns get their descriptor type,
/// anything else is read as a string.
pub fn parse_csv(data: Bytes, read: &SchemaDescriptor) -> Result<RecordBatch, TransformError> {
    let (header, _) = Format::default()
        .with_header(true)
        .infer_schema(Cursor::new(data.clone()), Some(0))
        .map_err(TransformError::Csv)?;
    if header.fields().is_empty() {
        return Err(TransformError::MissingHeader);
    }

    let fields: Vec<Field> = header
        .fields()
        .iter()
        .map(|f| {
            let data_type = read.parse_type(f.name()).unwrap_or(DataType::Utf8);
            Field::new(f.name(), data_type, true)
        })
        .collect();
    let schema = Arc::new(Schema::new(fields));

    let reader = ReaderBuilder::new(schema.clone())
        .with_header(true)
        .build(Cursor::new(data))
        .map_err(TransformError::Csv)?;
    let batches = reader
        .collect::<Result<Vec<_>, _>>()
        .map_err(TransformError::Csv)?;
    Ok(concat_batches(&schema, &batches)?)
}

/// Microsecond-epoch integers reinterpreted as UTC timestamps.
fn usage_time(parsed: &RecordBatch) -> Result<ArrayRef, TransformError> {
    let micros = parsed
        .column_by_name(TIME_MICROS_FIELD)
        .ok_or_else(|| TransformError::MissingColumn(TIME_MICROS_FIELD.to_string()))?;
    Ok(cast(micros.as_ref(), &timestamp_type())?)
}

/// Report time encoded in a storage file name:
/// `<bucket>_storage_YYYY_MM_DD_hh_mm_ss_<id>_v0`. The marker swallows the
/// year's leading `2`, which is put back before parsing.
pub fn storage_timestamp_from_name(name: &str) -> Result<DateTime<Utc>, TransformError> {
    let bad = |reason: &str| TransformError::BadFileName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    let (_, tail) = name
        .split_once(STORAGE_MARKER)
        .ok_or_else(|| bad("no storage marker"))?;
    let parts: Vec<&str> = tail.split('_').collect();
    if parts.len() < 6 {
        return Err(bad("expected six date components"));
    }

    let year: i32 = format!("2{}", parts[0])
        .parse()
        .map_err(|_| bad("year is not a number"))?;
    let mut rest = [0u32; 5];
    for (slot, part) in rest.iter_mut().zip(&parts[1..6]) {
        *slot = part.parse().map_err(|_| bad("date component is not a number"))?;
    }
    let [month, day, hour, minute, second] = rest;

    Utc.with_ymd_and_hms(year, month, day, hour, minute, second)
        .single()
        .ok_or_else(|| bad("not a valid date"))
}

/// Lay `parsed` out in write-side column order with `time` first.
fn project(
    parsed: &RecordBatch,
    time: ArrayRef,
    write: &SchemaDescriptor,
) -> Result<RecordBatch, TransformError> {
    let schema = write.arrow_schema();
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(schema.fields().len());

    for field in schema.fields() {
        let column = if field.name() == TIME_FIELD {
            time.clone()
        } else {
            let col = parsed
                .column_by_name(field.name())
                .ok_or_else(|| TransformError::MissingColumn(field.name().clone()))?;
            if col.data_type() == field.data_type() {
                col.clone()
            } else {
                cast(col.as_ref(), field.data_type())?
            }
        };

        if !field.is_nullable() && column.null_count() > 0 {
            return Err(TransformError::NullInRequired {
                column: field.name().clone(),
                nulls: column.null_count(),
            });
        }
        columns.push(column);
    }

    Ok(RecordBatch::try_new(schema, columns)?)
}
