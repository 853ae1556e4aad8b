//! Schema registry for the two access-log record shapes.
//!
//! Each shape has a read variant (what the source CSV carries) and a write
//! variant (what the warehouse table holds). They differ only in the leading
//! time field.

use serde::Serialize;

use bucketlog_core::{FieldSpec, FieldType, SchemaDescriptor};

/// Write-side timestamp column; also the table's partition field.
pub const TIME_FIELD: &str = "time";

/// Read-side microsecond-epoch column of usage logs.
pub const TIME_MICROS_FIELD: &str = "time_micros";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Usage,
    Storage,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Usage => "usage",
            RecordKind::Storage => "storage",
        }
    }
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Descriptor for `kind`, read or write variant.
pub fn describe(kind: RecordKind, for_read: bool) -> SchemaDescriptor {
    match kind {
        RecordKind::Usage => usage_schema(for_read),
        RecordKind::Storage => storage_schema(for_read),
    }
}

pub fn usage_schema(for_read: bool) -> SchemaDescriptor {
    let time = if for_read {
        FieldSpec::required(
            TIME_MICROS_FIELD,
            FieldType::Integer,
            "The time that the request was completed, in microseconds since the Unix epoch.",
        )
    } else {
        FieldSpec::required(
            TIME_FIELD,
            FieldType::Timestamp,
            "The time that the request was completed",
        )
    };

    let mut fields = vec![time];
    fields.extend([
        FieldSpec::required(
            "c_ip",
            FieldType::String,
            "The IP address from which the request was made.",
        ),
        FieldSpec::required(
            "c_ip_type",
            FieldType::Integer,
            "The type of IP in the c_ip field: 1 for IPv4, 2 for IPv6.",
        ),
        FieldSpec::nullable("c_ip_region", FieldType::String, "Reserved for future use."),
        FieldSpec::nullable("cs_method", FieldType::String, "The HTTP method of this request."),
        FieldSpec::required("cs_uri", FieldType::String, "The URI of the request."),
        FieldSpec::required(
            "sc_status",
            FieldType::Integer,
            "The HTTP status code the server sent in response.",
        ),
        FieldSpec::nullable(
            "cs_bytes",
            FieldType::Integer,
            "The number of bytes sent in the request.",
        ),
        FieldSpec::required(
            "sc_bytes",
            FieldType::Integer,
            "The number of bytes sent in the response.",
        ),
        FieldSpec::nullable(
            "time_taken_micros",
            FieldType::Integer,
            "The time it took to serve the request in microseconds, from the first byte \
             received to when the response is sent.",
        ),
        FieldSpec::nullable("cs_host", FieldType::String, "The host in the original request."),
        FieldSpec::nullable("cs_referer", FieldType::String, "The HTTP referrer for the request."),
        FieldSpec::nullable("cs_user_agent", FieldType::String, "The User-Agent of the request."),
        FieldSpec::nullable("s_request_id", FieldType::String, "The request identifier."),
        FieldSpec::nullable(
            "cs_operation",
            FieldType::String,
            "The Cloud Storage operation, e.g. GET_Object.",
        ),
        FieldSpec::nullable(
            "cs_bucket",
            FieldType::String,
            "The bucket specified in the request. Null for list-buckets requests.",
        ),
        FieldSpec::nullable(
            "cs_object",
            FieldType::String,
            "The object specified in this request.",
        ),
    ]);

    SchemaDescriptor::new("usage", fields)
}

/// Storage snapshots carry no time column in the file; the write variant
/// gains one derived from the file name.
pub fn storage_schema(for_read: bool) -> SchemaDescriptor {
    let mut fields = Vec::with_capacity(3);
    if !for_read {
        fields.push(FieldSpec::required(TIME_FIELD, FieldType::Timestamp, "Timestamp of report"));
    }
    fields.push(FieldSpec::required("bucket", FieldType::String, "The name of the bucket."));
    fields.push(FieldSpec::required(
        "storage_byte_hours",
        FieldType::Integer,
        "Average size in byte-hours over a 24 hour period of the bucket. \
         Divide by 24 for the total size of the bucket.",
    ));
    SchemaDescriptor::new("storage", fields)
}

#[cfg(test)]
mod tests {
    use bucketlog_core::FieldMode;

    use super::*;

    fn without(desc: &SchemaDescriptor, name: &str) -> Vec<FieldSpec> {
        desc.fields.iter().filter(|f| f.name != name).cloned().collect()
    }

    #[test]
    fn usage_variants_differ_only_in_time() {
        let read = usage_schema(true);
        let write = usage_schema(false);
        assert_eq!(read.fields.len(), write.fields.len());
        assert_eq!(read.fields[0].name, TIME_MICROS_FIELD);
        assert_eq!(read.fields[0].field_type, FieldType::Integer);
        assert_eq!(write.fields[0].name, TIME_FIELD);
        assert_eq!(write.fields[0].field_type, FieldType::Timestamp);
        assert_eq!(without(&read, TIME_MICROS_FIELD), without(&write, TIME_FIELD));
    }

    #[test]
    fn storage_variants_differ_only_in_time() {
        let read = storage_schema(true);
        let write = storage_schema(false);
        assert!(read.field(TIME_FIELD).is_none());
        assert_eq!(write.fields[0].name, TIME_FIELD);
        assert_eq!(write.fields[0].mode, FieldMode::Required);
        assert_eq!(read.fields, without(&write, TIME_FIELD));
    }

    #[test]
    fn usage_required_fields() {
        let write = describe(RecordKind::Usage, false);
        let required: Vec<&str> = write
            .fields
            .iter()
            .filter(|f| f.is_required())
            .map(|f| f.name.as_str())
            .collect();
        assert_eq!(required, vec!["time", "c_ip", "c_ip_type", "cs_uri", "sc_status", "sc_bytes"]);
        assert_eq!(write.fields.len(), 17);
    }
}
