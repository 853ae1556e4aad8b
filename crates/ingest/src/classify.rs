//! Source file classification by object name.

use serde::Serialize;
use thiserror::Error;

use crate::schema::RecordKind;

/// Every log object the bucket exporter writes ends with this.
pub const REQUIRED_SUFFIX: &str = "_v0";

pub const USAGE_MARKER: &str = "_usage_2";
pub const STORAGE_MARKER: &str = "_storage_2";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClassificationError {
    #[error("source object {0} does not end with _v0")]
    MissingSuffix(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SourceKind {
    Usage,
    Storage,
    /// Well-formed name of neither kind; skipped and left in place.
    Invalid,
}

impl SourceKind {
    pub fn record_kind(&self) -> Option<RecordKind> {
        match self {
            SourceKind::Usage => Some(RecordKind::Usage),
            SourceKind::Storage => Some(RecordKind::Storage),
            SourceKind::Invalid => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceFile {
    pub name: String,
    pub kind: SourceKind,
}

/// Classify an object name. A missing `_v0` suffix is an error; the caller
/// treats it as fatal. The usage marker wins when both markers occur.
pub fn classify(name: &str) -> Result<SourceFile, ClassificationError> {
    if !name.ends_with(REQUIRED_SUFFIX) {
        return Err(ClassificationError::MissingSuffix(name.to_string()));
    }

    let kind = if name.contains(USAGE_MARKER) {
        SourceKind::Usage
    } else if name.contains(STORAGE_MARKER) {
        SourceKind::Storage
    } else {
        SourceKind::Invalid
    };

    Ok(SourceFile {
        name: name.to_string(),
        kind,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_names() {
        for name in [
            "my-bucket_usage_2023_05_02_14_00_00_00b8_v0",
            "a_usage_2019_12_31_23_00_00_ff_v0",
        ] {
            assert_eq!(classify(name).unwrap().kind, SourceKind::Usage);
        }
    }

    #[test]
    fn storage_names() {
        let file = classify("my-bucket_storage_2023_05_02_07_00_00_0123_v0").unwrap();
        assert_eq!(file.kind, SourceKind::Storage);
        assert_eq!(file.name, "my-bucket_storage_2023_05_02_07_00_00_0123_v0");
        assert_eq!(file.kind.record_kind(), Some(RecordKind::Storage));
    }

    #[test]
    fn neither_kind_is_invalid_not_an_error() {
        let file = classify("my-bucket_other_2023_v0").unwrap();
        assert_eq!(file.kind, SourceKind::Invalid);
        assert_eq!(file.kind.record_kind(), None);
    }

    #[test]
    fn missing_suffix_fails() {
        for name in [
            "my-bucket_usage_2023_05_02_14_00_00_00b8_v1",
            "my-bucket_storage_2023_05_02_07_00_00_0123",
            "readme.txt",
            "",
        ] {
            assert_eq!(
                classify(name),
                Err(ClassificationError::MissingSuffix(name.to_string()))
            );
        }
    }
}
