use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("object not found: {bucket}/{name}")]
    NotFound { bucket: String, name: String },

    #[error("object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not configured: {0}")]
    NotConfigured(String),
}

impl StorageError {
    /// Map a backend error for `bucket/name`, keeping not-found distinguishable.
    pub(crate) fn for_object(err: object_store::Error, bucket: &str, name: &str) -> Self {
        match err {
            object_store::Error::NotFound { .. } => StorageError::NotFound {
                bucket: bucket.to_string(),
                name: name.to_string(),
            },
            other => StorageError::ObjectStore(other),
        }
    }
}
