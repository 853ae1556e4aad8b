/// Errors that can occur during warehouse operations.
#[derive(Debug, thiserror::Error)]
pub enum WarehouseError {
    /// The client was built without the settings it needs.
    #[error("warehouse not configured: {0}")]
    NotConfigured(String),

    /// Transport-level failure talking to the warehouse API.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The warehouse API answered with a non-success status.
    #[error("warehouse API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// A load job did not reach a terminal state before the deadline.
    #[error("job {job_id} timed out after {seconds}s")]
    JobTimeout { job_id: String, seconds: u64 },

    /// Waiting on a job was abandoned on request.
    #[error("job {job_id} wait cancelled")]
    Cancelled { job_id: String },

    /// Failed to encode a batch for upload.
    #[error("encode error: {0}")]
    Encode(String),

    /// Failed to parse a warehouse response.
    #[error("parse error: {0}")]
    Parse(String),
}

impl From<parquet::errors::ParquetError> for WarehouseError {
    fn from(e: parquet::errors::ParquetError) -> Self {
        WarehouseError::Encode(e.to_string())
    }
}
