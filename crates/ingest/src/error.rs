use thiserror::Error;

use bucketlog_storage::StorageError;
use bucketlog_warehouse::WarehouseError;

use crate::classify::ClassificationError;
use crate::commit::CommitError;
use crate::transform::TransformError;

/// Why an ingest pass stopped. Every variant is fatal for the tenant.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("classification failed: {0}")]
    Classification(#[from] ClassificationError),

    #[error("provisioning {target} failed: {source}")]
    Provisioning {
        target: String,
        #[source]
        source: WarehouseError,
    },

    #[error("transforming {file} failed: {source}")]
    Transform {
        file: String,
        #[source]
        source: TransformError,
    },

    #[error(transparent)]
    Commit(#[from] CommitError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("ingest pass cancelled")]
    Cancelled,
}
