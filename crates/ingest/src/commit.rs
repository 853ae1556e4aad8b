//! Load-then-archive commit of one transformed file.
//!
//! The source object is only touched after the load job is observed done
//! without error, and it is only deleted after the archive copy returned.
//! A crash between copy and delete leaves the object in both buckets; a
//! re-run would load it again (at-least-once).

use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use bucketlog_storage::{ObjectStorage, StorageError};
use bucketlog_warehouse::{
    wait_for_job, PollPolicy, TableRef, Warehouse, WarehouseError, WriteMode,
};

use crate::transform::IngestBatch;

#[derive(Debug, Error)]
pub enum CommitError {
    /// The warehouse finished the job with an error result.
    #[error("load job {job_id} for {file} failed: {reason}")]
    LoadFailed {
        file: String,
        job_id: String,
        reason: String,
    },

    #[error("loading {file} failed: {source}")]
    Warehouse {
        file: String,
        #[source]
        source: WarehouseError,
    },

    #[error("archiving {file} failed: {source}")]
    Archive {
        file: String,
        #[source]
        source: StorageError,
    },
}

impl CommitError {
    /// True when the wait was abandoned through the cancellation token.
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            CommitError::Warehouse {
                source: WarehouseError::Cancelled { .. },
                ..
            }
        )
    }
}

/// Where the source object lives and where it goes on success.
#[derive(Debug, Clone, Copy)]
pub struct ArchiveTarget<'a> {
    pub source_bucket: &'a str,
    pub archive_bucket: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitOutcome {
    pub job_id: String,
    pub rows: usize,
}

pub struct Committer {
    warehouse: Arc<dyn Warehouse>,
    storage: Arc<dyn ObjectStorage>,
    policy: PollPolicy,
}

impl Committer {
    pub fn new(
        warehouse: Arc<dyn Warehouse>,
        storage: Arc<dyn ObjectStorage>,
        policy: PollPolicy,
    ) -> Self {
        Self {
            warehouse,
            storage,
            policy,
        }
    }

    /// Append `batch` to `table`, wait for the job, then move the source
    /// object to the archive bucket.
    pub async fn commit(
        &self,
        batch: &IngestBatch,
        table: &TableRef,
        target: ArchiveTarget<'_>,
        cancel: &CancellationToken,
    ) -> Result<CommitOutcome, CommitError> {
        let file = batch.file.name.as_str();
        let warehouse_err = |source| CommitError::Warehouse {
            file: file.to_string(),
            source,
        };

        let job_id = self
            .warehouse
            .submit_load_job(&batch.batch, table, &batch.schema, WriteMode::Append)
            .await
            .map_err(warehouse_err)?;
        info!(
            file = %file,
            table = %table,
            job_id = %job_id,
            rows = batch.num_rows(),
            "Submitted load job"
        );

        let record = wait_for_job(self.warehouse.as_ref(), &job_id, &self.policy, cancel)
            .await
            .map_err(warehouse_err)?;

        if let Some(reason) = record.error {
            error!(
                file = %file,
                job_id = %job_id,
                reason = %reason,
                "Load job failed, leaving source in place"
            );
            return Err(CommitError::LoadFailed {
                file: file.to_string(),
                job_id,
                reason,
            });
        }

        let archive_err = |source| CommitError::Archive {
            file: file.to_string(),
            source,
        };
        self.storage
            .copy_object(target.source_bucket, file, target.archive_bucket)
            .await
            .map_err(archive_err)?;
        info!(file = %file, archive = %target.archive_bucket, "Copied to archive");

        self.storage
            .delete_object(target.source_bucket, file)
            .await
            .map_err(archive_err)?;
        info!(file = %file, source = %target.source_bucket, "Removed from source");

        Ok(CommitOutcome {
            job_id,
            rows: batch.num_rows(),
        })
    }
}
