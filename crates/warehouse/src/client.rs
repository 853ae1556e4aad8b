//! Warehouse client trait and the references it operates on.

use std::fmt;

use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use bucketlog_core::SchemaDescriptor;

use crate::error::WarehouseError;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatasetRef {
    pub project: String,
    pub dataset: String,
}

impl DatasetRef {
    pub fn new(project: impl Into<String>, dataset: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            dataset: dataset.into(),
        }
    }

    pub fn table(&self, table: impl Into<String>) -> TableRef {
        TableRef {
            project: self.project.clone(),
            dataset: self.dataset.clone(),
            table: table.into(),
        }
    }
}

impl fmt::Display for DatasetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.project, self.dataset)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableRef {
    pub project: String,
    pub dataset: String,
    pub table: String,
}

impl TableRef {
    pub fn dataset_ref(&self) -> DatasetRef {
        DatasetRef::new(&self.project, &self.dataset)
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.project, self.dataset, self.table)
    }
}

/// How a load job treats rows already in the destination table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Append,
}

impl WriteMode {
    pub fn as_disposition(&self) -> &'static str {
        match self {
            WriteMode::Append => "WRITE_APPEND",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    Pending,
    Running,
    Done,
}

impl JobState {
    /// Parse the warehouse's state string. Anything unrecognised is treated
    /// as still in flight.
    pub fn parse(s: &str) -> Self {
        match s {
            "DONE" => JobState::Done,
            "RUNNING" => JobState::Running,
            _ => JobState::Pending,
        }
    }
}

/// Snapshot of a load job. `error` is only set once the job is done and failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadJobRecord {
    pub job_id: String,
    pub state: JobState,
    pub error: Option<String>,
}

impl LoadJobRecord {
    pub fn is_terminal(&self) -> bool {
        self.state == JobState::Done
    }

    pub fn succeeded(&self) -> bool {
        self.is_terminal() && self.error.is_none()
    }
}

/// Operations the ingestion pipeline needs from the analytical warehouse.
#[async_trait]
pub trait Warehouse: Send + Sync {
    async fn dataset_exists(&self, dataset: &DatasetRef) -> Result<bool, WarehouseError>;

    /// Create a dataset. Fails with [`WarehouseError::AlreadyExists`] if present.
    async fn create_dataset(
        &self,
        dataset: &DatasetRef,
        location: &str,
    ) -> Result<(), WarehouseError>;

    async fn table_exists(&self, table: &TableRef) -> Result<bool, WarehouseError>;

    /// Create a table partitioned by day on `partition_field`.
    async fn create_table(
        &self,
        table: &TableRef,
        schema: &SchemaDescriptor,
        partition_field: &str,
    ) -> Result<(), WarehouseError>;

    /// Delete a table. A table that is already absent is not an error.
    async fn delete_table(&self, table: &TableRef) -> Result<(), WarehouseError>;

    /// Start an asynchronous load of `batch` into `table`; returns the job id.
    async fn submit_load_job(
        &self,
        batch: &RecordBatch,
        table: &TableRef,
        schema: &SchemaDescriptor,
        mode: WriteMode,
    ) -> Result<String, WarehouseError>;

    async fn get_job_status(&self, job_id: &str) -> Result<LoadJobRecord, WarehouseError>;

    /// Request cancellation of a running job.
    async fn cancel_job(&self, job_id: &str) -> Result<(), WarehouseError>;
}
