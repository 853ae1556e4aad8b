//! In-process warehouse with the same observable behaviour as the real one:
//! datasets and tables must exist before use, loads are asynchronous jobs,
//! and rows only land once a job is observed done without error.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use tracing::debug;

use bucketlog_core::SchemaDescriptor;

use crate::client::{DatasetRef, JobState, LoadJobRecord, TableRef, Warehouse, WriteMode};
use crate::error::WarehouseError;

/// A table held by [`MemoryWarehouse`].
#[derive(Debug, Clone)]
pub struct MemoryTable {
    pub schema: SchemaDescriptor,
    pub partition_field: String,
    pub batches: Vec<RecordBatch>,
}

impl MemoryTable {
    pub fn row_count(&self) -> usize {
        self.batches.iter().map(|b| b.num_rows()).sum()
    }
}

#[derive(Debug)]
struct MemoryJob {
    table: TableRef,
    batch: RecordBatch,
    remaining_polls: u32,
    error: Option<String>,
    done: bool,
    status_calls: u32,
    cancel_requested: bool,
}

#[derive(Debug, Default)]
struct State {
    datasets: HashMap<DatasetRef, String>,
    tables: HashMap<TableRef, MemoryTable>,
    jobs: HashMap<String, MemoryJob>,
    next_job: u64,
    scripted_failures: VecDeque<String>,
    status_failures: VecDeque<String>,
    polls_before_done: u32,
    /// Cancel requests are recorded but do not stop the job, the way the
    /// real warehouse may still finish a job it was asked to cancel.
    cancel_is_advisory: bool,
    tables_created: u32,
    tables_deleted: u32,
}

#[derive(Debug, Default)]
pub struct MemoryWarehouse {
    state: Mutex<State>,
}

impl MemoryWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// The next submitted load job finishes with `reason` as its error.
    pub fn fail_next_load(&self, reason: &str) {
        self.lock().scripted_failures.push_back(reason.to_string());
    }

    /// The next status check fails with a 503 carrying `message`.
    pub fn fail_next_status(&self, message: &str) {
        self.lock().status_failures.push_back(message.to_string());
    }

    /// Jobs submitted from now on report RUNNING for `polls` status checks
    /// before reporting DONE.
    pub fn set_polls_before_done(&self, polls: u32) {
        self.lock().polls_before_done = polls;
    }

    /// Record cancel requests without stopping the job.
    pub fn set_cancel_is_advisory(&self, advisory: bool) {
        self.lock().cancel_is_advisory = advisory;
    }

    pub fn table(&self, table: &TableRef) -> Option<MemoryTable> {
        self.lock().tables.get(table).cloned()
    }

    pub fn row_count(&self, table: &TableRef) -> usize {
        self.lock().tables.get(table).map(|t| t.row_count()).unwrap_or(0)
    }

    pub fn dataset_count(&self) -> usize {
        self.lock().datasets.len()
    }

    pub fn table_count(&self) -> usize {
        self.lock().tables.len()
    }

    /// Total create and delete calls that succeeded, for idempotence checks.
    pub fn table_churn(&self) -> (u32, u32) {
        let state = self.lock();
        (state.tables_created, state.tables_deleted)
    }

    pub fn job_count(&self) -> usize {
        self.lock().jobs.len()
    }

    pub fn status_calls(&self, job_id: &str) -> u32 {
        self.lock().jobs.get(job_id).map(|j| j.status_calls).unwrap_or(0)
    }

    pub fn was_cancelled(&self, job_id: &str) -> bool {
        self.lock()
            .jobs
            .get(job_id)
            .map(|j| j.cancel_requested)
            .unwrap_or(false)
    }

    /// Check a batch against the destination the way a load would.
    fn validate(table: &MemoryTable, batch: &RecordBatch) -> Option<String> {
        let expected = table.schema.field_names();
        let schema = batch.schema();
        let actual: Vec<&str> = schema.fields().iter().map(|f| f.name().as_str()).collect();
        if expected != actual {
            return Some(format!(
                "Provided schema does not match table: expected {:?}, got {:?}",
                expected, actual
            ));
        }
        None
    }
}

#[async_trait]
impl Warehouse for MemoryWarehouse {
    async fn dataset_exists(&self, dataset: &DatasetRef) -> Result<bool, WarehouseError> {
        Ok(self.lock().datasets.contains_key(dataset))
    }

    async fn create_dataset(
        &self,
        dataset: &DatasetRef,
        location: &str,
    ) -> Result<(), WarehouseError> {
        let mut state = self.lock();
        if state.datasets.contains_key(dataset) {
            return Err(WarehouseError::AlreadyExists(dataset.to_string()));
        }
        state.datasets.insert(dataset.clone(), location.to_string());
        debug!(dataset = %dataset, location = %location, "memory: dataset created");
        Ok(())
    }

    async fn table_exists(&self, table: &TableRef) -> Result<bool, WarehouseError> {
        Ok(self.lock().tables.contains_key(table))
    }

    async fn create_table(
        &self,
        table: &TableRef,
        schema: &SchemaDescriptor,
        partition_field: &str,
    ) -> Result<(), WarehouseError> {
        let mut state = self.lock();
        if !state.datasets.contains_key(&table.dataset_ref()) {
            return Err(WarehouseError::NotFound(table.dataset_ref().to_string()));
        }
        if state.tables.contains_key(table) {
            return Err(WarehouseError::AlreadyExists(table.to_string()));
        }
        if schema.field(partition_field).is_none() {
            return Err(WarehouseError::Api {
                status: 400,
                message: format!("partition field {partition_field} not in schema"),
            });
        }
        state.tables.insert(
            table.clone(),
            MemoryTable {
                schema: schema.clone(),
                partition_field: partition_field.to_string(),
                batches: Vec::new(),
            },
        );
        state.tables_created += 1;
        Ok(())
    }

    async fn delete_table(&self, table: &TableRef) -> Result<(), WarehouseError> {
        let mut state = self.lock();
        if state.tables.remove(table).is_some() {
            state.tables_deleted += 1;
        }
        Ok(())
    }

    async fn submit_load_job(
        &self,
        batch: &RecordBatch,
        table: &TableRef,
        _schema: &SchemaDescriptor,
        mode: WriteMode,
    ) -> Result<String, WarehouseError> {
        let mut state = self.lock();
        state.next_job += 1;
        let job_id = format!("memjob_{}", state.next_job);

        let scripted = state.scripted_failures.pop_front();
        let error = match state.tables.get(table) {
            None => Some(format!("Not found: Table {table}")),
            Some(existing) => Self::validate(existing, batch),
        }
        .or(scripted);

        let remaining_polls = state.polls_before_done;
        debug!(
            job_id = %job_id,
            table = %table,
            mode = ?mode,
            rows = batch.num_rows(),
            "memory: load submitted"
        );
        state.jobs.insert(
            job_id.clone(),
            MemoryJob {
                table: table.clone(),
                batch: batch.clone(),
                remaining_polls,
                error,
                done: false,
                status_calls: 0,
                cancel_requested: false,
            },
        );
        Ok(job_id)
    }

    async fn get_job_status(&self, job_id: &str) -> Result<LoadJobRecord, WarehouseError> {
        let mut guard = self.lock();
        let state = &mut *guard;
        if let Some(message) = state.status_failures.pop_front() {
            return Err(WarehouseError::Api {
                status: 503,
                message,
            });
        }
        let job = state
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| WarehouseError::NotFound(format!("job {job_id}")))?;
        job.status_calls += 1;

        if !job.done {
            if job.remaining_polls > 0 {
                job.remaining_polls -= 1;
                return Ok(LoadJobRecord {
                    job_id: job_id.to_string(),
                    state: JobState::Running,
                    error: None,
                });
            }
            job.done = true;
            if job.error.is_none() {
                match state.tables.get_mut(&job.table) {
                    Some(table) => table.batches.push(job.batch.clone()),
                    None => job.error = Some(format!("Not found: Table {}", job.table)),
                }
            }
        }

        Ok(LoadJobRecord {
            job_id: job_id.to_string(),
            state: JobState::Done,
            error: job.error.clone(),
        })
    }

    async fn cancel_job(&self, job_id: &str) -> Result<(), WarehouseError> {
        let mut guard = self.lock();
        let state = &mut *guard;
        let job = state
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| WarehouseError::NotFound(format!("job {job_id}")))?;
        job.cancel_requested = true;
        if !job.done && !state.cancel_is_advisory {
            job.done = true;
            job.error = Some("Job cancelled".to_string());
        }
        Ok(())
    }
}
