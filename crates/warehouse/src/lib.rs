pub mod bigquery;
pub mod client;
pub mod error;
pub mod memory;
pub mod parquet;
pub mod poll;

pub use bigquery::BigQueryClient;
pub use client::{DatasetRef, JobState, LoadJobRecord, TableRef, Warehouse, WriteMode};
pub use error::WarehouseError;
pub use memory::{MemoryTable, MemoryWarehouse};
pub use parquet::encode_parquet;
pub use poll::{wait_for_job, PollPolicy};
