//! Idempotent dataset and table provisioning.

use std::sync::Arc;

use tracing::info;

use bucketlog_core::SchemaDescriptor;
use bucketlog_warehouse::{DatasetRef, TableRef, Warehouse, WarehouseError};

use crate::schema::TIME_FIELD;

/// Ensures destination datasets and day-partitioned tables exist.
pub struct Provisioner {
    warehouse: Arc<dyn Warehouse>,
    location: String,
}

impl Provisioner {
    pub fn new(warehouse: Arc<dyn Warehouse>, location: impl Into<String>) -> Self {
        Self {
            warehouse,
            location: location.into(),
        }
    }

    /// Make sure `dataset.table` exists with `schema`, partitioned by day on
    /// the `time` field. With `delete_first` an existing table is dropped and
    /// recreated. Safe to call on every pass; a concurrent creator winning
    /// the race is not an error.
    pub async fn ensure(
        &self,
        dataset: &DatasetRef,
        table: &str,
        schema: &SchemaDescriptor,
        delete_first: bool,
    ) -> Result<TableRef, WarehouseError> {
        if !self.warehouse.dataset_exists(dataset).await? {
            match self.warehouse.create_dataset(dataset, &self.location).await {
                Ok(()) => {
                    info!(dataset = %dataset, location = %self.location, "Provisioned dataset")
                }
                Err(WarehouseError::AlreadyExists(_)) => {}
                Err(e) => return Err(e),
            }
        }

        let table = dataset.table(table);

        if delete_first && self.warehouse.table_exists(&table).await? {
            self.warehouse.delete_table(&table).await?;
            info!(table = %table, "Deleted table before recreation");
        }

        if !self.warehouse.table_exists(&table).await? {
            match self.warehouse.create_table(&table, schema, TIME_FIELD).await {
                Ok(()) => info!(table = %table, fields = schema.fields.len(), "Provisioned table"),
                Err(WarehouseError::AlreadyExists(_)) => {}
                Err(e) => return Err(e),
            }
        }

        Ok(table)
    }
}
