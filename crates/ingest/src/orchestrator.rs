//! One ingestion pass over every configured tenant.
//!
//! Tenants are processed in configuration order, one file at a time. The
//! first failure ends the pass: the remaining files of that tenant stay in
//! the source bucket and later tenants are not started.

use std::sync::Arc;

use futures::StreamExt;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use bucketlog_core::config::IngestConfig;
use bucketlog_core::{Config, TenantContext};
use bucketlog_storage::ObjectStorage;
use bucketlog_warehouse::{DatasetRef, PollPolicy, TableRef, Warehouse};

use crate::classify::{classify, SourceKind};
use crate::commit::{ArchiveTarget, Committer};
use crate::error::IngestError;
use crate::provision::Provisioner;
use crate::schema::{describe, RecordKind};
use crate::transform::transform;

/// Per-tenant counters for one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TenantReport {
    pub project: String,
    pub tag: String,
    pub usage_files: usize,
    pub storage_files: usize,
    /// Listed names of neither kind, left in place.
    pub skipped_files: usize,
    pub rows_loaded: usize,
}

impl TenantReport {
    fn new(tenant: &TenantContext) -> Self {
        Self {
            project: tenant.project_id.clone(),
            tag: tenant.tag.clone(),
            ..Default::default()
        }
    }

    pub fn files_loaded(&self) -> usize {
        self.usage_files + self.storage_files
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub tenants: Vec<TenantReport>,
}

impl RunReport {
    pub fn files_loaded(&self) -> usize {
        self.tenants.iter().map(TenantReport::files_loaded).sum()
    }

    pub fn rows_loaded(&self) -> usize {
        self.tenants.iter().map(|t| t.rows_loaded).sum()
    }
}

/// Bounds how many listed names one tenant consumes per pass.
///
/// The default admits `cap + 1` names: the count is compared with `>`
/// before it is incremented. `strict` admits exactly `cap`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FileBudget {
    cap: usize,
    strict: bool,
    taken: usize,
}

impl FileBudget {
    pub(crate) fn new(cap: usize, strict: bool) -> Self {
        Self { cap, strict, taken: 0 }
    }

    /// Claim a slot for the next listed name; `false` ends the listing.
    pub(crate) fn try_take(&mut self) -> bool {
        let exhausted = if self.strict {
            self.taken >= self.cap
        } else {
            self.taken > self.cap
        };
        if exhausted {
            return false;
        }
        self.taken += 1;
        true
    }
}

/// Destination tables resolved for one tenant.
struct TenantTables {
    usage: TableRef,
    storage: TableRef,
}

impl TenantTables {
    fn for_kind(&self, kind: RecordKind) -> &TableRef {
        match kind {
            RecordKind::Usage => &self.usage,
            RecordKind::Storage => &self.storage,
        }
    }
}

pub struct Orchestrator {
    config: IngestConfig,
    /// Project that owns every tenant's dataset.
    deploy_project: String,
    storage: Arc<dyn ObjectStorage>,
    provisioner: Provisioner,
    committer: Committer,
}

impl Orchestrator {
    pub fn new(
        config: IngestConfig,
        deploy_project: impl Into<String>,
        warehouse: Arc<dyn Warehouse>,
        storage: Arc<dyn ObjectStorage>,
    ) -> Self {
        let policy = PollPolicy::from_secs(config.poll_interval_secs, config.job_timeout_secs);
        Self {
            provisioner: Provisioner::new(warehouse.clone(), config.location.clone()),
            committer: Committer::new(warehouse, storage.clone(), policy),
            deploy_project: deploy_project.into(),
            storage,
            config,
        }
    }

    pub fn from_config(
        config: &Config,
        warehouse: Arc<dyn Warehouse>,
        storage: Arc<dyn ObjectStorage>,
    ) -> Self {
        Self::new(
            config.ingest.clone(),
            config.gcp.deploy_project_id.clone(),
            warehouse,
            storage,
        )
    }

    /// Run every tenant in order, stopping at the first failure.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<RunReport, IngestError> {
        if self.config.tenants.is_empty() {
            warn!("No tenants configured, nothing to ingest");
        }

        let mut report = RunReport::default();
        for tenant in &self.config.tenants {
            match self.run_tenant(tenant, cancel).await {
                Ok(tenant_report) => report.tenants.push(tenant_report),
                Err(e) => {
                    error!(tenant = %tenant, error = %e, "Tenant ingest failed, aborting pass");
                    return Err(e);
                }
            }
        }

        info!(
            tenants = report.tenants.len(),
            files = report.files_loaded(),
            rows = report.rows_loaded(),
            "Ingest pass complete"
        );
        Ok(report)
    }

    /// Provision, then load and archive up to the per-run cap of files for
    /// one tenant.
    pub async fn run_tenant(
        &self,
        tenant: &TenantContext,
        cancel: &CancellationToken,
    ) -> Result<TenantReport, IngestError> {
        let dataset = DatasetRef::new(&self.deploy_project, self.config.dataset_for(tenant));
        let source_bucket = self.config.source_bucket_for(tenant);
        let archive_bucket = self.config.archive_bucket_for(tenant);
        info!(
            tenant = %tenant,
            dataset = %dataset,
            source = %source_bucket,
            archive = %archive_bucket,
            "Starting tenant ingest"
        );

        let usage = self
            .provision(&dataset, &self.config.usage_table, RecordKind::Usage)
            .await?;
        let storage = self
            .provision(&dataset, &self.config.storage_table, RecordKind::Storage)
            .await?;
        let tables = TenantTables { usage, storage };

        let target = ArchiveTarget {
            source_bucket: &source_bucket,
            archive_bucket: &archive_bucket,
        };
        let mut report = TenantReport::new(tenant);
        let mut budget = FileBudget::new(self.config.files_per_run, self.config.strict_file_cap);
        let mut names = self.storage.list_objects(&source_bucket);

        while let Some(name) = names.next().await {
            let name = name?;
            if !budget.try_take() {
                debug!(tenant = %tenant, cap = self.config.files_per_run, "File cap reached");
                break;
            }
            if cancel.is_cancelled() {
                return Err(IngestError::Cancelled);
            }

            let file = classify(&name)?;
            let Some(kind) = file.kind.record_kind() else {
                debug!(file = %name, "Skipping file of unknown kind");
                report.skipped_files += 1;
                continue;
            };

            let data = self.storage.read_object(&source_bucket, &name).await?;
            let batch = transform(&file, data).map_err(|source| IngestError::Transform {
                file: name.clone(),
                source,
            })?;

            let outcome = match self
                .committer
                .commit(&batch, tables.for_kind(kind), target, cancel)
                .await
            {
                Ok(outcome) => outcome,
                Err(e) if e.is_cancelled() => return Err(IngestError::Cancelled),
                Err(e) => return Err(e.into()),
            };

            match file.kind {
                SourceKind::Usage => report.usage_files += 1,
                SourceKind::Storage => report.storage_files += 1,
                SourceKind::Invalid => {}
            }
            report.rows_loaded += outcome.rows;
        }

        info!(
            tenant = %tenant,
            usage_files = report.usage_files,
            storage_files = report.storage_files,
            skipped_files = report.skipped_files,
            rows = report.rows_loaded,
            "Tenant ingest complete"
        );
        Ok(report)
    }

    async fn provision(
        &self,
        dataset: &DatasetRef,
        table: &str,
        kind: RecordKind,
    ) -> Result<TableRef, IngestError> {
        self.provisioner
            .ensure(dataset, table, &describe(kind, false), self.config.delete_first)
            .await
            .map_err(|source| IngestError::Provisioning {
                target: format!("{dataset}.{table}"),
                source,
            })
    }
}
