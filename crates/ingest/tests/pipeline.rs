//! End-to-end passes against the in-memory warehouse and in-memory buckets.

use std::sync::Arc;

use arrow::array::{Array, TimestampMicrosecondArray};
use bytes::Bytes;
use futures::TryStreamExt;
use tokio_util::sync::CancellationToken;

use bucketlog_core::config::IngestConfig;
use bucketlog_core::{FieldType, TenantContext};
use bucketlog_ingest::{usage_schema, CommitError, IngestError, Orchestrator};
use bucketlog_storage::{BucketStore, ObjectStorage};
use bucketlog_warehouse::{DatasetRef, MemoryWarehouse, TableRef};

const DEPLOY: &str = "deploy-proj";

fn ingest_config(tenants: Vec<TenantContext>, files_per_run: usize) -> IngestConfig {
    IngestConfig {
        dataset_base: "storage_logs_".into(),
        usage_table: "usage".into(),
        storage_table: "storage".into(),
        source_bucket_template: "{project}-access-logs".into(),
        archive_bucket_template: "{project}-access-logs-archive".into(),
        location: "US".into(),
        delete_first: false,
        files_per_run,
        strict_file_cap: false,
        poll_interval_secs: 0,
        job_timeout_secs: None,
        tenants,
    }
}

/// Usage CSV in the exporter's shape: quoted header and values.
fn usage_csv(first_micros: i64, rows: usize) -> Bytes {
    let read = usage_schema(true);
    let quote = |s: &str| format!("\"{s}\"");
    let mut out = read.field_names().iter().map(|n| quote(n)).collect::<Vec<_>>().join(",");
    out.push('\n');
    for i in 0..rows {
        let row: Vec<String> = read
            .fields
            .iter()
            .map(|f| match (f.name.as_str(), f.field_type) {
                ("time_micros", _) => quote(&(first_micros + i as i64).to_string()),
                ("c_ip_region", _) | ("cs_referer", _) => String::new(),
                ("c_ip_type", _) => quote("1"),
                ("sc_status", _) => quote("200"),
                (_, FieldType::Integer) => quote(&(i * 10).to_string()),
                (name, _) => quote(&format!("{name}-{i}")),
            })
            .collect();
        out.push_str(&row.join(","));
        out.push('\n');
    }
    Bytes::from(out)
}

fn storage_csv() -> Bytes {
    Bytes::from("\"bucket\",\"storage_byte_hours\"\n\"my-bucket\",\"2400\"\n")
}

fn usage_name(hour: u32) -> String {
    format!("my-bucket_usage_2023_05_02_{hour:02}_00_00_00c3_v0")
}

struct Harness {
    wh: Arc<MemoryWarehouse>,
    store: Arc<BucketStore>,
}

impl Harness {
    fn new() -> Self {
        Self {
            wh: Arc::new(MemoryWarehouse::new()),
            store: Arc::new(BucketStore::memory()),
        }
    }

    fn orchestrator(&self, config: IngestConfig) -> Orchestrator {
        Orchestrator::new(config, DEPLOY, self.wh.clone(), self.store.clone())
    }

    async fn seed(&self, bucket: &str, name: &str, data: Bytes) {
        self.store.put_object(bucket, name, data).await.unwrap();
    }

    async fn names(&self, bucket: &str) -> Vec<String> {
        let mut names: Vec<String> = self.store.list_objects(bucket).try_collect().await.unwrap();
        names.sort();
        names
    }

    fn table(&self, tag: &str, table: &str) -> TableRef {
        DatasetRef::new(DEPLOY, format!("storage_logs_{tag}")).table(table)
    }
}

#[tokio::test]
async fn single_usage_file_is_loaded_and_archived() {
    let h = Harness::new();
    let name = usage_name(14);
    h.seed("proj-a-access-logs", &name, usage_csv(1_000_000, 10)).await;

    let orchestrator = h.orchestrator(ingest_config(vec![TenantContext::new("proj-a", "a")], 100));
    let report = orchestrator.run(&CancellationToken::new()).await.unwrap();

    assert_eq!(report.tenants.len(), 1);
    assert_eq!(report.tenants[0].usage_files, 1);
    assert_eq!(report.rows_loaded(), 10);

    let usage = h.wh.table(&h.table("a", "usage")).unwrap();
    assert_eq!(usage.row_count(), 10);
    let times = usage.batches[0]
        .column(0)
        .as_any()
        .downcast_ref::<TimestampMicrosecondArray>()
        .unwrap();
    assert_eq!(times.timezone(), Some("UTC"));
    assert_eq!(times.value(0), 1_000_000);
    assert_eq!(times.value(9), 1_000_009);
    assert_eq!(times.null_count(), 0);

    assert_eq!(h.wh.row_count(&h.table("a", "storage")), 0);
    assert_eq!(h.names("proj-a-access-logs-archive").await, vec![name]);
    assert!(h.names("proj-a-access-logs").await.is_empty());
}

#[tokio::test]
async fn file_cap_admits_one_extra_file() {
    let h = Harness::new();
    for hour in 0..5 {
        h.seed("proj-a-access-logs", &usage_name(hour), usage_csv(hour as i64, 2)).await;
    }

    let orchestrator = h.orchestrator(ingest_config(vec![TenantContext::new("proj-a", "a")], 2));
    let report = orchestrator.run(&CancellationToken::new()).await.unwrap();

    assert_eq!(report.files_loaded(), 3);
    assert_eq!(h.wh.row_count(&h.table("a", "usage")), 6);
    assert_eq!(h.names("proj-a-access-logs-archive").await.len(), 3);
    assert_eq!(
        h.names("proj-a-access-logs").await,
        vec![usage_name(3), usage_name(4)]
    );

    // The next pass picks up the remainder.
    let report = orchestrator.run(&CancellationToken::new()).await.unwrap();
    assert_eq!(report.files_loaded(), 2);
    assert!(h.names("proj-a-access-logs").await.is_empty());
}

#[tokio::test]
async fn strict_cap_admits_exactly_cap() {
    let h = Harness::new();
    for hour in 0..5 {
        h.seed("proj-a-access-logs", &usage_name(hour), usage_csv(0, 1)).await;
    }

    let mut config = ingest_config(vec![TenantContext::new("proj-a", "a")], 2);
    config.strict_file_cap = true;
    let report = h.orchestrator(config).run(&CancellationToken::new()).await.unwrap();

    assert_eq!(report.files_loaded(), 2);
    assert_eq!(h.names("proj-a-access-logs").await.len(), 3);
}

#[tokio::test]
async fn usage_and_storage_files_route_to_their_tables() {
    let h = Harness::new();
    let storage_name = "my-bucket_storage_2023_05_02_07_00_00_0ab1_v0";
    h.seed("proj-a-access-logs", &usage_name(1), usage_csv(5, 3)).await;
    h.seed("proj-a-access-logs", storage_name, storage_csv()).await;
    h.seed("proj-a-access-logs", "my-bucket_other_report_v0", Bytes::from("x\n1\n")).await;

    let orchestrator = h.orchestrator(ingest_config(vec![TenantContext::new("proj-a", "a")], 100));
    let report = orchestrator.run(&CancellationToken::new()).await.unwrap();

    let tenant = &report.tenants[0];
    assert_eq!(tenant.usage_files, 1);
    assert_eq!(tenant.storage_files, 1);
    assert_eq!(tenant.skipped_files, 1);
    assert_eq!(h.wh.row_count(&h.table("a", "usage")), 3);
    assert_eq!(h.wh.row_count(&h.table("a", "storage")), 1);

    // Unrecognised kinds stay behind.
    assert_eq!(
        h.names("proj-a-access-logs").await,
        vec!["my-bucket_other_report_v0".to_string()]
    );
}

#[tokio::test]
async fn missing_suffix_aborts_the_pass() {
    let h = Harness::new();
    // Listing is name-ordered, so the bad name comes first.
    h.seed("proj-a-access-logs", "a_usage_2023_05_02_00_00_00_00_v1", usage_csv(0, 1)).await;
    h.seed("proj-a-access-logs", &usage_name(1), usage_csv(0, 1)).await;

    let orchestrator = h.orchestrator(ingest_config(
        vec![TenantContext::new("proj-a", "a"), TenantContext::new("proj-b", "b")],
        100,
    ));
    let err = orchestrator.run(&CancellationToken::new()).await.unwrap_err();

    assert!(matches!(err, IngestError::Classification(_)));
    assert_eq!(h.names("proj-a-access-logs").await.len(), 2);
    assert_eq!(h.wh.job_count(), 0);
    // The second tenant never started.
    assert!(h.wh.table(&h.table("b", "usage")).is_none());
}

#[tokio::test]
async fn failed_load_stops_tenant_and_keeps_file() {
    let h = Harness::new();
    h.seed("proj-a-access-logs", &usage_name(1), usage_csv(0, 2)).await;
    h.seed("proj-a-access-logs", &usage_name(2), usage_csv(0, 2)).await;
    h.wh.fail_next_load("Provided Schema does not match Table");

    let orchestrator = h.orchestrator(ingest_config(vec![TenantContext::new("proj-a", "a")], 100));
    let err = orchestrator.run(&CancellationToken::new()).await.unwrap_err();

    assert!(matches!(err, IngestError::Commit(CommitError::LoadFailed { .. })));
    assert_eq!(h.wh.job_count(), 1);
    assert_eq!(h.wh.row_count(&h.table("a", "usage")), 0);
    assert_eq!(h.names("proj-a-access-logs").await.len(), 2);
    assert!(h.names("proj-a-access-logs-archive").await.is_empty());
}

#[tokio::test]
async fn tenants_get_their_own_datasets_in_deploy_project() {
    let h = Harness::new();
    h.seed("proj-a-access-logs", &usage_name(1), usage_csv(0, 1)).await;
    h.seed("proj-b-access-logs", &usage_name(1), usage_csv(0, 4)).await;

    let orchestrator = h.orchestrator(ingest_config(
        vec![TenantContext::new("proj-a", "a"), TenantContext::new("proj-b", "b")],
        100,
    ));
    let report = orchestrator.run(&CancellationToken::new()).await.unwrap();

    assert_eq!(report.tenants.len(), 2);
    assert_eq!(report.tenants[1].project, "proj-b");
    assert_eq!(h.wh.dataset_count(), 2);
    assert_eq!(h.wh.row_count(&h.table("a", "usage")), 1);
    assert_eq!(h.wh.row_count(&h.table("b", "usage")), 4);
}

#[tokio::test]
async fn cancelled_token_stops_before_first_file() {
    let h = Harness::new();
    h.seed("proj-a-access-logs", &usage_name(1), usage_csv(0, 1)).await;

    let cancel = CancellationToken::new();
    cancel.cancel();
    let orchestrator = h.orchestrator(ingest_config(vec![TenantContext::new("proj-a", "a")], 100));
    let err = orchestrator.run(&cancel).await.unwrap_err();

    assert!(matches!(err, IngestError::Cancelled));
    assert_eq!(h.names("proj-a-access-logs").await.len(), 1);
}

#[tokio::test]
async fn job_finishing_after_deadline_is_archived_not_reloaded() {
    let h = Harness::new();
    h.seed("proj-a-access-logs", &usage_name(1), usage_csv(0, 1)).await;
    h.wh.set_polls_before_done(1);
    h.wh.set_cancel_is_advisory(true);

    let mut config = ingest_config(vec![TenantContext::new("proj-a", "a")], 100);
    config.job_timeout_secs = Some(0);
    let orchestrator = h.orchestrator(config);

    let report = orchestrator.run(&CancellationToken::new()).await.unwrap();
    assert_eq!(report.files_loaded(), 1);
    assert!(h.names("proj-a-access-logs").await.is_empty());

    // A second pass finds nothing to load again.
    let report = orchestrator.run(&CancellationToken::new()).await.unwrap();
    assert_eq!(report.files_loaded(), 0);
    assert_eq!(h.wh.row_count(&h.table("a", "usage")), 1);
}
