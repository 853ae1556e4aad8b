//! BigQuery REST (v2) warehouse client.
//!
//! Provides [`BigQueryClient`] for dataset/table provisioning and load jobs.
//! Batches are uploaded as Parquet in a multipart request; job status is
//! fetched with `jobs.get`. Authentication is a bearer token obtained outside
//! this process.

use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use bucketlog_core::config::GcpConfig;
use bucketlog_core::SchemaDescriptor;

use crate::client::{DatasetRef, JobState, LoadJobRecord, TableRef, Warehouse, WriteMode};
use crate::error::WarehouseError;
use crate::parquet::encode_parquet;

const MULTIPART_BOUNDARY: &str = "bucketlog_load_boundary";

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobResource {
    job_reference: JobReference,
    #[serde(default)]
    status: Option<JobStatus>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    job_id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobStatus {
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    error_result: Option<ErrorProto>,
}

#[derive(Debug, Deserialize)]
struct ErrorProto {
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl ErrorProto {
    fn describe(&self) -> String {
        match (&self.reason, &self.message) {
            (Some(r), Some(m)) => format!("{r}: {m}"),
            (None, Some(m)) => m.clone(),
            (Some(r), None) => r.clone(),
            (None, None) => "unknown error".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Warehouse client for Google BigQuery.
pub struct BigQueryClient {
    http: reqwest::Client,
    base_url: String,
    /// Project that runs load jobs.
    project: String,
    location: String,
    token: String,
}

impl BigQueryClient {
    /// Build a client for the deploy project in `gcp`.
    ///
    /// Returns [`WarehouseError::NotConfigured`] when the project or token
    /// is missing.
    pub fn new(gcp: &GcpConfig, location: &str) -> Result<Self, WarehouseError> {
        if gcp.deploy_project_id.is_empty() {
            return Err(WarehouseError::NotConfigured("DEPLOY_PROJECT_ID not set".into()));
        }
        let token = gcp
            .access_token
            .clone()
            .ok_or_else(|| WarehouseError::NotConfigured("GCP_ACCESS_TOKEN not set".into()))?;

        let http = reqwest::Client::builder().build()?;

        info!(
            project = %gcp.deploy_project_id,
            location = %location,
            base_url = %gcp.bigquery_base_url,
            "BigQueryClient initialised"
        );

        Ok(Self {
            http,
            base_url: gcp.bigquery_base_url.trim_end_matches('/').to_string(),
            project: gcp.deploy_project_id.clone(),
            location: location.to_string(),
            token,
        })
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/bigquery/v2/{}", self.base_url, path)
    }

    fn dataset_path(dataset: &DatasetRef) -> String {
        format!("projects/{}/datasets/{}", dataset.project, dataset.dataset)
    }

    fn table_path(table: &TableRef) -> String {
        format!(
            "projects/{}/datasets/{}/tables/{}",
            table.project, table.dataset, table.table
        )
    }

    /// `GET` a resource and report whether it exists.
    async fn exists(&self, path: &str) -> Result<bool, WarehouseError> {
        let resp = self
            .http
            .get(self.api_url(path))
            .bearer_auth(&self.token)
            .send()
            .await?;
        match resp.status() {
            StatusCode::NOT_FOUND => Ok(false),
            s if s.is_success() => Ok(true),
            _ => Err(api_error(resp).await),
        }
    }

    async fn insert(&self, path: &str, body: &Value, what: String) -> Result<(), WarehouseError> {
        let resp = self
            .http
            .post(self.api_url(path))
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await?;
        match resp.status() {
            StatusCode::CONFLICT => Err(WarehouseError::AlreadyExists(what)),
            s if s.is_success() => Ok(()),
            _ => Err(api_error(resp).await),
        }
    }

    fn job_record(job: JobResource) -> LoadJobRecord {
        let status = job.status.unwrap_or_default();
        let state = status
            .state
            .as_deref()
            .map(JobState::parse)
            .unwrap_or(JobState::Pending);
        LoadJobRecord {
            job_id: job.job_reference.job_id,
            state,
            error: status.error_result.map(|e| e.describe()),
        }
    }
}

/// Turn a non-success response into [`WarehouseError::Api`], pulling the
/// message out of the standard `{"error": {"message": ..}}` envelope.
async fn api_error(resp: Response) -> WarehouseError {
    let status = resp.status().as_u16();
    let text = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<Value>(&text)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or(text);
    WarehouseError::Api { status, message }
}

pub(crate) fn schema_json(schema: &SchemaDescriptor) -> Value {
    json!({ "fields": schema.fields })
}

pub(crate) fn table_body(
    table: &TableRef,
    schema: &SchemaDescriptor,
    partition_field: &str,
) -> Value {
    json!({
        "tableReference": {
            "projectId": table.project,
            "datasetId": table.dataset,
            "tableId": table.table,
        },
        "schema": schema_json(schema),
        "timePartitioning": { "type": "DAY", "field": partition_field },
    })
}

pub(crate) fn load_job_body(
    job_id: &str,
    project: &str,
    location: &str,
    table: &TableRef,
    schema: &SchemaDescriptor,
    mode: WriteMode,
) -> Value {
    json!({
        "jobReference": { "projectId": project, "jobId": job_id, "location": location },
        "configuration": {
            "load": {
                "destinationTable": {
                    "projectId": table.project,
                    "datasetId": table.dataset,
                    "tableId": table.table,
                },
                "sourceFormat": "PARQUET",
                "writeDisposition": mode.as_disposition(),
                "schema": schema_json(schema),
            }
        }
    })
}

/// `multipart/related` body: JSON job resource followed by the media.
pub(crate) fn multipart_body(metadata: &Value, media: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(media.len() + 1024);
    body.extend_from_slice(format!("--{MULTIPART_BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(b"Content-Type: application/json; charset=UTF-8\r\n\r\n");
    body.extend_from_slice(metadata.to_string().as_bytes());
    body.extend_from_slice(format!("\r\n--{MULTIPART_BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(media);
    body.extend_from_slice(format!("\r\n--{MULTIPART_BOUNDARY}--\r\n").as_bytes());
    body
}

#[async_trait]
impl Warehouse for BigQueryClient {
    async fn dataset_exists(&self, dataset: &DatasetRef) -> Result<bool, WarehouseError> {
        self.exists(&Self::dataset_path(dataset)).await
    }

    async fn create_dataset(
        &self,
        dataset: &DatasetRef,
        location: &str,
    ) -> Result<(), WarehouseError> {
        let body = json!({
            "datasetReference": { "projectId": dataset.project, "datasetId": dataset.dataset },
            "location": location,
        });
        self.insert(
            &format!("projects/{}/datasets", dataset.project),
            &body,
            dataset.to_string(),
        )
        .await?;
        info!(dataset = %dataset, location = %location, "Created dataset");
        Ok(())
    }

    async fn table_exists(&self, table: &TableRef) -> Result<bool, WarehouseError> {
        self.exists(&Self::table_path(table)).await
    }

    async fn create_table(
        &self,
        table: &TableRef,
        schema: &SchemaDescriptor,
        partition_field: &str,
    ) -> Result<(), WarehouseError> {
        self.insert(
            &format!("{}/tables", Self::dataset_path(&table.dataset_ref())),
            &table_body(table, schema, partition_field),
            table.to_string(),
        )
        .await?;
        info!(table = %table, partition_field = %partition_field, "Created table");
        Ok(())
    }

    async fn delete_table(&self, table: &TableRef) -> Result<(), WarehouseError> {
        let resp = self
            .http
            .delete(self.api_url(&Self::table_path(table)))
            .bearer_auth(&self.token)
            .send()
            .await?;
        match resp.status() {
            StatusCode::NOT_FOUND => {
                info!(table = %table, "Table was not present");
                Ok(())
            }
            s if s.is_success() => {
                info!(table = %table, "Table deleted");
                Ok(())
            }
            _ => Err(api_error(resp).await),
        }
    }

    async fn submit_load_job(
        &self,
        batch: &RecordBatch,
        table: &TableRef,
        schema: &SchemaDescriptor,
        mode: WriteMode,
    ) -> Result<String, WarehouseError> {
        let job_id = format!("bucketlog_{}", uuid::Uuid::new_v4().simple());
        let metadata = load_job_body(&job_id, &self.project, &self.location, table, schema, mode);
        let media = encode_parquet(batch)?;
        let body = multipart_body(&metadata, &media);

        let url = format!(
            "{}/upload/bigquery/v2/projects/{}/jobs?uploadType=multipart",
            self.base_url, self.project
        );
        let resp = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .header(
                CONTENT_TYPE,
                format!("multipart/related; boundary={MULTIPART_BOUNDARY}"),
            )
            .body(body)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(api_error(resp).await);
        }

        let job: JobResource = resp
            .json()
            .await
            .map_err(|e| WarehouseError::Parse(e.to_string()))?;
        info!(
            job_id = %job.job_reference.job_id,
            table = %table,
            rows = batch.num_rows(),
            "Load job submitted"
        );
        Ok(job.job_reference.job_id)
    }

    async fn get_job_status(&self, job_id: &str) -> Result<LoadJobRecord, WarehouseError> {
        let url = self.api_url(&format!(
            "projects/{}/jobs/{}?location={}",
            self.project, job_id, self.location
        ));
        let resp = self.http.get(url).bearer_auth(&self.token).send().await?;
        if !resp.status().is_success() {
            return Err(api_error(resp).await);
        }
        let job: JobResource = resp
            .json()
            .await
            .map_err(|e| WarehouseError::Parse(e.to_string()))?;
        let record = Self::job_record(job);
        debug!(job_id = %job_id, state = ?record.state, "Fetched job status");
        Ok(record)
    }

    async fn cancel_job(&self, job_id: &str) -> Result<(), WarehouseError> {
        info!(job_id = %job_id, "Cancelling load job");
        let url = self.api_url(&format!(
            "projects/{}/jobs/{}/cancel?location={}",
            self.project, job_id, self.location
        ));
        let resp = self.http.post(url).bearer_auth(&self.token).send().await?;
        if !resp.status().is_success() {
            let err = api_error(resp).await;
            warn!(job_id = %job_id, error = %err, "Job cancellation failed");
            return Err(err);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests: request/response shapes only, no network calls
// ---------------------------------------------------------------------------
