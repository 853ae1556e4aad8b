use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::tenant::{parse_tenant_list, zip_tenant_lists, TenantContext};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_u16(profile: &str, key: &str, default: u16) -> u16 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Like the other profiled readers, but a value that is present and does not
/// parse is reported instead of silently replaced by the default.
fn profiled_env_parse<T: FromStr>(profile: &str, key: &str, default: T) -> Result<T, ConfigError> {
    match profiled_env_opt(profile, key) {
        Some(v) => v.trim().parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value: v,
        }),
        None => Ok(default),
    }
}

fn profiled_env_bool(profile: &str, key: &str, default: bool) -> bool {
    match profiled_env_opt(profile, key) {
        Some(v) => v.eq_ignore_ascii_case("true") || v == "1",
        None => default,
    }
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub server: ServerConfig,
    pub gcp: GcpConfig,
    pub storage: StorageConfig,
    pub ingest: IngestConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `BUCKETLOG_PROFILE`. When set (e.g. `PROD`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let profile = env_or("BUCKETLOG_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Result<Self, ConfigError> {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Ok(Self {
            profile: p.to_string(),
            server: ServerConfig::from_env_profiled(p),
            gcp: GcpConfig::from_env_profiled(p),
            storage: StorageConfig::from_env_profiled(p)?,
            ingest: IngestConfig::from_env_profiled(p)?,
        })
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!("  server:   {}:{}", self.server.host, self.server.port);
        tracing::info!(
            "  gcp:      deploy_project={}, token={}",
            self.gcp.deploy_project_id,
            if self.gcp.access_token.is_some() { "set" } else { "(none)" }
        );
        tracing::info!("  storage:  backend={}", self.storage.backend);
        tracing::info!(
            "  ingest:   tenants={}, dataset_base={}, location={}, files_per_run={}, delete_first={}",
            self.ingest.tenants.len(),
            self.ingest.dataset_base,
            self.ingest.location,
            self.ingest.files_per_run,
            self.ingest.delete_first
        );
    }
}

// ── Server ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            host: profiled_env_or(p, "HOST", "0.0.0.0"),
            port: profiled_env_u16(p, "PORT", 8080),
        }
    }
}

// ── GCP ───────────────────────────────────────────────────────

pub const DEFAULT_BIGQUERY_BASE_URL: &str = "https://bigquery.googleapis.com";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GcpConfig {
    /// Project that owns the destination datasets and runs the load jobs.
    pub deploy_project_id: String,
    /// OAuth bearer token for the warehouse API. Obtained outside this process.
    #[serde(skip_serializing)]
    pub access_token: Option<String>,
    pub bigquery_base_url: String,
    /// Service account key file handed to the storage client.
    pub credentials_path: Option<PathBuf>,
}

impl GcpConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            deploy_project_id: profiled_env_or(p, "DEPLOY_PROJECT_ID", ""),
            access_token: profiled_env_opt(p, "GCP_ACCESS_TOKEN"),
            bigquery_base_url: profiled_env_or(p, "BIGQUERY_BASE_URL", DEFAULT_BIGQUERY_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            credentials_path: profiled_env_opt(p, "GOOGLE_APPLICATION_CREDENTIALS")
                .map(PathBuf::from),
        }
    }
}

// ── Object storage ────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackendKind {
    Gcs,
    Local,
    Memory,
}

impl FromStr for StorageBackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gcs" | "gs" => Ok(Self::Gcs),
            "local" | "file" => Ok(Self::Local),
            "memory" => Ok(Self::Memory),
            _ => Err(ConfigError::InvalidValue {
                key: "STORAGE_BACKEND".into(),
                value: s.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for StorageBackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Gcs => "gcs",
            Self::Local => "local",
            Self::Memory => "memory",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageBackendKind,
    /// Root directory for the local backend; each bucket is a subdirectory.
    pub local_root: PathBuf,
}

impl StorageConfig {
    fn from_env_profiled(p: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            backend: profiled_env_or(p, "STORAGE_BACKEND", "gcs").parse()?,
            local_root: PathBuf::from(profiled_env_or(p, "LOCAL_STORAGE_ROOT", "data/buckets")),
        })
    }
}

// ── Storage-log ingestion ─────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Dataset name prefix; the tenant tag is appended.
    pub dataset_base: String,
    pub usage_table: String,
    pub storage_table: String,
    /// Bucket name templates. `{project}`, `{tag}` and a bare `{}` (project) are substituted.
    pub source_bucket_template: String,
    pub archive_bucket_template: String,
    /// Warehouse location for created datasets and load jobs.
    pub location: String,
    pub delete_first: bool,
    pub files_per_run: usize,
    /// Cap at exactly `files_per_run` instead of `files_per_run + 1`.
    pub strict_file_cap: bool,
    pub poll_interval_secs: u64,
    /// `None` waits on a load job indefinitely.
    pub job_timeout_secs: Option<u64>,
    pub tenants: Vec<TenantContext>,
}

impl IngestConfig {
    fn from_env_profiled(p: &str) -> Result<Self, ConfigError> {
        let tenants = match profiled_env_opt(p, "INGEST_STORAGE_LOGS_TENANTS") {
            Some(list) => parse_tenant_list(&list)?,
            None => match (
                profiled_env_opt(p, "INGEST_STORAGE_LOGS_PROJECT_IDS"),
                profiled_env_opt(p, "INGEST_STORAGE_LOGS_PROJECT_TAGS"),
            ) {
                (Some(ids), Some(tags)) => zip_tenant_lists(&ids, &tags)?,
                (Some(ids), None) => zip_tenant_lists(&ids, "")?,
                (None, _) => Vec::new(),
            },
        };

        let job_timeout_secs: u64 =
            profiled_env_parse(p, "INGEST_STORAGE_LOGS_JOB_TIMEOUT_SECS", 0)?;

        Ok(Self {
            dataset_base: profiled_env_or(p, "INGEST_STORAGE_LOGS_DATASET_BASE", "storage_logs_"),
            usage_table: profiled_env_or(p, "INGEST_STORAGE_LOGS_USAGE_TABLE", "usage"),
            storage_table: profiled_env_or(p, "INGEST_STORAGE_LOGS_STORAGE_TABLE", "storage"),
            source_bucket_template: profiled_env_or(
                p,
                "INGEST_STORAGE_LOGS_SOURCE_BUCKET",
                "{project}-access-logs",
            ),
            archive_bucket_template: profiled_env_or(
                p,
                "INGEST_STORAGE_LOGS_ARCHIVE_BUCKET",
                "{project}-access-logs-archive",
            ),
            location: profiled_env_or(p, "INGEST_STORAGE_LOGS_LOCATION", "US"),
            delete_first: profiled_env_bool(p, "INGEST_STORAGE_LOGS_DO_DELETE_FIRST", false),
            files_per_run: profiled_env_parse(p, "INGEST_STORAGE_LOGS_FILES_PER_RUN", 100)?,
            strict_file_cap: profiled_env_bool(p, "INGEST_STORAGE_LOGS_STRICT_FILE_CAP", false),
            poll_interval_secs: profiled_env_parse(p, "INGEST_STORAGE_LOGS_POLL_INTERVAL_SECS", 5)?,
            job_timeout_secs: (job_timeout_secs > 0).then_some(job_timeout_secs),
            tenants,
        })
    }

    /// Dataset id for a tenant: the configured base with the tag appended.
    pub fn dataset_for(&self, tenant: &TenantContext) -> String {
        format!("{}{}", self.dataset_base, tenant.tag)
    }

    pub fn source_bucket_for(&self, tenant: &TenantContext) -> String {
        tenant.render(&self.source_bucket_template)
    }

    pub fn archive_bucket_for(&self, tenant: &TenantContext) -> String {
        tenant.render(&self.archive_bucket_template)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Env-based tests must run serially to avoid interfering with each other.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const INGEST_KEYS: &[&str] = &[
        "INGEST_STORAGE_LOGS_TENANTS",
        "INGEST_STORAGE_LOGS_PROJECT_IDS",
        "INGEST_STORAGE_LOGS_PROJECT_TAGS",
        "INGEST_STORAGE_LOGS_FILES_PER_RUN",
        "INGEST_STORAGE_LOGS_DO_DELETE_FIRST",
        "INGEST_STORAGE_LOGS_JOB_TIMEOUT_SECS",
        "INGEST_STORAGE_LOGS_SOURCE_BUCKET",
        "TEST_INGEST_STORAGE_LOGS_DATASET_BASE",
        "STORAGE_BACKEND",
    ];

    fn clear_env() {
        for k in INGEST_KEYS {
            env::remove_var(k);
        }
    }

    #[test]
    fn defaults_when_no_env_vars() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env();

        let cfg = IngestConfig::from_env_profiled("").unwrap();
        assert!(cfg.tenants.is_empty());
        assert_eq!(cfg.files_per_run, 100);
        assert_eq!(cfg.poll_interval_secs, 5);
        assert!(cfg.job_timeout_secs.is_none());
        assert!(!cfg.delete_first);
        assert!(!cfg.strict_file_cap);
    }

    #[test]
    fn legacy_parallel_lists_are_zipped() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env();

        env::set_var("INGEST_STORAGE_LOGS_PROJECT_IDS", "proj-a,proj-b");
        env::set_var("INGEST_STORAGE_LOGS_PROJECT_TAGS", "a,b");

        let cfg = IngestConfig::from_env_profiled("").unwrap();
        assert_eq!(cfg.tenants.len(), 2);
        assert_eq!(cfg.tenants[1].project_id, "proj-b");
        assert_eq!(cfg.tenants[1].tag, "b");

        clear_env();
    }

    #[test]
    fn mismatched_lists_are_rejected() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env();

        env::set_var("INGEST_STORAGE_LOGS_PROJECT_IDS", "proj-a,proj-b,proj-c");
        env::set_var("INGEST_STORAGE_LOGS_PROJECT_TAGS", "a,b");

        let err = IngestConfig::from_env_profiled("").unwrap_err();
        assert!(matches!(err, ConfigError::TenantArity { ids: 3, tags: 2 }));

        clear_env();
    }

    #[test]
    fn tenant_sequence_wins_over_lists() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env();

        env::set_var("INGEST_STORAGE_LOGS_TENANTS", "p1:one");
        env::set_var("INGEST_STORAGE_LOGS_PROJECT_IDS", "ignored");

        let cfg = IngestConfig::from_env_profiled("").unwrap();
        assert_eq!(cfg.tenants, vec![TenantContext::new("p1", "one")]);

        clear_env();
    }

    #[test]
    fn delete_first_accepts_capitalised_true() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env();

        env::set_var("INGEST_STORAGE_LOGS_DO_DELETE_FIRST", "True");
        let cfg = IngestConfig::from_env_profiled("").unwrap();
        assert!(cfg.delete_first);

        clear_env();
    }

    #[test]
    fn unparseable_file_cap_is_an_error() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env();

        env::set_var("INGEST_STORAGE_LOGS_FILES_PER_RUN", "lots");
        let err = IngestConfig::from_env_profiled("").unwrap_err();
        assert!(err.to_string().contains("INGEST_STORAGE_LOGS_FILES_PER_RUN"));

        clear_env();
    }

    #[test]
    fn profiled_env_takes_precedence() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env();

        env::set_var("TEST_INGEST_STORAGE_LOGS_DATASET_BASE", "test_logs_");
        let cfg = IngestConfig::from_env_profiled("TEST").unwrap();
        assert_eq!(cfg.dataset_base, "test_logs_");

        clear_env();
    }

    #[test]
    fn names_are_composed_per_tenant() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env();

        env::set_var("INGEST_STORAGE_LOGS_SOURCE_BUCKET", "{}-logs");
        let cfg = IngestConfig::from_env_profiled("").unwrap();
        let tenant = TenantContext::new("isb-cgc", "cgc");

        assert_eq!(cfg.dataset_for(&tenant), "storage_logs_cgc");
        assert_eq!(cfg.source_bucket_for(&tenant), "isb-cgc-logs");
        assert_eq!(cfg.archive_bucket_for(&tenant), "isb-cgc-access-logs-archive");

        clear_env();
    }

    #[test]
    fn storage_backend_parsing() {
        assert_eq!("GCS".parse::<StorageBackendKind>().unwrap(), StorageBackendKind::Gcs);
        assert_eq!("memory".parse::<StorageBackendKind>().unwrap(), StorageBackendKind::Memory);
        assert!("ftp".parse::<StorageBackendKind>().is_err());
    }
}
