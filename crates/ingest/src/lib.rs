pub mod classify;
pub mod commit;
pub mod error;
pub mod orchestrator;
pub mod provision;
pub mod schema;
pub mod transform;

pub use classify::{classify, ClassificationError, SourceFile, SourceKind};
pub use commit::{ArchiveTarget, CommitError, CommitOutcome, Committer};
pub use error::IngestError;
pub use orchestrator::{Orchestrator, RunReport, TenantReport};
pub use provision::Provisioner;
pub use schema::{describe, storage_schema, usage_schema, RecordKind};
pub use transform::{transform, IngestBatch, TransformError};
