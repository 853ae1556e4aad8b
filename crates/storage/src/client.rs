//! Object storage client trait.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

use crate::error::StorageError;

/// Minimal bucket/object operations the ingestion pipeline needs.
///
/// Object names are bucket-relative keys. Implementations must be safe to
/// share across tasks; the pipeline itself calls them sequentially.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Lazily enumerate object names in `bucket`.
    ///
    /// The stream is single-pass. Calling again re-enumerates the bucket as it
    /// is at that moment, so objects moved away in the meantime are not seen.
    fn list_objects(&self, bucket: &str) -> BoxStream<'static, Result<String, StorageError>>;

    /// Read the full content of an object.
    async fn read_object(&self, bucket: &str, name: &str) -> Result<Bytes, StorageError>;

    /// Copy `src_bucket/name` to `dst_bucket/name`. Returns once the
    /// destination write is confirmed.
    async fn copy_object(
        &self,
        src_bucket: &str,
        name: &str,
        dst_bucket: &str,
    ) -> Result<(), StorageError>;

    async fn delete_object(&self, bucket: &str, name: &str) -> Result<(), StorageError>;

    async fn object_exists(&self, bucket: &str, name: &str) -> Result<bool, StorageError>;
}
