use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use object_store::gcp::GoogleCloudStorageBuilder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path;
use object_store::{ObjectStore, PutPayload};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use bucketlog_core::config::{GcpConfig, StorageBackendKind, StorageConfig};

use crate::client::ObjectStorage;
use crate::error::StorageError;

/// Listing results buffered ahead of the consumer.
const LIST_BUFFER: usize = 64;

/// Where bucket contents live.
#[derive(Debug, Clone)]
pub enum StorageBackend {
    /// Google Cloud Storage, one client per bucket.
    Gcs { credentials_path: Option<PathBuf> },
    /// Local filesystem; each bucket is a subdirectory of `root`.
    Local { root: PathBuf },
    /// Process-local in-memory buckets.
    Memory,
}

/// [`ObjectStorage`] over `object_store`, with one store per bucket built on
/// first use and cached for the lifetime of the client.
pub struct BucketStore {
    backend: StorageBackend,
    stores: Mutex<HashMap<String, Arc<dyn ObjectStore>>>,
}

impl BucketStore {
    pub fn new(backend: StorageBackend) -> Self {
        Self {
            backend,
            stores: Mutex::new(HashMap::new()),
        }
    }

    /// In-memory buckets, used by tests and dry runs.
    pub fn memory() -> Self {
        Self::new(StorageBackend::Memory)
    }

    pub fn from_config(storage: &StorageConfig, gcp: &GcpConfig) -> Self {
        let backend = match storage.backend {
            StorageBackendKind::Gcs => StorageBackend::Gcs {
                credentials_path: gcp.credentials_path.clone(),
            },
            StorageBackendKind::Local => StorageBackend::Local {
                root: storage.local_root.clone(),
            },
            StorageBackendKind::Memory => StorageBackend::Memory,
        };
        info!(backend = %storage.backend, "Storage: bucket client configured");
        Self::new(backend)
    }

    /// Resolve (building if needed) the store serving `bucket`.
    pub fn store_for(&self, bucket: &str) -> Result<Arc<dyn ObjectStore>, StorageError> {
        let mut stores = self.stores.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(store) = stores.get(bucket) {
            return Ok(store.clone());
        }
        let store = self.build_store(bucket)?;
        stores.insert(bucket.to_string(), store.clone());
        Ok(store)
    }

    fn build_store(&self, bucket: &str) -> Result<Arc<dyn ObjectStore>, StorageError> {
        if bucket.is_empty() {
            return Err(StorageError::NotConfigured("empty bucket name".into()));
        }
        let store: Arc<dyn ObjectStore> = match &self.backend {
            StorageBackend::Gcs { credentials_path } => {
                let mut builder = GoogleCloudStorageBuilder::from_env().with_bucket_name(bucket);
                if let Some(path) = credentials_path {
                    builder = builder.with_service_account_path(path.to_string_lossy());
                }
                debug!(bucket = %bucket, "Storage: GCS client for bucket");
                Arc::new(builder.build()?)
            }
            StorageBackend::Local { root } => {
                let dir = root.join(bucket);
                std::fs::create_dir_all(&dir)?;
                let store = LocalFileSystem::new_with_prefix(&dir)?;
                debug!(bucket = %bucket, dir = %dir.display(), "Storage: local bucket");
                Arc::new(store)
            }
            StorageBackend::Memory => Arc::new(InMemory::new()),
        };
        Ok(store)
    }

    /// Write an object. The pipeline never uploads source files itself; this
    /// is for seeding buckets and for the archive half of a copy.
    pub async fn put_object(
        &self,
        bucket: &str,
        name: &str,
        data: Bytes,
    ) -> Result<(), StorageError> {
        let store = self.store_for(bucket)?;
        store
            .put(&Path::from(name), PutPayload::from(data))
            .await
            .map_err(|e| StorageError::for_object(e, bucket, name))?;
        Ok(())
    }
}

#[async_trait]
impl ObjectStorage for BucketStore {
    fn list_objects(&self, bucket: &str) -> BoxStream<'static, Result<String, StorageError>> {
        let store = match self.store_for(bucket) {
            Ok(store) => store,
            Err(e) => return futures::stream::once(async move { Err(e) }).boxed(),
        };

        // The store's own listing borrows the store, so a producer task owns
        // it and feeds names through a bounded channel. Dropping the returned
        // stream stops the producer at its next send.
        let (tx, rx) = mpsc::channel(LIST_BUFFER);
        let bucket_name = bucket.to_string();
        tokio::spawn(async move {
            let mut listing = store.list(None);
            loop {
                let item = match listing.try_next().await {
                    Ok(Some(meta)) => Ok(meta.location.to_string()),
                    Ok(None) => break,
                    Err(e) => Err(StorageError::from(e)),
                };
                let failed = item.is_err();
                if tx.send(item).await.is_err() {
                    debug!(bucket = %bucket_name, "Storage: listing consumer dropped");
                    break;
                }
                if failed {
                    warn!(bucket = %bucket_name, "Storage: listing aborted on error");
                    break;
                }
            }
        });

        futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        })
        .boxed()
    }

    async fn read_object(&self, bucket: &str, name: &str) -> Result<Bytes, StorageError> {
        let store = self.store_for(bucket)?;
        let result = store
            .get(&Path::from(name))
            .await
            .map_err(|e| StorageError::for_object(e, bucket, name))?;
        let data = result.bytes().await?;
        debug!(bucket = %bucket, object = %name, bytes = data.len(), "Storage: read object");
        Ok(data)
    }

    async fn copy_object(
        &self,
        src_bucket: &str,
        name: &str,
        dst_bucket: &str,
    ) -> Result<(), StorageError> {
        let data = self.read_object(src_bucket, name).await?;
        self.put_object(dst_bucket, name, data).await?;
        debug!(src = %src_bucket, dst = %dst_bucket, object = %name, "Storage: copied object");
        Ok(())
    }

    async fn delete_object(&self, bucket: &str, name: &str) -> Result<(), StorageError> {
        let store = self.store_for(bucket)?;
        store
            .delete(&Path::from(name))
            .await
            .map_err(|e| StorageError::for_object(e, bucket, name))?;
        debug!(bucket = %bucket, object = %name, "Storage: deleted object");
        Ok(())
    }

    async fn object_exists(&self, bucket: &str, name: &str) -> Result<bool, StorageError> {
        let store = self.store_for(bucket)?;
        match store.head(&Path::from(name)).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn listed(store: &BucketStore, bucket: &str) -> Vec<String> {
        let mut names: Vec<String> = store.list_objects(bucket).try_collect().await.unwrap();
        names.sort();
        names
    }

    #[tokio::test]
    async fn memory_buckets_are_isolated() {
        let store = BucketStore::memory();
        store.put_object("a", "one_v0", Bytes::from_static(b"1")).await.unwrap();
        store.put_object("b", "two_v0", Bytes::from_static(b"2")).await.unwrap();

        assert_eq!(listed(&store, "a").await, vec!["one_v0"]);
        assert_eq!(listed(&store, "b").await, vec!["two_v0"]);
        assert!(listed(&store, "c").await.is_empty());
    }

    #[tokio::test]
    async fn copy_then_delete_moves_object() {
        let store = BucketStore::memory();
        store.put_object("src", "f_v0", Bytes::from_static(b"payload")).await.unwrap();

        store.copy_object("src", "f_v0", "archive").await.unwrap();
        assert!(store.object_exists("src", "f_v0").await.unwrap());
        assert!(store.object_exists("archive", "f_v0").await.unwrap());

        store.delete_object("src", "f_v0").await.unwrap();
        assert!(!store.object_exists("src", "f_v0").await.unwrap());
        assert_eq!(
            store.read_object("archive", "f_v0").await.unwrap(),
            Bytes::from_static(b"payload")
        );
    }

    #[tokio::test]
    async fn read_missing_object_is_not_found() {
        let store = BucketStore::memory();
        let err = store.read_object("src", "nope").await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound { .. }));
    }

    #[tokio::test]
    async fn listing_can_be_abandoned_early() {
        let store = BucketStore::memory();
        for i in 0..200 {
            store
                .put_object("big", &format!("file_{i:03}_v0"), Bytes::from_static(b"x"))
                .await
                .unwrap();
        }
        let first: Vec<String> = store
            .list_objects("big")
            .take(3)
            .try_collect()
            .await
            .unwrap();
        assert_eq!(first.len(), 3);
    }

    #[tokio::test]
    async fn local_backend_uses_bucket_subdirectories() {
        let root = std::env::temp_dir()
            .join(format!("bucketlog-storage-test-{}", std::process::id()));
        let store = BucketStore::new(StorageBackend::Local { root: root.clone() });
        store.put_object("logs", "x_v0", Bytes::from_static(b"abc")).await.unwrap();

        assert!(root.join("logs").join("x_v0").exists());
        assert_eq!(listed(&store, "logs").await, vec!["x_v0"]);
        std::fs::remove_dir_all(&root).ok();
    }
}
