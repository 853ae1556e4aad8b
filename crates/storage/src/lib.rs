pub mod backend;
pub mod client;
pub mod error;

pub use backend::{BucketStore, StorageBackend};
pub use client::ObjectStorage;
pub use error::StorageError;
