//! Object storage boundary
//!
//! Export artifacts and legacy transcripts both live in S3-compatible
//! buckets. Errors are classified so callers can back off on throttling.

mod s3;

pub use s3::S3ObjectStore;

use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Throttled: {0}")]
    Throttled(String),
    #[error("Object not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },
    #[error("{0}")]
    Other(String),
}

impl StorageError {
    pub fn is_throttled(&self) -> bool {
        matches!(self, StorageError::Throttled(_))
    }
}

#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// Every key under `prefix`, following continuation pages to the end
    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, StorageError>;

    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError>;

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        metadata: HashMap<String, String>,
    ) -> Result<(), StorageError>;
}
