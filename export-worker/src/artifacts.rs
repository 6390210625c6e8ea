//! Encrypted artifact storage
//!
//! Archives are encrypted before upload and decrypted after download, so
//! the object store only ever holds ciphertext. Objects are addressed as
//! `{request_id}/{key}` with the expiry recorded as object metadata.

use export_cert::BlobCipher;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{ExportError, ExportResult};
use crate::storage::ObjectStore;

/// Metadata entry carrying the artifact expiry (Unix millis)
pub const EXPIRES_AT_METADATA: &str = "expires-at";

#[derive(Clone)]
pub struct ArtifactStore {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    cipher: BlobCipher,
}

impl ArtifactStore {
    pub fn new(store: Arc<dyn ObjectStore>, bucket: impl Into<String>, cipher: BlobCipher) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            cipher,
        }
    }

    pub fn object_key(request_id: Uuid, key: &str) -> String {
        format!("{request_id}/{key}")
    }

    pub async fn store(
        &self,
        request_id: Uuid,
        key: &str,
        expires_at: i64,
        archive: Vec<u8>,
    ) -> ExportResult<()> {
        let cipher = self.cipher.clone();
        let sealed = tokio::task::spawn_blocking(move || cipher.encrypt(&archive)).await??;

        let metadata = HashMap::from([(EXPIRES_AT_METADATA.to_string(), expires_at.to_string())]);
        self.store
            .put(&self.bucket, &Self::object_key(request_id, key), sealed, metadata)
            .await?;
        Ok(())
    }

    pub async fn fetch(&self, request_id: Uuid, key: &str) -> ExportResult<Vec<u8>> {
        let sealed = self
            .store
            .get(&self.bucket, &Self::object_key(request_id, key))
            .await?;

        let cipher = self.cipher.clone();
        tokio::task::spawn_blocking(move || cipher.decrypt(&sealed))
            .await?
            .map_err(ExportError::from)
    }
}
