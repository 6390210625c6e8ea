//! Artifact download authorization
//!
//! Checks run in a fixed order so the caller learns the most basic problem
//! first: existence, request ownership, expiry, guild ownership, and
//! finally the rolling daily quotas.

use shared::error::{AppError, ErrorCode};
use shared::models::{Artifact, Identity, Request};
use shared::util::now_millis;
use std::sync::Arc;
use uuid::Uuid;

use crate::artifacts::ArtifactStore;
use crate::config::DownloadLimits;
use crate::db::{ExportRepository, QuotaCheck};
use crate::error::ServiceResult;

/// A decrypted archive cleared for delivery
#[derive(Debug, Clone)]
pub struct Download {
    pub request: Request,
    pub artifact: Artifact,
    pub bytes: Vec<u8>,
}

pub struct DownloadGate {
    repo: Arc<dyn ExportRepository>,
    artifacts: ArtifactStore,
    limits: DownloadLimits,
}

impl DownloadGate {
    pub fn new(repo: Arc<dyn ExportRepository>, artifacts: ArtifactStore, limits: DownloadLimits) -> Self {
        Self {
            repo,
            artifacts,
            limits,
        }
    }

    pub async fn download(&self, identity: &Identity, request_id: Uuid) -> ServiceResult<Download> {
        self.download_at(identity, request_id, now_millis()).await
    }

    pub async fn download_at(
        &self,
        identity: &Identity,
        request_id: Uuid,
        now: i64,
    ) -> ServiceResult<Download> {
        let detail = self.repo.get_request(request_id).await?;
        let Some((request, artifact)) = detail.and_then(|d| d.artifact.map(|a| (d.request, a))) else {
            return Err(AppError::not_found("Data export").into());
        };

        if request.user_id != identity.user_id {
            return Err(AppError::permission_denied("You do not own this request").into());
        }
        if artifact.is_expired(now) {
            return Err(AppError::new(ErrorCode::ArtifactExpired).into());
        }
        if !request.guild_id.is_some_and(|g| identity.owns_guild(g)) {
            return Err(AppError::new(ErrorCode::GuildNotOwned).into());
        }

        match self
            .repo
            .record_download(identity.user_id, &artifact, self.limits, now)
            .await?
        {
            QuotaCheck::Allowed => {}
            QuotaCheck::UserExceeded => {
                tracing::warn!(user_id = identity.user_id, %request_id, "User download quota exceeded");
                return Err(AppError::new(ErrorCode::UserQuotaExceeded).into());
            }
            QuotaCheck::GlobalExceeded => {
                tracing::warn!(%request_id, "Global download quota exceeded");
                return Err(AppError::new(ErrorCode::GlobalQuotaExceeded).into());
            }
        }

        tracing::info!(user_id = identity.user_id, %request_id, size = artifact.size, "Fetching artifact");
        let bytes = self.artifacts.fetch(request.id, &artifact.key).await?;

        Ok(Download {
            request,
            artifact,
            bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;
    use crate::testing::{MemoryObjectStore, MemoryRepository};
    use export_cert::BlobCipher;
    use shared::models::{NewArtifact, RequestKind};

    const MIB: i64 = 1024 * 1024;
    const GIB: i64 = 1024 * MIB;
    const NOW: i64 = 1_700_000_000_000;

    struct Fixture {
        repo: Arc<MemoryRepository>,
        gate: DownloadGate,
        request_id: Uuid,
    }

    async fn fixture(size: i64, expires_at: i64) -> Fixture {
        let repo = Arc::new(MemoryRepository::default());
        let artifacts = ArtifactStore::new(
            Arc::new(MemoryObjectStore::default()),
            "exports",
            BlobCipher::generate(),
        );

        let request = repo
            .create_request(1, RequestKind::GuildTranscripts, Some(42), NOW - 1_000)
            .await
            .unwrap();
        let (_, lease) = repo.lease_next(60_000, NOW - 900).await.unwrap().unwrap();
        artifacts
            .store(request.id, "key", expires_at, b"archive".to_vec())
            .await
            .unwrap();
        repo.complete(
            &lease,
            request.id,
            &NewArtifact {
                key: "key".into(),
                expires_at,
                size,
            },
            NOW - 800,
        )
        .await
        .unwrap();

        Fixture {
            gate: DownloadGate::new(repo.clone(), artifacts, DownloadLimits::default()),
            repo,
            request_id: request.id,
        }
    }

    fn code(err: ServiceError) -> ErrorCode {
        AppError::from(err).code
    }

    #[tokio::test]
    async fn test_owner_downloads_archive() {
        let f = fixture(7, NOW + 1_000).await;
        let download = f
            .gate
            .download_at(&Identity::new(1, vec![42]), f.request_id, NOW)
            .await
            .unwrap();
        assert_eq!(download.bytes, b"archive".to_vec());
        assert_eq!(f.repo.download_total(1), 7);
    }

    #[tokio::test]
    async fn test_unknown_request_is_not_found() {
        let f = fixture(7, NOW + 1_000).await;
        let err = f
            .gate
            .download_at(&Identity::new(1, vec![42]), Uuid::new_v4(), NOW)
            .await
            .unwrap_err();
        assert_eq!(code(err), ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn test_check_order() {
        let f = fixture(7, NOW - 1).await;

        // Someone else's expired request: ownership is reported first
        let err = f
            .gate
            .download_at(&Identity::new(2, vec![42]), f.request_id, NOW)
            .await
            .unwrap_err();
        assert_eq!(code(err), ErrorCode::PermissionDenied);

        let err = f
            .gate
            .download_at(&Identity::new(1, vec![]), f.request_id, NOW)
            .await
            .unwrap_err();
        assert_eq!(code(err), ErrorCode::ArtifactExpired);
    }

    #[tokio::test]
    async fn test_guild_ownership_required() {
        let f = fixture(7, NOW + 1_000).await;
        let err = f
            .gate
            .download_at(&Identity::new(1, vec![43]), f.request_id, NOW)
            .await
            .unwrap_err();
        assert_eq!(code(err), ErrorCode::GuildNotOwned);
    }

    #[tokio::test]
    async fn test_user_quota_rejects_and_records_nothing() {
        let f = fixture(200 * MIB, NOW + 1_000).await;
        f.repo.seed_download(1, 9 * GIB + 900 * MIB, NOW - 60_000);

        let err = f
            .gate
            .download_at(&Identity::new(1, vec![42]), f.request_id, NOW)
            .await
            .unwrap_err();
        assert_eq!(code(err), ErrorCode::UserQuotaExceeded);
        assert_eq!(f.repo.download_total(1), 9 * GIB + 900 * MIB);
    }

    #[tokio::test]
    async fn test_quota_window_rolls() {
        let f = fixture(200 * MIB, NOW + 1_000).await;
        f.repo.seed_download(1, 9 * GIB + 900 * MIB, NOW - 25 * 60 * 60 * 1000);

        f.gate
            .download_at(&Identity::new(1, vec![42]), f.request_id, NOW)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_global_quota() {
        let f = fixture(200 * MIB, NOW + 1_000).await;
        f.repo.seed_download(77, 1024 * GIB, NOW - 60_000);

        let err = f
            .gate
            .download_at(&Identity::new(1, vec![42]), f.request_id, NOW)
            .await
            .unwrap_err();
        assert_eq!(code(err), ErrorCode::GlobalQuotaExceeded);
    }
}
