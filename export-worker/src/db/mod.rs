//! Database access layer
//!
//! The free functions in each submodule run single statements against a
//! pool or an open transaction. [`PgRepository`] composes them into the
//! transactional operations the worker and request handling rely on.

pub mod artifacts;
pub mod downloads;
pub mod guild_data;
pub mod requests;
pub mod tasks;

pub use guild_data::PgGuildSource;

use async_trait::async_trait;
use shared::models::{Artifact, Lease, NewArtifact, Request, RequestDetail, RequestKind, RequestStatus};
use sqlx::PgPool;
use uuid::Uuid;

use crate::config::DownloadLimits;
use crate::error::{ExportError, ExportResult};

/// Quota window for download accounting
pub const DOWNLOAD_WINDOW_MS: i64 = 24 * 60 * 60 * 1000;

/// Outcome of recording a download against the daily quotas
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaCheck {
    Allowed,
    UserExceeded,
    GlobalExceeded,
}

/// Persistence used by the worker and by request handling
#[async_trait]
pub trait ExportRepository: Send + Sync + 'static {
    /// Insert a request and its task atomically
    async fn create_request(
        &self,
        user_id: i64,
        kind: RequestKind,
        guild_id: Option<i64>,
        now: i64,
    ) -> Result<Request, sqlx::Error>;

    /// Every request of a user, newest first
    async fn list_requests(&self, user_id: i64) -> Result<Vec<RequestDetail>, sqlx::Error>;

    async fn get_request(&self, id: Uuid) -> Result<Option<RequestDetail>, sqlx::Error>;

    /// Lease the oldest available task together with its request
    async fn lease_next(
        &self,
        lease_duration_ms: i64,
        now: i64,
    ) -> Result<Option<(Request, Lease)>, sqlx::Error>;

    /// Summed size of artifacts that are not yet expired
    async fn active_artifact_size(&self, now: i64) -> Result<i64, sqlx::Error>;

    /// Delete the task, mark the request completed and record its artifact
    async fn complete(
        &self,
        lease: &Lease,
        request_id: Uuid,
        artifact: &NewArtifact,
        now: i64,
    ) -> ExportResult<Artifact>;

    /// Delete the task and mark the request failed
    async fn fail(&self, lease: &Lease, request_id: Uuid) -> ExportResult<()>;

    /// Drop requests (and their tasks and artifacts) created before `cutoff`
    async fn delete_requests_before(&self, cutoff: i64) -> Result<u64, sqlx::Error>;

    /// Record a download, keeping it only if both rolling quotas still hold
    async fn record_download(
        &self,
        user_id: i64,
        artifact: &Artifact,
        limits: DownloadLimits,
        now: i64,
    ) -> Result<QuotaCheck, sqlx::Error>;
}

#[derive(Clone)]
pub struct PgRepository {
    pool: PgPool,
}

impl PgRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn finish(
        &self,
        lease: &Lease,
        request_id: Uuid,
        status: RequestStatus,
        artifact: Option<(&NewArtifact, i64)>,
    ) -> ExportResult<Option<Artifact>> {
        let mut tx = self.pool.begin().await?;

        if !tasks::delete_leased(&mut tx, lease).await? {
            tx.rollback().await?;
            return Err(ExportError::LeaseLost(lease.task_id));
        }
        requests::set_status(&mut tx, request_id, status).await?;
        let created = match artifact {
            Some((new, now)) => Some(artifacts::create(&mut tx, request_id, new, now).await?),
            None => None,
        };

        tx.commit().await?;
        Ok(created)
    }
}

#[async_trait]
impl ExportRepository for PgRepository {
    async fn create_request(
        &self,
        user_id: i64,
        kind: RequestKind,
        guild_id: Option<i64>,
        now: i64,
    ) -> Result<Request, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let request = requests::create(&mut tx, user_id, kind, guild_id, now).await?;
        tasks::create(&mut tx, request.id, now).await?;
        tx.commit().await?;
        Ok(request)
    }

    async fn list_requests(&self, user_id: i64) -> Result<Vec<RequestDetail>, sqlx::Error> {
        requests::list_for_user(&self.pool, user_id).await
    }

    async fn get_request(&self, id: Uuid) -> Result<Option<RequestDetail>, sqlx::Error> {
        requests::find_detail(&self.pool, id).await
    }

    async fn lease_next(
        &self,
        lease_duration_ms: i64,
        now: i64,
    ) -> Result<Option<(Request, Lease)>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let token = Uuid::new_v4();
        let expires_at = now + lease_duration_ms;

        let Some(task) = tasks::lease_next(&mut tx, token, now, expires_at).await? else {
            tx.commit().await?;
            return Ok(None);
        };
        let request = requests::find_by_id(&mut tx, task.request_id).await?;
        tx.commit().await?;

        Ok(request.map(|request| {
            (
                request,
                Lease {
                    task_id: task.id,
                    token,
                    expires_at,
                },
            )
        }))
    }

    async fn active_artifact_size(&self, now: i64) -> Result<i64, sqlx::Error> {
        artifacts::active_size(&self.pool, now).await
    }

    async fn complete(
        &self,
        lease: &Lease,
        request_id: Uuid,
        artifact: &NewArtifact,
        now: i64,
    ) -> ExportResult<Artifact> {
        self.finish(lease, request_id, RequestStatus::Completed, Some((artifact, now)))
            .await?
            .ok_or(ExportError::LeaseLost(lease.task_id))
    }

    async fn fail(&self, lease: &Lease, request_id: Uuid) -> ExportResult<()> {
        self.finish(lease, request_id, RequestStatus::Failed, None).await?;
        Ok(())
    }

    async fn delete_requests_before(&self, cutoff: i64) -> Result<u64, sqlx::Error> {
        let deleted = requests::delete_created_before(&self.pool, cutoff).await?;
        downloads::delete_created_before(&self.pool, cutoff).await?;
        Ok(deleted)
    }

    async fn record_download(
        &self,
        user_id: i64,
        artifact: &Artifact,
        limits: DownloadLimits,
        now: i64,
    ) -> Result<QuotaCheck, sqlx::Error> {
        let since = now - DOWNLOAD_WINDOW_MS;
        let mut tx = self.pool.begin().await?;

        downloads::lock_user(&mut tx, user_id).await?;
        downloads::create(&mut tx, user_id, artifact.id, artifact.size, now).await?;

        let check = if downloads::user_bytes_since(&mut tx, user_id, since).await?
            > limits.user_daily_bytes
        {
            QuotaCheck::UserExceeded
        } else if downloads::bytes_since(&mut tx, since).await? > limits.global_daily_bytes {
            QuotaCheck::GlobalExceeded
        } else {
            QuotaCheck::Allowed
        };

        if check == QuotaCheck::Allowed {
            tx.commit().await?;
        } else {
            tx.rollback().await?;
        }
        Ok(check)
    }
}
