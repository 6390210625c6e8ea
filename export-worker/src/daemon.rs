//! Worker daemon
//!
//! Each poll cycle leases at most one task, runs it under a deadline and
//! finalizes it. Retention runs on its own timer in [`RetentionSweeper`].

use shared::models::{Artifact, Lease, NewArtifact, Request, RequestKind};
use shared::util::{artifact_key, now_millis};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::archive::ArchiveSigner;
use crate::artifacts::ArtifactStore;
use crate::collectors::{GuildDataCollector, GuildDataSource, TranscriptCollector};
use crate::config::{ArtifactConfig, DaemonConfig};
use crate::db::ExportRepository;
use crate::error::{ExportError, ExportResult};

pub struct WorkerDaemon<G> {
    repo: Arc<dyn ExportRepository>,
    guild_data: GuildDataCollector<G>,
    transcripts: TranscriptCollector,
    signer: ArchiveSigner,
    artifacts: ArtifactStore,
    config: DaemonConfig,
    artifact_ttl: Duration,
    max_active_bytes: u64,
}

impl<G: GuildDataSource> WorkerDaemon<G> {
    pub fn new(
        repo: Arc<dyn ExportRepository>,
        guild_data: GuildDataCollector<G>,
        transcripts: TranscriptCollector,
        signer: ArchiveSigner,
        artifacts: ArtifactStore,
        config: DaemonConfig,
        artifact_config: &ArtifactConfig,
    ) -> Self {
        Self {
            repo,
            guild_data,
            transcripts,
            signer,
            artifacts,
            config,
            artifact_ttl: artifact_config.ttl,
            max_active_bytes: artifact_config.max_active_bytes,
        }
    }

    /// Poll until `shutdown` fires. A cycle already in progress is finished first.
    pub async fn run(&self, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(self.config.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            poll_interval_secs = self.config.poll_interval.as_secs(),
            "Worker daemon started"
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("Worker daemon shutting down");
                    break;
                }
                _ = interval.tick() => {
                    if let Err(e) = self.poll_once().await {
                        tracing::error!(error = %e, "Poll cycle failed");
                    }
                }
            }
        }
    }

    /// Lease and process one task. Returns whether a task was found.
    pub async fn poll_once(&self) -> ExportResult<bool> {
        let now = now_millis();
        let lease_ms = self.config.lease_duration.as_millis() as i64;
        let Some((request, lease)) = self.repo.lease_next(lease_ms, now).await? else {
            return Ok(false);
        };

        tracing::info!(
            request_id = %request.id,
            kind = %request.kind,
            guild_id = ?request.guild_id,
            "Processing export request"
        );

        let deadline = self.config.task_timeout;
        let outcome = match tokio::time::timeout(deadline, self.execute(&request, &lease)).await {
            Ok(result) => result,
            Err(_) => Err(ExportError::Timeout(deadline)),
        };

        match outcome {
            Ok(artifact) => {
                tracing::info!(
                    request_id = %request.id,
                    artifact_id = %artifact.id,
                    size = artifact.size,
                    "Export completed"
                );
            }
            Err(ExportError::LeaseLost(task_id)) => {
                tracing::warn!(request_id = %request.id, %task_id, "Lease lost before completion");
            }
            Err(e) => {
                tracing::error!(
                    request_id = %request.id,
                    guild_id = ?request.guild_id,
                    error = %e,
                    "Export failed"
                );
                match self.repo.fail(&lease, request.id).await {
                    Ok(()) => {}
                    Err(ExportError::LeaseLost(task_id)) => {
                        tracing::warn!(request_id = %request.id, %task_id, "Lease lost before failure was recorded");
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        Ok(true)
    }

    async fn execute(&self, request: &Request, lease: &Lease) -> ExportResult<Artifact> {
        let guild_id = request
            .guild_id
            .filter(|id| *id != 0)
            .ok_or(ExportError::MissingGuild(request.id))?;

        let archive = match request.kind {
            RequestKind::GuildData => {
                let data = self.guild_data.collect(guild_id).await?;
                self.signer.guild_data(&data).await?
            }
            RequestKind::GuildTranscripts => {
                let collected = self.transcripts.collect(guild_id).await?;
                self.signer.transcripts(guild_id, collected).await?
            }
        };

        let size = archive.len() as u64;
        let now = now_millis();
        let active = self.repo.active_artifact_size(now).await?.max(0) as u64;
        if active + size > self.max_active_bytes {
            return Err(ExportError::CapacityExceeded {
                total: active + size,
                limit: self.max_active_bytes,
            });
        }

        let key = artifact_key();
        let expires_at = now + self.artifact_ttl.as_millis() as i64;
        tracing::info!(request_id = %request.id, size, "Uploading artifact");
        self.artifacts.store(request.id, &key, expires_at, archive).await?;

        let record = NewArtifact {
            key,
            expires_at,
            size: size as i64,
        };
        self.repo.complete(lease, request.id, &record, now_millis()).await
    }
}

/// Periodically deletes requests older than the retention period
pub struct RetentionSweeper {
    repo: Arc<dyn ExportRepository>,
    retention: Duration,
    interval: Duration,
}

impl RetentionSweeper {
    pub fn new(repo: Arc<dyn ExportRepository>, config: &DaemonConfig) -> Self {
        Self {
            repo,
            retention: config.retention,
            interval: config.retention_sweep_interval,
        }
    }

    pub async fn run(&self, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    if let Err(e) = self.sweep(now_millis()).await {
                        tracing::error!(error = %e, "Retention sweep failed");
                    }
                }
            }
        }
    }

    pub async fn sweep(&self, now: i64) -> ExportResult<u64> {
        let cutoff = now - self.retention.as_millis() as i64;
        let deleted = self.repo.delete_requests_before(cutoff).await?;
        if deleted > 0 {
            tracing::info!(deleted, "Deleted expired requests");
        }
        Ok(deleted)
    }
}
