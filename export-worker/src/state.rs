//! Process-wide wiring: pools, storage clients and keys

use aws_sdk_s3::Client as S3Client;
use export_cert::{BlobCipher, SigningKey};
use export_worker::archive::ArchiveSigner;
use export_worker::artifacts::ArtifactStore;
use export_worker::collectors::{GuildDataCollector, TranscriptCollector};
use export_worker::config::Config;
use export_worker::db::{ExportRepository, PgGuildSource, PgRepository};
use export_worker::storage::{ObjectStore, S3ObjectStore};
use export_worker::{RetentionSweeper, WorkerDaemon};
use sqlx::PgPool;
use std::sync::Arc;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub struct AppState {
    pub daemon: WorkerDaemon<PgGuildSource>,
    pub sweeper: RetentionSweeper,
}

impl AppState {
    pub async fn new(config: &Config) -> Result<Self, BoxError> {
        let pool = PgPool::connect(&config.database_url).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        let tickets = PgPool::connect(&config.tickets_database_url).await?;

        let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        let s3 = match &config.s3_endpoint {
            Some(endpoint) => {
                let s3_config = aws_sdk_s3::config::Builder::from(&aws_config)
                    .endpoint_url(endpoint)
                    .force_path_style(true)
                    .build();
                S3Client::from_conf(s3_config)
            }
            None => S3Client::new(&aws_config),
        };
        let store: Arc<dyn ObjectStore> = Arc::new(S3ObjectStore::new(s3));

        let signing_key = SigningKey::from_file(&config.signing_key_path)?;
        tracing::info!(path = %config.signing_key_path, "Signing key loaded");

        let artifact_cipher = load_cipher(
            "ARTIFACT_ENCRYPTION_KEY",
            &config.artifacts.encryption_key,
        )?;
        let transcript_cipher = load_cipher(
            "TRANSCRIPT_ENCRYPTION_KEY",
            &config.transcripts.encryption_key,
        )?;

        let repo: Arc<dyn ExportRepository> = Arc::new(PgRepository::new(pool));
        let artifacts = ArtifactStore::new(
            store.clone(),
            config.artifacts.bucket.clone(),
            artifact_cipher,
        );

        let daemon = WorkerDaemon::new(
            repo.clone(),
            GuildDataCollector::new(Arc::new(PgGuildSource::new(tickets))),
            TranscriptCollector::new(store, transcript_cipher, config.transcripts.clone()),
            ArchiveSigner::new(
                Arc::new(signing_key),
                config.daemon.signing_workers,
                config.daemon.compression_level,
            ),
            artifacts,
            config.daemon.clone(),
            &config.artifacts,
        );

        Ok(Self {
            daemon,
            sweeper: RetentionSweeper::new(repo, &config.daemon),
        })
    }
}

/// An empty key is only accepted in development, where a throwaway key is generated
fn load_cipher(name: &str, encoded: &str) -> Result<BlobCipher, BoxError> {
    if encoded.is_empty() {
        tracing::warn!("{name} not set, using an ephemeral key");
        return Ok(BlobCipher::generate());
    }
    Ok(BlobCipher::from_base64(encoded)?)
}
