//! Worker configuration

use std::time::Duration;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

const GIB: u64 = 1024 * 1024 * 1024;

/// Export worker configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Environment: development | staging | production
    pub environment: String,
    /// PostgreSQL URL of the export database (requests, tasks, artifacts)
    pub database_url: String,
    /// PostgreSQL URL of the ticketing database read by the guild data collector
    pub tickets_database_url: String,
    /// Ed25519 PKCS#8 PEM used to sign archives
    pub signing_key_path: String,
    pub daemon: DaemonConfig,
    pub artifacts: ArtifactConfig,
    pub transcripts: TranscriptConfig,
    pub downloads: DownloadLimits,
    /// S3-compatible endpoint override (path-style addressing)
    pub s3_endpoint: Option<String>,
}

/// Poll loop and per-task tunables
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub poll_interval: Duration,
    pub retention_sweep_interval: Duration,
    pub retention: Duration,
    pub task_timeout: Duration,
    /// Must outlive `task_timeout` so a live task is never re-leased
    pub lease_duration: Duration,
    pub signing_workers: usize,
    pub compression_level: i64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            retention_sweep_interval: Duration::from_secs(15 * 60),
            retention: Duration::from_secs(14 * 24 * 3600),
            task_timeout: Duration::from_secs(10 * 60),
            lease_duration: Duration::from_secs(15 * 60),
            signing_workers: 100,
            compression_level: 6,
        }
    }
}

/// Encrypted artifact storage
#[derive(Debug, Clone)]
pub struct ArtifactConfig {
    pub bucket: String,
    /// Base64 AES-256 key
    pub encryption_key: String,
    pub ttl: Duration,
    /// Ceiling on the summed size of non-expired artifacts
    pub max_active_bytes: u64,
}

/// Legacy transcript buckets
#[derive(Debug, Clone)]
pub struct TranscriptConfig {
    pub buckets: Vec<String>,
    /// Base64 AES-256 key
    pub encryption_key: String,
    pub download_workers: usize,
    pub max_transcripts: usize,
    pub throttle_backoff: Duration,
    /// Ceiling on a transcript's decompressed size
    pub max_transcript_bytes: u64,
}

impl TranscriptConfig {
    pub fn with_buckets(buckets: Vec<String>, encryption_key: String) -> Self {
        Self {
            buckets,
            encryption_key,
            download_workers: 250,
            max_transcripts: 500_000,
            throttle_backoff: Duration::from_secs(2),
            max_transcript_bytes: 64 * 1024 * 1024,
        }
    }
}

/// Rolling 24h download ceilings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadLimits {
    pub user_daily_bytes: i64,
    pub global_daily_bytes: i64,
}

impl Default for DownloadLimits {
    fn default() -> Self {
        Self {
            user_daily_bytes: (10 * GIB) as i64,
            global_daily_bytes: (1024 * GIB) as i64,
        }
    }
}

impl Config {
    /// Require a secret env var: must be set and non-empty in non-development environments.
    fn require_secret(name: &str, environment: &str) -> Result<String, BoxError> {
        let val = match std::env::var(name) {
            Ok(v) => v,
            Err(_) => {
                if environment != "development" {
                    return Err(format!("{name} must be set in {environment} environment").into());
                }
                String::new()
            }
        };
        if val.is_empty() && environment != "development" {
            return Err(format!("{name} must not be empty in {environment} environment").into());
        }
        Ok(val)
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, BoxError> {
        let environment = std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into());
        let daemon_defaults = DaemonConfig::default();
        let download_defaults = DownloadLimits::default();

        let daemon = DaemonConfig {
            poll_interval: env_secs("POLL_INTERVAL_SECS", daemon_defaults.poll_interval),
            retention_sweep_interval: env_secs(
                "RETENTION_SWEEP_INTERVAL_SECS",
                daemon_defaults.retention_sweep_interval,
            ),
            retention: Duration::from_secs(env_parse("RETENTION_DAYS", 14u64) * 24 * 3600),
            task_timeout: env_secs("TASK_TIMEOUT_SECS", daemon_defaults.task_timeout),
            lease_duration: env_secs("LEASE_SECS", daemon_defaults.lease_duration),
            signing_workers: env_parse("SIGNING_WORKERS", daemon_defaults.signing_workers),
            compression_level: env_parse("COMPRESSION_LEVEL", daemon_defaults.compression_level),
        };
        if daemon.lease_duration <= daemon.task_timeout {
            return Err("LEASE_SECS must exceed TASK_TIMEOUT_SECS".into());
        }

        let artifacts = ArtifactConfig {
            bucket: std::env::var("ARTIFACT_BUCKET")
                .unwrap_or_else(|_| "ticket-exports".into()),
            encryption_key: Self::require_secret("ARTIFACT_ENCRYPTION_KEY", &environment)?,
            ttl: Duration::from_secs(env_parse("ARTIFACT_TTL_HOURS", 72u64) * 3600),
            max_active_bytes: env_parse("MAX_ACTIVE_ARTIFACT_BYTES", 250 * GIB),
        };

        let mut transcripts = TranscriptConfig::with_buckets(
            std::env::var("TRANSCRIPT_BUCKETS")
                .unwrap_or_default()
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
            Self::require_secret("TRANSCRIPT_ENCRYPTION_KEY", &environment)?,
        );
        transcripts.download_workers = env_parse("DOWNLOAD_WORKERS", transcripts.download_workers);
        transcripts.max_transcripts = env_parse("MAX_TRANSCRIPTS", transcripts.max_transcripts);
        transcripts.throttle_backoff = Duration::from_millis(env_parse(
            "THROTTLE_BACKOFF_MS",
            transcripts.throttle_backoff.as_millis() as u64,
        ));
        transcripts.max_transcript_bytes =
            env_parse("MAX_TRANSCRIPT_BYTES", transcripts.max_transcript_bytes);

        Ok(Self {
            database_url: std::env::var("DATABASE_URL").map_err(|_| "DATABASE_URL must be set")?,
            tickets_database_url: std::env::var("TICKETS_DATABASE_URL")
                .map_err(|_| "TICKETS_DATABASE_URL must be set")?,
            signing_key_path: std::env::var("SIGNING_KEY_PATH")
                .unwrap_or_else(|_| "keys/signing.pem".into()),
            environment,
            daemon,
            artifacts,
            transcripts,
            downloads: DownloadLimits {
                user_daily_bytes: env_parse(
                    "USER_DAILY_DOWNLOAD_BYTES",
                    download_defaults.user_daily_bytes,
                ),
                global_daily_bytes: env_parse(
                    "GLOBAL_DAILY_DOWNLOAD_BYTES",
                    download_defaults.global_daily_bytes,
                ),
            },
            s3_endpoint: std::env::var("S3_ENDPOINT").ok().filter(|s| !s.is_empty()),
        })
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_secs(name: &str, default: Duration) -> Duration {
    Duration::from_secs(env_parse(name, default.as_secs()))
}
