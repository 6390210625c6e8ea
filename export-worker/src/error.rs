//! Error types for the export pipeline
//!
//! `ExportError` covers everything that can abort a task. `ServiceError`
//! bridges it to the user-visible `AppError` for request handling code.

use export_archive::ArchiveError;
use export_cert::CertError;
use shared::error::{AppError, ErrorCode};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::storage::StorageError;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Crypto error: {0}")]
    Crypto(#[from] CertError),
    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Section {section} failed: {source}")]
    Section {
        section: &'static str,
        #[source]
        source: sqlx::Error,
    },
    #[error("Request {0} has no guild id")]
    MissingGuild(Uuid),
    #[error("Guild {guild_id} has {count} transcripts, limit is {limit}")]
    TooManyTranscripts {
        guild_id: i64,
        count: usize,
        limit: usize,
    },
    #[error("Unexpected object key: {0}")]
    UnexpectedKey(String),
    #[error("Active artifacts would total {total} bytes, ceiling is {limit}")]
    CapacityExceeded { total: u64, limit: u64 },
    #[error("Lease on task {0} was lost")]
    LeaseLost(Uuid),
    #[error("Task exceeded its {0:?} deadline")]
    Timeout(Duration),
    #[error("Worker task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("Cancelled")]
    Cancelled,
}

/// Service-layer error for request handling code
///
/// - `Export`: infrastructure errors (logged, mapped to a generic code)
/// - `App`: business-rule errors (passed through to the caller)
#[derive(Debug)]
pub enum ServiceError {
    Export(ExportError),
    App(AppError),
}

impl From<ExportError> for ServiceError {
    fn from(e: ExportError) -> Self {
        ServiceError::Export(e)
    }
}

impl From<sqlx::Error> for ServiceError {
    fn from(e: sqlx::Error) -> Self {
        ServiceError::Export(e.into())
    }
}

impl From<StorageError> for ServiceError {
    fn from(e: StorageError) -> Self {
        ServiceError::Export(e.into())
    }
}

impl From<AppError> for ServiceError {
    fn from(e: AppError) -> Self {
        ServiceError::App(e)
    }
}

impl From<ServiceError> for AppError {
    fn from(e: ServiceError) -> Self {
        match e {
            ServiceError::App(app_err) => app_err,
            ServiceError::Export(err) => {
                tracing::error!(error = %err, "Service error");
                match err {
                    ExportError::Database(_) => AppError::new(ErrorCode::DatabaseError),
                    ExportError::Storage(_) => AppError::new(ErrorCode::StorageError),
                    _ => AppError::new(ErrorCode::InternalError),
                }
            }
        }
    }
}

pub type ExportResult<T> = Result<T, ExportError>;

/// Convenience type alias for service-layer results
pub type ServiceResult<T> = Result<T, ServiceError>;
