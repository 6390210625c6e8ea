//! Error codes for the export service
//!
//! Error codes are organized by category:
//! - 0xxx: General errors
//! - 2xxx: Permission errors
//! - 3xxx: Export request errors
//! - 4xxx: Download quota errors
//! - 9xxx: System errors

use serde::{Deserialize, Serialize};
use std::fmt;

/// Export service error code
///
/// Represented as u16 on the wire so API clients can match on a stable number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
#[repr(u16)]
pub enum ErrorCode {
    // ==================== 0xxx: General ====================
    /// Operation completed successfully
    Success = 0,
    /// Unknown error
    Unknown = 1,
    /// Validation failed
    ValidationFailed = 2,
    /// Resource not found
    NotFound = 3,
    /// Invalid request
    InvalidRequest = 5,
    /// Required field missing
    RequiredField = 7,

    // ==================== 2xxx: Permission ====================
    /// Permission denied
    PermissionDenied = 2001,
    /// Caller does not own the guild
    GuildNotOwned = 2002,

    // ==================== 3xxx: Export requests ====================
    /// An identical request is already waiting in the queue
    RequestAlreadyQueued = 3001,
    /// An identical request was made too recently
    RequestCooldown = 3002,
    /// Artifact has expired
    ArtifactExpired = 3003,
    /// Request has no artifact to download
    ArtifactUnavailable = 3004,

    // ==================== 4xxx: Download quota ====================
    /// Per-user daily download quota exceeded
    UserQuotaExceeded = 4001,
    /// Global daily download quota exceeded
    GlobalQuotaExceeded = 4002,

    // ==================== 9xxx: System ====================
    /// Internal server error
    InternalError = 9001,
    /// Database error
    DatabaseError = 9002,
    /// Object storage error
    StorageError = 9003,
}

impl ErrorCode {
    /// Get the numeric code value
    #[inline]
    pub const fn code(&self) -> u16 {
        *self as u16
    }

    /// Check if this is a success code
    #[inline]
    pub const fn is_success(&self) -> bool {
        matches!(self, ErrorCode::Success)
    }

    /// Whether the caller should retry later rather than change the request
    #[inline]
    pub const fn is_rate_limited(&self) -> bool {
        matches!(
            self,
            ErrorCode::RequestCooldown
                | ErrorCode::UserQuotaExceeded
                | ErrorCode::GlobalQuotaExceeded
        )
    }

    /// Get the developer-facing English message for this error code
    pub const fn message(&self) -> &'static str {
        match self {
            // General
            ErrorCode::Success => "Operation completed successfully",
            ErrorCode::Unknown => "An unknown error occurred",
            ErrorCode::ValidationFailed => "Validation failed",
            ErrorCode::NotFound => "Resource not found",
            ErrorCode::InvalidRequest => "Invalid request",
            ErrorCode::RequiredField => "Required field is missing",

            // Permission
            ErrorCode::PermissionDenied => "Permission denied",
            ErrorCode::GuildNotOwned => "You do not own this guild",

            // Export requests
            ErrorCode::RequestAlreadyQueued => "An export of this kind is already queued",
            ErrorCode::RequestCooldown => "An export of this kind was requested recently",
            ErrorCode::ArtifactExpired => "The export has expired",
            ErrorCode::ArtifactUnavailable => "The export is not ready",

            // Quota
            ErrorCode::UserQuotaExceeded => "Daily download limit reached",
            ErrorCode::GlobalQuotaExceeded => "Download capacity reached, try again later",

            // System
            ErrorCode::InternalError => "Internal server error",
            ErrorCode::DatabaseError => "Database error",
            ErrorCode::StorageError => "Storage error",
        }
    }
}

impl From<ErrorCode> for u16 {
    #[inline]
    fn from(code: ErrorCode) -> Self {
        code.code()
    }
}

/// Error when converting from an invalid u16 to ErrorCode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidErrorCode(pub u16);

impl fmt::Display for InvalidErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid error code: {}", self.0)
    }
}

impl std::error::Error for InvalidErrorCode {}

impl TryFrom<u16> for ErrorCode {
    type Error = InvalidErrorCode;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            // General
            0 => Ok(ErrorCode::Success),
            1 => Ok(ErrorCode::Unknown),
            2 => Ok(ErrorCode::ValidationFailed),
            3 => Ok(ErrorCode::NotFound),
            5 => Ok(ErrorCode::InvalidRequest),
            7 => Ok(ErrorCode::RequiredField),

            // Permission
            2001 => Ok(ErrorCode::PermissionDenied),
            2002 => Ok(ErrorCode::GuildNotOwned),

            // Export requests
            3001 => Ok(ErrorCode::RequestAlreadyQueued),
            3002 => Ok(ErrorCode::RequestCooldown),
            3003 => Ok(ErrorCode::ArtifactExpired),
            3004 => Ok(ErrorCode::ArtifactUnavailable),

            // Quota
            4001 => Ok(ErrorCode::UserQuotaExceeded),
            4002 => Ok(ErrorCode::GlobalQuotaExceeded),

            // System
            9001 => Ok(ErrorCode::InternalError),
            9002 => Ok(ErrorCode::DatabaseError),
            9003 => Ok(ErrorCode::StorageError),

            _ => Err(InvalidErrorCode(value)),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
