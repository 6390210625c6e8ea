//! Error system shared by the export worker and its API consumers
//!
//! - [`ErrorCode`]: stable numeric codes grouped by range
//! - [`AppError`]: user-visible error with code, message and details
//!
//! # Example
//!
//! ```
//! use shared::error::{AppError, ErrorCode};
//!
//! let err = AppError::new(ErrorCode::UserQuotaExceeded);
//! assert!(err.code.is_rate_limited());
//!
//! let err = AppError::not_found("Request").with_detail("id", "abc");
//! assert_eq!(err.code, ErrorCode::NotFound);
//! ```

mod codes;
mod types;

pub use codes::{ErrorCode, InvalidErrorCode};
pub use types::{AppError, AppResult};
