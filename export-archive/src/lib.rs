//! Export archive format
//!
//! Archives are zip containers with detached base64url signatures next to
//! each signed entry. [`ArchiveBuilder`] writes them; [`ArchiveValidator`]
//! reads them back under strict size limits and checks every signature.

mod builder;
mod error;
pub mod layout;
mod limit;
pub mod signature;
mod validator;

pub use builder::ArchiveBuilder;
pub use error::{ArchiveError, Result};
pub use limit::Limits;
pub use validator::{ArchiveValidator, ValidatedTranscripts};
