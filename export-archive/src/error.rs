use thiserror::Error;

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Entry {name} exceeds the {limit} byte entry limit")]
    EntryTooLarge { name: String, limit: u64 },
    #[error("Archive exceeds the {limit} byte total limit")]
    ArchiveTooLarge { limit: u64 },
    #[error("Unexpected entry: {0}")]
    UnexpectedEntry(String),
    #[error("Duplicate entry: {0}")]
    DuplicateEntry(String),
    #[error("Missing entry: {0}")]
    MissingEntry(String),
    #[error("Signature for {0} is not valid base64url")]
    SignatureEncoding(String),
    #[error("Signature verification failed for {0}")]
    BadSignature(String),
    #[error("Malformed {name}: {reason}")]
    Malformed { name: String, reason: String },
    #[error("Invalid guild data: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ArchiveError>;
