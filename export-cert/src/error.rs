use thiserror::Error;

#[derive(Error, Debug)]
pub enum CertError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("PEM error: {0}")]
    Pem(String),
    #[error("Invalid key: {0}")]
    InvalidKey(String),
    #[error("Signing failed: {0}")]
    SigningFailed(String),
    #[error("Signature verification failed")]
    VerificationFailed,
    #[error("Encryption failed")]
    EncryptionFailed,
    #[error("Decryption failed (wrong key or tampered data)")]
    DecryptionFailed,
}

pub type Result<T> = std::result::Result<T, CertError>;
