//! Key material for signing and encrypting exports
//!
//! - [`SigningKey`] / [`VerifyingKey`]: Ed25519 keys in PKCS#8 / SPKI PEM
//! - [`BlobCipher`]: AES-256-GCM for artifacts and stored transcripts

mod cipher;
mod error;
mod signing;

pub use cipher::BlobCipher;
pub use error::{CertError, Result};
pub use signing::{SIGNATURE_LEN, SigningKey, VerifyingKey};
