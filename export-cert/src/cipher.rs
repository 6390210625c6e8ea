//! AES-256-GCM blob encryption
//!
//! Format: nonce_12bytes || ciphertext || tag_16bytes

use crate::error::{CertError, Result};
use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use base64::Engine;
use zeroize::Zeroize;

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const KEY_LEN: usize = 32;

/// Symmetric key for blobs at rest
#[derive(Clone)]
pub struct BlobCipher {
    key: [u8; KEY_LEN],
}

impl Drop for BlobCipher {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

impl BlobCipher {
    pub fn new(key: [u8; KEY_LEN]) -> Self {
        Self { key }
    }

    /// Fresh random key, mostly for tests and key provisioning
    pub fn generate() -> Self {
        let mut key = [0u8; KEY_LEN];
        rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut key);
        Self { key }
    }

    /// Load from a standard base64 encoding of the 32 key bytes
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let mut bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|e| CertError::InvalidKey(format!("invalid base64: {e}")))?;
        if bytes.len() != KEY_LEN {
            let len = bytes.len();
            bytes.zeroize();
            return Err(CertError::InvalidKey(format!(
                "key wrong length: {len} (expected {KEY_LEN})"
            )));
        }
        let mut key = [0u8; KEY_LEN];
        key.copy_from_slice(&bytes);
        bytes.zeroize();
        Ok(Self { key })
    }

    /// Encrypt plaintext → nonce || ciphertext || tag
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let cipher = Aes256Gcm::new_from_slice(&self.key)
            .map_err(|_| CertError::InvalidKey("invalid AES key".into()))?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext)
            .map_err(|_| CertError::EncryptionFailed)?;

        let mut result = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        result.extend_from_slice(&nonce_bytes);
        result.extend_from_slice(&ciphertext);
        Ok(result)
    }

    /// Decrypt nonce || ciphertext || tag → plaintext
    pub fn decrypt(&self, blob: &[u8]) -> Result<Vec<u8>> {
        if blob.len() < NONCE_LEN + TAG_LEN {
            return Err(CertError::DecryptionFailed);
        }

        let cipher = Aes256Gcm::new_from_slice(&self.key)
            .map_err(|_| CertError::InvalidKey("invalid AES key".into()))?;
        let nonce = Nonce::from_slice(&blob[..NONCE_LEN]);

        cipher
            .decrypt(nonce, &blob[NONCE_LEN..])
            .map_err(|_| CertError::DecryptionFailed)
    }
}
