use crate::error::{CertError, Result};
use ring::rand::SystemRandom;
use ring::signature::{self, Ed25519KeyPair, KeyPair, UnparsedPublicKey};
use std::fmt;
use std::path::Path;
use zeroize::Zeroizing;

/// Length of a raw Ed25519 signature
pub const SIGNATURE_LEN: usize = 64;

const PUBLIC_KEY_LEN: usize = 32;

/// DER prefix of an Ed25519 SubjectPublicKeyInfo (RFC 8410)
const SPKI_PREFIX: [u8; 12] = [
    0x30, 0x2a, 0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x70, 0x03, 0x21, 0x00,
];

const PRIVATE_KEY_TAG: &str = "PRIVATE KEY";
const PUBLIC_KEY_TAG: &str = "PUBLIC KEY";

/// Ed25519 private key held by the worker
///
/// Only signatures leave this type; the PKCS#8 bytes are dropped after parsing.
pub struct SigningKey {
    pair: Ed25519KeyPair,
}

impl SigningKey {
    /// Generate a new key, returned as a PKCS#8 `PRIVATE KEY` PEM
    pub fn generate_pem() -> Result<Zeroizing<String>> {
        let rng = SystemRandom::new();
        let doc = Ed25519KeyPair::generate_pkcs8(&rng)
            .map_err(|_| CertError::InvalidKey("key generation failed".into()))?;
        let pem = ::pem::Pem::new(PRIVATE_KEY_TAG, doc.as_ref().to_vec());
        Ok(Zeroizing::new(::pem::encode(&pem)))
    }

    /// Load from a PKCS#8 PEM string (v1 or v2)
    pub fn from_pem(pem_str: &str) -> Result<Self> {
        let der = Zeroizing::new(decode_pem(pem_str, PRIVATE_KEY_TAG)?);
        let pair = Ed25519KeyPair::from_pkcs8_maybe_unchecked(&der)
            .map_err(|e| CertError::InvalidKey(format!("not an Ed25519 PKCS#8 key: {e}")))?;
        Ok(Self { pair })
    }

    /// Load from a PEM file on disk
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = Zeroizing::new(std::fs::read_to_string(path.as_ref())?);
        let key = Self::from_pem(&raw)?;
        tracing::debug!(path = %path.as_ref().display(), "Signing key loaded");
        Ok(key)
    }

    /// Sign `data`, returning the raw 64-byte signature
    pub fn sign(&self, data: &[u8]) -> Vec<u8> {
        self.pair.sign(data).as_ref().to_vec()
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        let mut bytes = [0u8; PUBLIC_KEY_LEN];
        bytes.copy_from_slice(self.pair.public_key().as_ref());
        VerifyingKey { bytes }
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("public", &self.verifying_key())
            .finish_non_exhaustive()
    }
}

/// Ed25519 public key used to check archive signatures
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct VerifyingKey {
    bytes: [u8; PUBLIC_KEY_LEN],
}

impl VerifyingKey {
    pub fn from_bytes(raw: &[u8]) -> Result<Self> {
        let bytes: [u8; PUBLIC_KEY_LEN] = raw.try_into().map_err(|_| {
            CertError::InvalidKey(format!(
                "public key must be {PUBLIC_KEY_LEN} bytes, got {}",
                raw.len()
            ))
        })?;
        Ok(Self { bytes })
    }

    /// Parse an SPKI `PUBLIC KEY` PEM
    pub fn from_pem(pem_str: &str) -> Result<Self> {
        let der = decode_pem(pem_str, PUBLIC_KEY_TAG)?;
        match der.strip_prefix(&SPKI_PREFIX[..]) {
            Some(raw) => Self::from_bytes(raw),
            None => Err(CertError::InvalidKey("not an Ed25519 public key".into())),
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_pem(&raw)
    }

    /// Encode as an SPKI `PUBLIC KEY` PEM
    pub fn to_pem(&self) -> String {
        let mut der = Vec::with_capacity(SPKI_PREFIX.len() + PUBLIC_KEY_LEN);
        der.extend_from_slice(&SPKI_PREFIX);
        der.extend_from_slice(&self.bytes);
        ::pem::encode(&::pem::Pem::new(PUBLIC_KEY_TAG, der))
    }

    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_LEN] {
        &self.bytes
    }

    pub fn verify(&self, data: &[u8], sig: &[u8]) -> Result<()> {
        UnparsedPublicKey::new(&signature::ED25519, &self.bytes)
            .verify(data, sig)
            .map_err(|_| CertError::VerificationFailed)
    }
}

impl fmt::Debug for VerifyingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use base64::Engine;
        let b64 = base64::engine::general_purpose::STANDARD.encode(self.bytes);
        f.debug_tuple("VerifyingKey").field(&b64).finish()
    }
}

fn decode_pem(pem_str: &str, tag: &str) -> Result<Vec<u8>> {
    let pems = ::pem::parse_many(pem_str).map_err(|e| CertError::Pem(e.to_string()))?;

    for p in pems {
        if p.tag() == tag {
            return Ok(p.into_contents());
        }
    }

    Err(CertError::Pem(format!("PEM tag '{}' not found", tag)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_pem_roundtrip() {
        let pem = SigningKey::generate_pem().unwrap();
        let key = SigningKey::from_pem(&pem).unwrap();
        let public = key.verifying_key();
        let parsed = VerifyingKey::from_pem(&public.to_pem()).unwrap();
        assert_eq!(public, parsed);
    }

    #[test]
    fn test_private_pem_rejected_as_public() {
        let pem = SigningKey::generate_pem().unwrap();
        assert!(matches!(
            VerifyingKey::from_pem(&pem),
            Err(CertError::Pem(_))
        ));
    }

    #[test]
    fn test_wrong_length_public_key() {
        assert!(VerifyingKey::from_bytes(&[1u8; 31]).is_err());
    }
}
