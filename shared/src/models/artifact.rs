//! Artifact Model

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stored, encrypted output of a completed request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct Artifact {
    pub id: Uuid,
    pub request_id: Uuid,
    /// Random storage key, meaningless outside the artifact store
    #[serde(skip)]
    pub key: String,
    pub expires_at: i64,
    /// Byte length of the plaintext archive
    pub size: i64,
    pub created_at: i64,
}

impl Artifact {
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at <= now
    }
}

/// Values needed to record a freshly stored artifact
#[derive(Debug, Clone, PartialEq)]
pub struct NewArtifact {
    pub key: String,
    pub expires_at: i64,
    pub size: i64,
}
