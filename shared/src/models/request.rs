//! Export Request and Task Models

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::Artifact;

/// What a request exports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "db", derive(sqlx::Type))]
#[cfg_attr(
    feature = "db",
    sqlx(type_name = "request_kind", rename_all = "snake_case")
)]
pub enum RequestKind {
    GuildTranscripts,
    GuildData,
}

impl RequestKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GuildTranscripts => "guild_transcripts",
            Self::GuildData => "guild_data",
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request lifecycle. Only the worker moves a request out of `Queued`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "db", derive(sqlx::Type))]
#[cfg_attr(
    feature = "db",
    sqlx(type_name = "request_status", rename_all = "snake_case")
)]
pub enum RequestStatus {
    Queued,
    Completed,
    Failed,
}

/// A user-initiated export job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct Request {
    pub id: Uuid,
    pub user_id: i64,
    pub kind: RequestKind,
    pub guild_id: Option<i64>,
    pub status: RequestStatus,
    pub created_at: i64,
}

/// Queue entry for a request with outstanding work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct Task {
    pub id: Uuid,
    pub request_id: Uuid,
    pub created_at: i64,
    /// Token of the worker currently holding the task, if any
    pub lease_token: Option<Uuid>,
    /// Lease is reclaimable once this instant (millis) has passed
    pub lease_expires_at: Option<i64>,
}

/// Proof of a lease, presented when finalizing a task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lease {
    pub task_id: Uuid,
    pub token: Uuid,
    pub expires_at: i64,
}

/// Request together with its artifact, for listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestDetail {
    #[serde(flatten)]
    pub request: Request,
    pub artifact: Option<Artifact>,
}
