//! Export request submission and lookup

use shared::error::{AppError, ErrorCode};
use shared::models::{Identity, Request, RequestDetail, RequestKind, RequestStatus};
use shared::util::now_millis;
use uuid::Uuid;

use crate::db::ExportRepository;
use crate::error::ServiceResult;

/// Minimum gap between two requests of the same kind for the same guild
pub const REQUEST_COOLDOWN_MS: i64 = 24 * 60 * 60 * 1000;

pub async fn submit(
    repo: &dyn ExportRepository,
    identity: &Identity,
    kind: RequestKind,
    guild_id: Option<i64>,
) -> ServiceResult<Request> {
    submit_at(repo, identity, kind, guild_id, now_millis()).await
}

/// Queue a new export after checking ownership, duplicates and the cooldown
pub async fn submit_at(
    repo: &dyn ExportRepository,
    identity: &Identity,
    kind: RequestKind,
    guild_id: Option<i64>,
    now: i64,
) -> ServiceResult<Request> {
    let guild_id = match guild_id {
        Some(id) if id != 0 => id,
        _ => {
            return Err(AppError::with_message(
                ErrorCode::RequiredField,
                "Guild ID required for this request type",
            )
            .into());
        }
    };
    if !identity.owns_guild(guild_id) {
        return Err(AppError::new(ErrorCode::GuildNotOwned).into());
    }

    let previous = repo.list_requests(identity.user_id).await?;
    for detail in previous
        .iter()
        .map(|d| &d.request)
        .filter(|r| r.kind == kind && r.guild_id == Some(guild_id))
    {
        if detail.status == RequestStatus::Queued {
            return Err(AppError::new(ErrorCode::RequestAlreadyQueued).into());
        }
        if detail.created_at > now - REQUEST_COOLDOWN_MS {
            return Err(AppError::new(ErrorCode::RequestCooldown)
                .with_detail("retry_after", detail.created_at + REQUEST_COOLDOWN_MS)
                .into());
        }
    }

    let request = repo
        .create_request(identity.user_id, kind, Some(guild_id), now)
        .await?;
    tracing::info!(
        request_id = %request.id,
        user_id = identity.user_id,
        guild_id,
        %kind,
        "Export request queued"
    );
    Ok(request)
}

pub async fn list(repo: &dyn ExportRepository, identity: &Identity) -> ServiceResult<Vec<RequestDetail>> {
    Ok(repo.list_requests(identity.user_id).await?)
}

/// A single request of the caller. Requests of other users read as missing.
pub async fn get(
    repo: &dyn ExportRepository,
    identity: &Identity,
    id: Uuid,
) -> ServiceResult<RequestDetail> {
    match repo.get_request(id).await? {
        Some(detail) if detail.request.user_id == identity.user_id => Ok(detail),
        _ => Err(AppError::not_found("Request").into()),
    }
}
