//! Export request storage

use shared::models::{Artifact, Request, RequestDetail, RequestKind, RequestStatus};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

/// Request row joined with its (optional) artifact
#[derive(sqlx::FromRow)]
struct RequestArtifactRow {
    id: Uuid,
    user_id: i64,
    kind: RequestKind,
    guild_id: Option<i64>,
    status: RequestStatus,
    created_at: i64,
    artifact_id: Option<Uuid>,
    artifact_key: Option<String>,
    artifact_expires_at: Option<i64>,
    artifact_size: Option<i64>,
    artifact_created_at: Option<i64>,
}

impl From<RequestArtifactRow> for RequestDetail {
    fn from(row: RequestArtifactRow) -> Self {
        let artifact = match (
            row.artifact_id,
            row.artifact_key,
            row.artifact_expires_at,
            row.artifact_size,
            row.artifact_created_at,
        ) {
            (Some(id), Some(key), Some(expires_at), Some(size), Some(created_at)) => Some(Artifact {
                id,
                request_id: row.id,
                key,
                expires_at,
                size,
                created_at,
            }),
            _ => None,
        };

        RequestDetail {
            request: Request {
                id: row.id,
                user_id: row.user_id,
                kind: row.kind,
                guild_id: row.guild_id,
                status: row.status,
                created_at: row.created_at,
            },
            artifact,
        }
    }
}

const DETAIL_SELECT: &str = r#"
    SELECT r.id, r.user_id, r.kind, r.guild_id, r.status, r.created_at,
           a.id AS artifact_id, a.key AS artifact_key, a.expires_at AS artifact_expires_at,
           a.size AS artifact_size, a.created_at AS artifact_created_at
    FROM requests r
    LEFT JOIN artifacts a ON a.request_id = r.id
"#;

/// Insert a new request in `queued` state
pub async fn create(
    conn: &mut PgConnection,
    user_id: i64,
    kind: RequestKind,
    guild_id: Option<i64>,
    now: i64,
) -> Result<Request, sqlx::Error> {
    sqlx::query_as(
        r#"
        INSERT INTO requests (id, user_id, kind, guild_id, status, created_at)
        VALUES ($1, $2, $3, $4, 'queued', $5)
        RETURNING id, user_id, kind, guild_id, status, created_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(kind)
    .bind(guild_id)
    .bind(now)
    .fetch_one(&mut *conn)
    .await
}

pub async fn find_by_id(conn: &mut PgConnection, id: Uuid) -> Result<Option<Request>, sqlx::Error> {
    sqlx::query_as(
        "SELECT id, user_id, kind, guild_id, status, created_at FROM requests WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await
}

pub async fn set_status(
    conn: &mut PgConnection,
    id: Uuid,
    status: RequestStatus,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE requests SET status = $1 WHERE id = $2")
        .bind(status)
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// All requests of a user, newest first
pub async fn list_for_user(pool: &PgPool, user_id: i64) -> Result<Vec<RequestDetail>, sqlx::Error> {
    let query = format!("{DETAIL_SELECT} WHERE r.user_id = $1 ORDER BY r.created_at DESC");
    let rows: Vec<RequestArtifactRow> = sqlx::query_as(&query)
        .bind(user_id)
        .fetch_all(pool)
        .await?;
    Ok(rows.into_iter().map(RequestDetail::from).collect())
}

pub async fn find_detail(pool: &PgPool, id: Uuid) -> Result<Option<RequestDetail>, sqlx::Error> {
    let query = format!("{DETAIL_SELECT} WHERE r.id = $1");
    let row: Option<RequestArtifactRow> = sqlx::query_as(&query)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(RequestDetail::from))
}

/// Delete requests created before `cutoff`; tasks and artifacts cascade
pub async fn delete_created_before(pool: &PgPool, cutoff: i64) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM requests WHERE created_at < $1")
        .bind(cutoff)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}
