//! Artifact records

use shared::models::{Artifact, NewArtifact};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

pub async fn create(
    conn: &mut PgConnection,
    request_id: Uuid,
    artifact: &NewArtifact,
    now: i64,
) -> Result<Artifact, sqlx::Error> {
    sqlx::query_as(
        r#"
        INSERT INTO artifacts (id, request_id, key, expires_at, size, created_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id, request_id, key, expires_at, size, created_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(request_id)
    .bind(&artifact.key)
    .bind(artifact.expires_at)
    .bind(artifact.size)
    .bind(now)
    .fetch_one(&mut *conn)
    .await
}

/// Summed size of artifacts that have not expired at `now`
pub async fn active_size(pool: &PgPool, now: i64) -> Result<i64, sqlx::Error> {
    let (size,): (i64,) = sqlx::query_as(
        "SELECT COALESCE(SUM(size), 0)::BIGINT FROM artifacts WHERE expires_at > $1",
    )
    .bind(now)
    .fetch_one(pool)
    .await?;
    Ok(size)
}
