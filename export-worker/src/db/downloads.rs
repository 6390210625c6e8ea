//! Download accounting for the rolling daily quotas

use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

/// Serialize quota checks of one user until the transaction ends
pub async fn lock_user(conn: &mut PgConnection, user_id: i64) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(user_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn create(
    conn: &mut PgConnection,
    user_id: i64,
    artifact_id: Uuid,
    size: i64,
    now: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO downloads (id, user_id, artifact_id, size, created_at) VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(artifact_id)
    .bind(size)
    .bind(now)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn user_bytes_since(
    conn: &mut PgConnection,
    user_id: i64,
    since: i64,
) -> Result<i64, sqlx::Error> {
    let (total,): (i64,) = sqlx::query_as(
        "SELECT COALESCE(SUM(size), 0)::BIGINT FROM downloads WHERE user_id = $1 AND created_at > $2",
    )
    .bind(user_id)
    .bind(since)
    .fetch_one(&mut *conn)
    .await?;
    Ok(total)
}

pub async fn bytes_since(conn: &mut PgConnection, since: i64) -> Result<i64, sqlx::Error> {
    let (total,): (i64,) =
        sqlx::query_as("SELECT COALESCE(SUM(size), 0)::BIGINT FROM downloads WHERE created_at > $1")
            .bind(since)
            .fetch_one(&mut *conn)
            .await?;
    Ok(total)
}

pub async fn delete_created_before(pool: &PgPool, cutoff: i64) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM downloads WHERE created_at < $1")
        .bind(cutoff)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}
