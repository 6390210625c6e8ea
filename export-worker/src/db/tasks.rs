//! Task queue storage
//!
//! A task is claimed by writing a fresh lease token and expiry onto it.
//! Finalization deletes the task only while that token is still in place.

use shared::models::{Lease, Task};
use sqlx::PgConnection;
use uuid::Uuid;

pub async fn create(
    conn: &mut PgConnection,
    request_id: Uuid,
    now: i64,
) -> Result<Task, sqlx::Error> {
    sqlx::query_as(
        r#"
        INSERT INTO tasks (id, request_id, created_at)
        VALUES ($1, $2, $3)
        RETURNING id, request_id, created_at, lease_token, lease_expires_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(request_id)
    .bind(now)
    .fetch_one(&mut *conn)
    .await
}

/// Lease the oldest task that is unleased or whose lease has lapsed
///
/// Rows locked by a concurrent worker are skipped rather than waited on.
pub async fn lease_next(
    conn: &mut PgConnection,
    token: Uuid,
    now: i64,
    expires_at: i64,
) -> Result<Option<Task>, sqlx::Error> {
    sqlx::query_as(
        r#"
        WITH next AS (
            SELECT id FROM tasks
            WHERE lease_expires_at IS NULL OR lease_expires_at <= $1
            ORDER BY created_at ASC
            LIMIT 1
            FOR UPDATE SKIP LOCKED
        )
        UPDATE tasks t
        SET lease_token = $2, lease_expires_at = $3
        FROM next
        WHERE t.id = next.id
        RETURNING t.id, t.request_id, t.created_at, t.lease_token, t.lease_expires_at
        "#,
    )
    .bind(now)
    .bind(token)
    .bind(expires_at)
    .fetch_optional(&mut *conn)
    .await
}

/// Delete a leased task. Returns false when the lease is no longer held.
pub async fn delete_leased(conn: &mut PgConnection, lease: &Lease) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM tasks WHERE id = $1 AND lease_token = $2")
        .bind(lease.task_id)
        .bind(lease.token)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected() == 1)
}
