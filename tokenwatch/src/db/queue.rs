//! Durable storage behind the verification notification feed.
//!
//! A claimed row stays in the table until it is acked. Nacked rows become visible
//! again once their backoff has elapsed.

use sqlx::{Executor, FromRow, Sqlite};

#[derive(FromRow, Debug, Clone, PartialEq, Eq)]
pub struct QueuedNotification {
    pub id: i64,
    pub payload: Vec<u8>,
    pub attempts: i64,
}

pub async fn push(conn: impl Executor<'_, Database = Sqlite>, payload: &[u8]) -> anyhow::Result<i64> {
    let (id,) = sqlx::query_as::<_, (i64,)>(
        "INSERT INTO notification_queue (payload, available_at) VALUES (?, unixepoch()) RETURNING id;",
    )
    .bind(payload)
    .fetch_one(conn)
    .await?;
    Ok(id)
}

/// Claims the oldest available notification, counting the attempt.
pub async fn claim(
    conn: impl Executor<'_, Database = Sqlite>,
) -> anyhow::Result<Option<QueuedNotification>> {
    let claimed = sqlx::query_as::<_, QueuedNotification>(
        "UPDATE notification_queue SET claimed_at = unixepoch(), attempts = attempts + 1
        WHERE id = (
            SELECT id FROM notification_queue
            WHERE claimed_at IS NULL AND available_at <= unixepoch()
            ORDER BY available_at, id LIMIT 1
        )
        RETURNING id, payload, attempts;",
    )
    .fetch_optional(conn)
    .await?;
    Ok(claimed)
}

pub async fn ack(conn: impl Executor<'_, Database = Sqlite>, id: i64) -> anyhow::Result<()> {
    sqlx::query("DELETE FROM notification_queue WHERE id = ?;")
        .bind(id)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn nack(
    conn: impl Executor<'_, Database = Sqlite>,
    id: i64,
    delay_secs: u64,
) -> anyhow::Result<()> {
    sqlx::query(
        "UPDATE notification_queue SET claimed_at = NULL, available_at = unixepoch() + ? WHERE id = ?;",
    )
    .bind(delay_secs as i64)
    .bind(id)
    .execute(conn)
    .await?;
    Ok(())
}

/// Returns notifications claimed by a previous run that never acked them.
pub async fn release_claims(conn: impl Executor<'_, Database = Sqlite>) -> anyhow::Result<u64> {
    let released =
        sqlx::query("UPDATE notification_queue SET claimed_at = NULL WHERE claimed_at IS NOT NULL;")
            .execute(conn)
            .await?;
    Ok(released.rows_affected())
}

pub async fn len(conn: impl Executor<'_, Database = Sqlite>) -> anyhow::Result<i64> {
    let (count,) = sqlx::query_as::<_, (i64,)>("SELECT count(*) FROM notification_queue;")
        .fetch_one(conn)
        .await?;
    Ok(count)
}
