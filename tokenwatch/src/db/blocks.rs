use sqlx::{Executor, Sqlite};
use tokenwatch_core::{BlockInfo, Timestamp};

pub async fn insert(
    conn: impl Executor<'_, Database = Sqlite>,
    block: &BlockInfo,
    hash: &str,
) -> anyhow::Result<()> {
    sqlx::query("INSERT INTO blocks (height, time, hash) VALUES (?, ?, ?) ON CONFLICT DO NOTHING;")
        .bind(block.height as i64)
        .bind(block.time.nanos() as i64)
        .bind(hash)
        .execute(conn)
        .await?;
    Ok(())
}

/// The most recent block the indexer has fully processed.
pub async fn latest(conn: impl Executor<'_, Database = Sqlite>) -> anyhow::Result<Option<BlockInfo>> {
    let block = sqlx::query_as::<_, (i64, i64)>(
        "SELECT height, time FROM blocks ORDER BY height DESC LIMIT 1;",
    )
    .fetch_optional(conn)
    .await?;

    Ok(block.map(|(height, time)| BlockInfo {
        height: height as u64,
        time: Timestamp::from_nanos(time as u64),
    }))
}

pub async fn next_height(
    conn: impl Executor<'_, Database = Sqlite>,
    start_height: u64,
) -> anyhow::Result<u64> {
    let (h,) = sqlx::query_as::<_, (i64,)>("SELECT COALESCE(MAX(height), 0) + 1 FROM blocks;")
        .fetch_one(conn)
        .await?;

    Ok((h as u64).max(start_height))
}

pub async fn delete_from(
    conn: impl Executor<'_, Database = Sqlite>,
    height: i64,
) -> anyhow::Result<u64> {
    let deleted = sqlx::query("DELETE FROM blocks WHERE height >= ?;")
        .bind(height)
        .execute(conn)
        .await?;
    Ok(deleted.rows_affected())
}
