use sqlx::{Executor, Sqlite};

pub async fn is_verified(
    conn: impl Executor<'_, Database = Sqlite>,
    code_id: u64,
) -> anyhow::Result<bool> {
    let (verified,) = sqlx::query_as::<_, (i64,)>(
        "SELECT EXISTS (SELECT 1 FROM verified_code_ids WHERE code_id = ?);",
    )
    .bind(code_id as i64)
    .fetch_one(conn)
    .await?;
    Ok(verified != 0)
}

/// Adds a code id to the allow-list. Code ids are never removed.
pub async fn insert(conn: impl Executor<'_, Database = Sqlite>, code_id: u64) -> anyhow::Result<()> {
    sqlx::query(
        "INSERT INTO verified_code_ids (code_id, verified_at) VALUES (?, unixepoch()) ON CONFLICT DO NOTHING;",
    )
    .bind(code_id as i64)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn count(conn: impl Executor<'_, Database = Sqlite>) -> anyhow::Result<i64> {
    let (count,) = sqlx::query_as::<_, (i64,)>("SELECT count(*) FROM verified_code_ids;")
        .fetch_one(conn)
        .await?;
    Ok(count)
}
