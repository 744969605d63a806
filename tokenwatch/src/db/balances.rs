use sqlx::{Executor, Sqlite};
use tokenwatch_core::{Amount, Balance};

/// Overwrites a holder's balance with a freshly queried amount. Zero removes the row.
pub async fn set(
    conn: impl Executor<'_, Database = Sqlite>,
    token: &str,
    holder: &str,
    amount: Amount,
    height: u64,
) -> anyhow::Result<()> {
    if amount.is_zero() {
        sqlx::query("DELETE FROM balances WHERE token = ? AND holder = ?;")
            .bind(token)
            .bind(holder)
            .execute(conn)
            .await?;
        return Ok(());
    }

    sqlx::query(
        "INSERT INTO balances (token, holder, amount, height) VALUES (?, ?, ?, ?)
        ON CONFLICT (token, holder) DO UPDATE SET amount = excluded.amount, height = excluded.height;",
    )
    .bind(token)
    .bind(holder)
    .bind(amount.to_string())
    .bind(height as i64)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn get(
    conn: impl Executor<'_, Database = Sqlite>,
    token: &str,
    holder: &str,
) -> anyhow::Result<Amount> {
    let amount = sqlx::query_as::<_, (String,)>(
        "SELECT amount FROM balances WHERE token = ? AND holder = ?;",
    )
    .bind(token)
    .bind(holder)
    .fetch_optional(conn)
    .await?;

    match amount {
        Some((amount,)) => Ok(amount.parse()?),
        None => Ok(Amount::ZERO),
    }
}

pub async fn for_token(
    conn: impl Executor<'_, Database = Sqlite>,
    token: &str,
) -> anyhow::Result<Vec<Balance>> {
    let rows = sqlx::query_as::<_, (String, String)>(
        "SELECT holder, amount FROM balances WHERE token = ? ORDER BY holder;",
    )
    .bind(token)
    .fetch_all(conn)
    .await?;

    rows.into_iter()
        .map(|(holder, amount)| {
            Ok(Balance {
                holder,
                amount: amount.parse()?,
            })
        })
        .collect()
}
