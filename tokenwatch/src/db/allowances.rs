use sqlx::{sqlite::SqliteRow, Executor, FromRow, Row, Sqlite};
use tokenwatch_core::{Allowance, Expiration, Timestamp};

/// An allowance together with the token it belongs to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenAllowance {
    pub token: String,
    pub allowance: Allowance,
}

impl<'r> FromRow<'r, SqliteRow> for TokenAllowance {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let expires = Expiration::from_parts(
            row.try_get::<Option<i64>, _>("expires_height")?
                .map(|h| h as u64),
            row.try_get::<Option<i64>, _>("expires_time")?
                .map(|t| Timestamp::from_nanos(t as u64)),
        );
        Ok(TokenAllowance {
            token: row.try_get("token")?,
            allowance: Allowance {
                owner: row.try_get("owner")?,
                spender: row.try_get("spender")?,
                amount: row
                    .try_get::<String, _>("amount")?
                    .parse()
                    .map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
                expires,
            },
        })
    }
}

pub async fn set(
    conn: impl Executor<'_, Database = Sqlite>,
    token: &str,
    allowance: &Allowance,
    height: u64,
) -> anyhow::Result<()> {
    sqlx::query(
        "INSERT INTO allowances (token, owner, spender, amount, expires_height, expires_time, height) VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT (token, owner, spender) DO UPDATE SET amount = excluded.amount, expires_height = excluded.expires_height,
            expires_time = excluded.expires_time, height = excluded.height;",
    )
    .bind(token)
    .bind(&allowance.owner)
    .bind(&allowance.spender)
    .bind(allowance.amount.to_string())
    .bind(allowance.expires.height().map(|h| h as i64))
    .bind(allowance.expires.time().map(|t| t.nanos() as i64))
    .bind(height as i64)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn get(
    conn: impl Executor<'_, Database = Sqlite>,
    token: &str,
    owner: &str,
    spender: &str,
) -> anyhow::Result<Option<Allowance>> {
    let row = sqlx::query_as::<_, TokenAllowance>(
        "SELECT * FROM allowances WHERE token = ? AND owner = ? AND spender = ?;",
    )
    .bind(token)
    .bind(owner)
    .bind(spender)
    .fetch_optional(conn)
    .await?;
    Ok(row.map(|r| r.allowance))
}

pub async fn all(conn: impl Executor<'_, Database = Sqlite>) -> anyhow::Result<Vec<TokenAllowance>> {
    let rows = sqlx::query_as::<_, TokenAllowance>(
        "SELECT * FROM allowances ORDER BY token, owner, spender;",
    )
    .fetch_all(conn)
    .await?;
    Ok(rows)
}

/// Marks an allowance as spent down to nothing. The row is kept.
pub async fn zero(
    conn: impl Executor<'_, Database = Sqlite>,
    token: &str,
    owner: &str,
    spender: &str,
) -> anyhow::Result<bool> {
    let updated = sqlx::query(
        "UPDATE allowances SET amount = '0' WHERE token = ? AND owner = ? AND spender = ? AND amount != '0';",
    )
    .bind(token)
    .bind(owner)
    .bind(spender)
    .execute(conn)
    .await?;
    Ok(updated.rows_affected() > 0)
}
