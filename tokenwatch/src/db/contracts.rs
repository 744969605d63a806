use sqlx::{Executor, Sqlite};

/// A contract instance as recorded from its instantiate message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Contract {
    pub address: String,
    pub code_id: u64,
    pub creator: String,
    pub admin: Option<String>,
    pub label: String,
    pub height: u64,
}

pub async fn insert(
    conn: impl Executor<'_, Database = Sqlite>,
    contract: &Contract,
) -> anyhow::Result<()> {
    sqlx::query(
        "INSERT INTO contracts (address, code_id, creator, admin, label, height) VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT (address) DO UPDATE SET code_id = excluded.code_id, creator = excluded.creator,
            admin = excluded.admin, label = excluded.label, height = excluded.height;",
    )
    .bind(&contract.address)
    .bind(contract.code_id as i64)
    .bind(&contract.creator)
    .bind(&contract.admin)
    .bind(&contract.label)
    .bind(contract.height as i64)
    .execute(conn)
    .await?;
    Ok(())
}

/// Records a migration. Contracts instantiated before indexing started get a bare row.
pub async fn set_code_id(
    conn: impl Executor<'_, Database = Sqlite>,
    address: &str,
    code_id: u64,
) -> anyhow::Result<()> {
    sqlx::query(
        "INSERT INTO contracts (address, code_id) VALUES (?, ?)
        ON CONFLICT (address) DO UPDATE SET code_id = excluded.code_id;",
    )
    .bind(address)
    .bind(code_id as i64)
    .execute(conn)
    .await?;
    Ok(())
}

/// Addresses instantiated under `code_id` that are not tracked as tokens yet.
pub async fn untracked(
    conn: impl Executor<'_, Database = Sqlite>,
    code_id: u64,
) -> anyhow::Result<Vec<String>> {
    let rows = sqlx::query_as::<_, (String,)>(
        "SELECT c.address FROM contracts c
        LEFT JOIN tokens t ON t.address = c.address
        WHERE c.code_id = ? AND t.address IS NULL
        ORDER BY c.height, c.address;",
    )
    .bind(code_id as i64)
    .fetch_all(conn)
    .await?;
    Ok(rows.into_iter().map(|(address,)| address).collect())
}
