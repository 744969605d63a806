use crate::config::Config;

use sqlx::SqlitePool;

pub mod allowances;
pub mod balances;
pub mod blocks;
pub mod code_ids;
pub mod contracts;
pub mod queue;
pub mod tokens;

static MIGRATIONS: [&str; 10] = [
    "CREATE TABLE verified_code_ids (code_id INTEGER PRIMARY KEY, verified_at INTEGER NOT NULL);",
    "CREATE TABLE contracts (address TEXT PRIMARY KEY, code_id INTEGER NOT NULL, creator TEXT, admin TEXT, label TEXT, height INTEGER);",
    "CREATE INDEX contracts_code_id_idx ON contracts (code_id);",
    "CREATE TABLE tokens (address TEXT PRIMARY KEY, code_id INTEGER NOT NULL, name TEXT NOT NULL, symbol TEXT NOT NULL, decimals INTEGER NOT NULL,
        total_supply TEXT NOT NULL, minter TEXT, cap TEXT, project TEXT, description TEXT, marketing TEXT, logo TEXT, height INTEGER NOT NULL);",

    // Only non-zero balances are stored, a missing row means the holder has nothing.
    "CREATE TABLE balances (token TEXT NOT NULL, holder TEXT NOT NULL, amount TEXT NOT NULL, height INTEGER NOT NULL, PRIMARY KEY (token, holder));",

    // Expired allowances keep their row with amount '0'. At most one of the expires_* columns is set, neither means never.
    "CREATE TABLE allowances (token TEXT NOT NULL, owner TEXT NOT NULL, spender TEXT NOT NULL, amount TEXT NOT NULL,
        expires_height INTEGER, expires_time INTEGER, height INTEGER NOT NULL, PRIMARY KEY (token, owner, spender));",
    "CREATE TABLE blocks (height INTEGER PRIMARY KEY, time INTEGER NOT NULL, hash TEXT);",
    "CREATE TABLE notification_queue (id INTEGER PRIMARY KEY, payload BLOB NOT NULL, attempts INTEGER NOT NULL DEFAULT 0,
        available_at INTEGER NOT NULL, claimed_at INTEGER);",
    "CREATE INDEX notification_queue_available_idx ON notification_queue (available_at);",
    "CREATE INDEX allowances_expiring_idx ON allowances (expires_height, expires_time);",
];

pub async fn initialize(config: &Config) -> anyhow::Result<SqlitePool> {
    let conn = config.sqlite().await?;
    migrate(&conn).await?;
    Ok(conn)
}

pub async fn migrate(conn: &SqlitePool) -> anyhow::Result<()> {
    sqlx::query("CREATE TABLE IF NOT EXISTS schema (version);")
        .execute(conn)
        .await?;

    let (version,) =
        sqlx::query_as::<_, (i64,)>("SELECT COALESCE(MAX(version) + 1, 0) FROM schema;")
            .fetch_one(conn)
            .await?;

    for (idx, migration) in MIGRATIONS[version as usize..].iter().enumerate() {
        let version = idx as i64 + version;
        let mut tx = conn.begin().await?;
        tracing::debug!("Migrations schema version {version}");
        sqlx::query(migration).execute(&mut tx).await?;
        sqlx::query("INSERT INTO schema (version) VALUES (?);")
            .bind(version)
            .execute(&mut tx)
            .await?;
        tx.commit().await?;
    }

    Ok(())
}

/// A migrated in-memory database. One connection, since every connection to
/// `sqlite::memory:` opens its own empty database.
#[cfg(test)]
pub async fn memory() -> SqlitePool {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    migrate(&pool).await.unwrap();
    pool
}
