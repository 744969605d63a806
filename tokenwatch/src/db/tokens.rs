#![allow(clippy::module_name_repetitions)]

use sqlx::{Executor, FromRow, Sqlite, Transaction};
use tokenwatch_core::{Amount, Marketing, TrackedToken};

use crate::db::{allowances, balances};

#[derive(FromRow, Debug, Clone)]
pub struct TokenRow {
    pub address: String,
    pub code_id: i64,
    pub name: String,
    pub symbol: String,
    pub decimals: i64,
    pub total_supply: String,
    pub minter: Option<String>,
    pub cap: Option<String>,
    pub project: Option<String>,
    pub description: Option<String>,
    pub marketing: Option<String>,
    pub logo: Option<String>,
    pub height: i64,
}

impl TokenRow {
    pub fn marketing(&self) -> Marketing {
        Marketing {
            project: self.project.clone(),
            description: self.description.clone(),
            marketing: self.marketing.clone(),
        }
    }

    pub fn total_supply(&self) -> anyhow::Result<Amount> {
        Ok(self.total_supply.parse()?)
    }
}

/// Stores a token from a full snapshot, replacing whatever was known about it before.
pub async fn insert(
    tx: &mut Transaction<'_, Sqlite>,
    token: &TrackedToken,
    height: u64,
) -> anyhow::Result<()> {
    sqlx::query(
        "INSERT INTO tokens (address, code_id, name, symbol, decimals, total_supply, minter, cap, project, description, marketing, logo, height)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT (address) DO UPDATE SET code_id = excluded.code_id, name = excluded.name, symbol = excluded.symbol,
            decimals = excluded.decimals, total_supply = excluded.total_supply, minter = excluded.minter, cap = excluded.cap,
            project = excluded.project, description = excluded.description, marketing = excluded.marketing,
            logo = excluded.logo, height = excluded.height;",
    )
    .bind(&token.address)
    .bind(token.code_id as i64)
    .bind(&token.name)
    .bind(&token.symbol)
    .bind(i64::from(token.decimals))
    .bind(token.total_supply.to_string())
    .bind(&token.minter)
    .bind(token.cap.map(|c| c.to_string()))
    .bind(&token.marketing.project)
    .bind(&token.marketing.description)
    .bind(&token.marketing.marketing)
    .bind(&token.logo)
    .bind(height as i64)
    .execute(&mut *tx)
    .await?;

    sqlx::query("DELETE FROM balances WHERE token = ?;")
        .bind(&token.address)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM allowances WHERE token = ?;")
        .bind(&token.address)
        .execute(&mut *tx)
        .await?;

    for balance in &token.balances {
        balances::set(&mut *tx, &token.address, &balance.holder, balance.amount, height).await?;
    }
    for allowance in &token.allowances {
        allowances::set(&mut *tx, &token.address, allowance, height).await?;
    }
    Ok(())
}

pub async fn is_tracked(
    conn: impl Executor<'_, Database = Sqlite>,
    address: &str,
) -> anyhow::Result<bool> {
    let (tracked,) =
        sqlx::query_as::<_, (i64,)>("SELECT EXISTS (SELECT 1 FROM tokens WHERE address = ?);")
            .bind(address)
            .fetch_one(conn)
            .await?;
    Ok(tracked != 0)
}

pub async fn get(
    conn: impl Executor<'_, Database = Sqlite>,
    address: &str,
) -> anyhow::Result<Option<TokenRow>> {
    let token = sqlx::query_as::<_, TokenRow>("SELECT * FROM tokens WHERE address = ?;")
        .bind(address)
        .fetch_optional(conn)
        .await?;
    Ok(token)
}

pub async fn count(conn: impl Executor<'_, Database = Sqlite>) -> anyhow::Result<i64> {
    let (count,) = sqlx::query_as::<_, (i64,)>("SELECT count(*) FROM tokens;")
        .fetch_one(conn)
        .await?;
    Ok(count)
}

pub async fn set_code_id(
    conn: impl Executor<'_, Database = Sqlite>,
    address: &str,
    code_id: u64,
    height: u64,
) -> anyhow::Result<()> {
    sqlx::query("UPDATE tokens SET code_id = ?, height = ? WHERE address = ?;")
        .bind(code_id as i64)
        .bind(height as i64)
        .bind(address)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn set_minter(
    conn: impl Executor<'_, Database = Sqlite>,
    address: &str,
    minter: Option<&str>,
    height: u64,
) -> anyhow::Result<()> {
    sqlx::query("UPDATE tokens SET minter = ?, height = ? WHERE address = ?;")
        .bind(minter)
        .bind(height as i64)
        .bind(address)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn set_marketing(
    conn: impl Executor<'_, Database = Sqlite>,
    address: &str,
    marketing: &Marketing,
    height: u64,
) -> anyhow::Result<()> {
    sqlx::query(
        "UPDATE tokens SET project = ?, description = ?, marketing = ?, height = ? WHERE address = ?;",
    )
    .bind(&marketing.project)
    .bind(&marketing.description)
    .bind(&marketing.marketing)
    .bind(height as i64)
    .bind(address)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn set_logo(
    conn: impl Executor<'_, Database = Sqlite>,
    address: &str,
    logo: &str,
    height: u64,
) -> anyhow::Result<()> {
    sqlx::query("UPDATE tokens SET logo = ?, height = ? WHERE address = ?;")
        .bind(logo)
        .bind(height as i64)
        .bind(address)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn set_supply(
    conn: impl Executor<'_, Database = Sqlite>,
    address: &str,
    supply: Amount,
    height: u64,
) -> anyhow::Result<()> {
    sqlx::query("UPDATE tokens SET total_supply = ?, height = ? WHERE address = ?;")
        .bind(supply.to_string())
        .bind(height as i64)
        .bind(address)
        .execute(conn)
        .await?;
    Ok(())
}

/// Stops tracking a token, dropping its balances and allowances with it.
pub async fn delete(tx: &mut Transaction<'_, Sqlite>, address: &str) -> anyhow::Result<()> {
    tracing::debug!("DELETING token {address}");
    sqlx::query("DELETE FROM balances WHERE token = ?;")
        .bind(address)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM allowances WHERE token = ?;")
        .bind(address)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM tokens WHERE address = ?;")
        .bind(address)
        .execute(&mut *tx)
        .await?;
    Ok(())
}
