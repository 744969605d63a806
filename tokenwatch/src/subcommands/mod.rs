mod index;

pub use index::*;
use sqlx::SqlitePool;
use tokenwatch_core::VerificationNotification;

use crate::{config::ConfigFile, db};

pub(crate) fn init() -> anyhow::Result<()> {
    let config_file = ConfigFile::example();
    let cfg = toml::to_string(&config_file)?;
    println!("{cfg} ");
    Ok(())
}

pub(crate) async fn verify(
    pool: &SqlitePool,
    code_id: u64,
    execute_schema: &std::path::Path,
    query_schema: &std::path::Path,
) -> anyhow::Result<()> {
    let notification = VerificationNotification {
        code_id,
        execute_schema: serde_json::from_str(&tokio::fs::read_to_string(execute_schema).await?)?,
        query_schema: serde_json::from_str(&tokio::fs::read_to_string(query_schema).await?)?,
    };
    let payload = notification.to_vec()?;
    // Validates the payload the same way the consumer will.
    VerificationNotification::from_slice(&payload)?;

    let id = db::queue::push(pool, &payload).await?;
    tracing::info!("Queued verification of code id {code_id} as notification {id}.");
    Ok(())
}

pub(crate) async fn sweep(pool: &SqlitePool) -> anyhow::Result<()> {
    let zeroed = sweep_allowances(pool).await?;
    println!("Expired {zeroed} allowances.");
    Ok(())
}

pub(crate) async fn reindex(pool: &SqlitePool, blockheight: i64) -> anyhow::Result<()> {
    tracing::info!("Re-indexing blocks from blockheight {blockheight}.");
    let forgotten = db::blocks::delete_from(pool, blockheight).await?;
    tracing::info!("Forgot {forgotten} indexed blocks.");
    Ok(())
}

pub(crate) fn version() {
    let version = env!("CARGO_PKG_VERSION");
    println!("Current version is {version}");
}
