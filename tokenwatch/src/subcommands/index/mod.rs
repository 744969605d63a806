use std::{sync::Arc, time::Duration};

use sqlx::SqlitePool;
use tokio::time::{interval, MissedTickBehavior};

use crate::{
    chain::{BlockSource, ChainQuery},
    config::Config,
    db,
    feed::QueueFeed,
    guard::LedgerGuard,
};

mod allowances;
mod discovery;
mod transactions;

pub use allowances::sweep_allowances;

/// What both pipelines share: the store, the chain and the critical section between them.
#[derive(Clone)]
pub struct IndexContext {
    pub pool: SqlitePool,
    pub chain: Arc<dyn ChainQuery>,
    pub guard: Arc<LedgerGuard>,
}

impl IndexContext {
    pub fn new(pool: SqlitePool, chain: Arc<dyn ChainQuery>) -> IndexContext {
        IndexContext {
            pool,
            chain,
            guard: Arc::new(LedgerGuard::new()),
        }
    }
}

pub async fn index(config: &Config, pool: &SqlitePool) -> anyhow::Result<()> {
    let client = Arc::new(config.lcd_client()?);
    let ctx = IndexContext::new(pool.clone(), client.clone());
    let feed = Arc::new(QueueFeed::open(pool.clone(), config.retry_backoff()).await?);

    tracing::info!(
        "Tracking {} tokens across {} verified code ids, {} notifications pending",
        db::tokens::count(pool).await?,
        db::code_ids::count(pool).await?,
        db::queue::len(pool).await?
    );
    tracing::info!("Indexing from block height {}", config.start_height());
    let blocks = tokio::spawn(replay(
        ctx.clone(),
        client,
        config.start_height(),
        config.block_delay(),
    ));
    let notifications = tokio::spawn(discovery::consume(
        ctx.clone(),
        feed,
        config.notification_delay(),
    ));
    let sweeper = tokio::spawn(sweep(ctx.pool.clone(), config.sweep_delay()));

    elegant_departure::tokio::depart().on_termination().await;
    tracing::info!("Shutting down indexer.");
    elegant_departure::shutdown().await;

    for task in [blocks, notifications, sweeper] {
        if let Err(err) = task.await? {
            tracing::error!("Indexer task failed: {err}");
        }
    }
    tracing::info!("Indexer shutdown complete.");
    Ok(())
}

async fn replay(
    ctx: IndexContext,
    blocks: Arc<dyn BlockSource>,
    start_height: u64,
    delay: Duration,
) -> anyhow::Result<()> {
    let guard = elegant_departure::get_shutdown_guard();
    let mut interval = interval(delay);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let indexed = transactions::index_blocks(&ctx, blocks.as_ref(), start_height).await;
                if let Err(err) = indexed {
                    tracing::error!("Block indexing error: {err}");
                }
            }
            _ = guard.wait() => break,
        }
    }
    Ok(())
}

async fn sweep(pool: SqlitePool, delay: Duration) -> anyhow::Result<()> {
    let guard = elegant_departure::get_shutdown_guard();
    let mut interval = interval(delay);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Err(err) = sweep_allowances(&pool).await {
                    tracing::error!("Allowance sweep error: {err}");
                }
            }
            _ = guard.wait() => break,
        }
    }
    Ok(())
}
