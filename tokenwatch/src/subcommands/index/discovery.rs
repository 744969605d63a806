//! Intake of "this code id is a CW20 token" notifications.

use std::{sync::Arc, time::Duration};

use tokenwatch_core::{
    conformance::{self, NonConformance},
    NotificationError, TokenSnapshot, VerificationNotification,
};
use tokio::time::{interval, MissedTickBehavior};

use super::IndexContext;
use crate::{
    chain::ChainError,
    db,
    feed::{Delivery, NotificationFeed},
};

/// What the feed should do with a delivery once it has been handled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Deliver it again later.
    Retry,
    /// Done with it, whether or not anything changed.
    Absorb,
}

#[derive(thiserror::Error, Debug)]
pub enum IntakeError {
    #[error("store failure: {0}")]
    Store(#[from] anyhow::Error),
    #[error("chain query failure: {0}")]
    Query(#[from] ChainError),
    #[error(transparent)]
    Malformed(#[from] NotificationError),
}

impl From<sqlx::Error> for IntakeError {
    fn from(err: sqlx::Error) -> Self {
        IntakeError::Store(err.into())
    }
}

impl IntakeError {
    /// Service failures may succeed on redelivery, bad payloads never will.
    pub fn outcome(&self) -> Outcome {
        match self {
            IntakeError::Store(_) | IntakeError::Query(_) => Outcome::Retry,
            IntakeError::Malformed(_) => Outcome::Absorb,
        }
    }
}

/// Result of a handled notification. None of these are failures.
#[derive(Debug)]
pub enum Discovery {
    /// The code id was already verified.
    Duplicate,
    NonConformant(NonConformance),
    /// The code id is now verified and these existing contracts are tracked.
    Tracked { code_id: u64, tokens: Vec<String> },
}

pub async fn on_verification_notification(
    ctx: &IndexContext,
    payload: &[u8],
) -> Result<Discovery, IntakeError> {
    let notification = VerificationNotification::from_slice(payload)?;
    let code_id = notification.code_id;

    let _guard = ctx.guard.lock("discovery").await;

    if db::code_ids::is_verified(&ctx.pool, code_id).await? {
        tracing::debug!("Code id {code_id} is already verified");
        return Ok(Discovery::Duplicate);
    }

    if let Err(reason) =
        conformance::check(&notification.execute_schema, &notification.query_schema)
    {
        tracing::info!("Code id {code_id} does not conform to CW20:\n{reason}");
        return Ok(Discovery::NonConformant(reason));
    }

    let height = ctx.chain.latest_height().await?;
    let candidates = db::contracts::untracked(&ctx.pool, code_id).await?;
    tracing::info!(
        "Backfilling {} contracts of code id {code_id} at height {height}",
        candidates.len()
    );

    let mut tokens = Vec::with_capacity(candidates.len());
    for address in &candidates {
        let entries = ctx.chain.full_state(address, height).await?;
        match TokenSnapshot::from_entries(&entries) {
            Ok(snapshot) => tokens.push(snapshot.into_token(address, code_id)),
            Err(err) => tracing::warn!("Not tracking {address}: {err}"),
        }
    }

    let mut tx = ctx.pool.begin().await?;
    db::code_ids::insert(&mut tx, code_id).await?;
    for token in &tokens {
        db::tokens::insert(&mut tx, token, height).await?;
    }
    tx.commit().await?;

    let tokens = tokens.into_iter().map(|t| t.address).collect::<Vec<_>>();
    tracing::info!("Code id {code_id} verified, tracking {} tokens", tokens.len());
    Ok(Discovery::Tracked { code_id, tokens })
}

/// Handles one delivery and settles it with the feed.
pub(super) async fn handle(
    ctx: &IndexContext,
    feed: &dyn NotificationFeed,
    delivery: &Delivery,
) -> anyhow::Result<Outcome> {
    let outcome = match on_verification_notification(ctx, &delivery.payload).await {
        Ok(_) => Outcome::Absorb,
        Err(err) => {
            let outcome = err.outcome();
            match outcome {
                Outcome::Retry => tracing::warn!(
                    "Notification {} failed on attempt {}, retrying: {err}",
                    delivery.id,
                    delivery.attempts
                ),
                Outcome::Absorb => tracing::error!("Dropping notification {}: {err}", delivery.id),
            }
            outcome
        }
    };

    match outcome {
        Outcome::Absorb => feed.ack(delivery).await?,
        Outcome::Retry => feed.nack(delivery).await?,
    }
    Ok(outcome)
}

/// Handles deliveries until the feed is empty or one has to be retried. Whatever is left
/// waits for the next tick.
async fn drain(ctx: &IndexContext, feed: &dyn NotificationFeed) -> anyhow::Result<()> {
    while let Some(delivery) = feed.next().await? {
        if handle(ctx, feed, &delivery).await? == Outcome::Retry {
            break;
        }
    }
    Ok(())
}

/// Polls the feed until shutdown. A delivery interrupted by shutdown is never acked, so
/// the feed hands it out again.
pub(super) async fn consume(
    ctx: IndexContext,
    feed: Arc<dyn NotificationFeed>,
    delay: Duration,
) -> anyhow::Result<()> {
    let guard = elegant_departure::get_shutdown_guard();
    let mut interval = interval(delay);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                tokio::select! {
                    res = drain(&ctx, feed.as_ref()) => {
                        if let Err(err) = res {
                            tracing::error!("Notification feed error: {err}");
                        }
                    }
                    _ = guard.wait() => break,
                }
            }
            _ = guard.wait() => break,
        }
    }
    Ok(())
}
