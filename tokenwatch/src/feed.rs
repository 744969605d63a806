//! The verification notification feed consumed by discovery.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::db;

/// One delivery of a notification. Delivery is at-least-once: anything not acked is
/// delivered again.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Delivery {
    pub id: i64,
    pub payload: Vec<u8>,
    pub attempts: u32,
}

#[async_trait]
pub trait NotificationFeed: Send + Sync {
    /// The next notification ready for delivery, if any.
    async fn next(&self) -> anyhow::Result<Option<Delivery>>;

    async fn ack(&self, delivery: &Delivery) -> anyhow::Result<()>;

    async fn nack(&self, delivery: &Delivery) -> anyhow::Result<()>;
}

/// A feed backed by the `notification_queue` table.
#[derive(Clone, Debug)]
pub struct QueueFeed {
    pool: SqlitePool,
    backoff: Duration,
}

const MAX_BACKOFF_DOUBLINGS: u32 = 6;

impl QueueFeed {
    /// Opens the feed, making notifications left claimed by an earlier run deliverable again.
    pub async fn open(pool: SqlitePool, backoff: Duration) -> anyhow::Result<QueueFeed> {
        let released = db::queue::release_claims(&pool).await?;
        if released > 0 {
            tracing::info!("Released {released} notifications claimed by a previous run");
        }
        Ok(QueueFeed { pool, backoff })
    }

    pub async fn push(&self, payload: &[u8]) -> anyhow::Result<i64> {
        db::queue::push(&self.pool, payload).await
    }

    /// Delay before a nacked delivery is retried, doubling with each attempt.
    fn delay(&self, attempts: u32) -> u64 {
        let doublings = attempts.saturating_sub(1).min(MAX_BACKOFF_DOUBLINGS);
        self.backoff.as_secs() << doublings
    }
}

#[async_trait]
impl NotificationFeed for QueueFeed {
    async fn next(&self) -> anyhow::Result<Option<Delivery>> {
        let claimed = db::queue::claim(&self.pool).await?;
        Ok(claimed.map(|n| Delivery {
            id: n.id,
            payload: n.payload,
            attempts: u32::try_from(n.attempts).unwrap_or(u32::MAX),
        }))
    }

    async fn ack(&self, delivery: &Delivery) -> anyhow::Result<()> {
        db::queue::ack(&self.pool, delivery.id).await
    }

    async fn nack(&self, delivery: &Delivery) -> anyhow::Result<()> {
        let delay = self.delay(delivery.attempts);
        tracing::debug!("Notification {} redelivered in {delay}s", delivery.id);
        db::queue::nack(&self.pool, delivery.id, delay).await
    }
}
