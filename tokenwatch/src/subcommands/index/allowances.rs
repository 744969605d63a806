use sqlx::SqlitePool;

use crate::db;

/// Zeroes every allowance that has expired as of the latest indexed block. Returns how
/// many were zeroed; already zeroed allowances are left alone.
pub async fn sweep_allowances(pool: &SqlitePool) -> anyhow::Result<usize> {
    let Some(latest) = db::blocks::latest(pool).await? else {
        tracing::debug!("No block indexed yet, nothing can have expired");
        return Ok(0);
    };

    let expired = db::allowances::all(pool)
        .await?
        .into_iter()
        .filter(|a| !a.allowance.amount.is_zero() && a.allowance.expires.is_expired(&latest))
        .collect::<Vec<_>>();
    if expired.is_empty() {
        return Ok(0);
    }

    let mut tx = pool.begin().await?;
    let mut zeroed = 0;
    for a in &expired {
        if db::allowances::zero(&mut tx, &a.token, &a.allowance.owner, &a.allowance.spender).await? {
            zeroed += 1;
        }
    }
    tx.commit().await?;

    tracing::info!("Expired {zeroed} allowances at height {}", latest.height);
    Ok(zeroed)
}
