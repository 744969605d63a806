use tokio::sync::{Mutex, MutexGuard};

/// The one critical section shared by discovery and the transaction pipeline.
///
/// Whoever holds it may read "is this code id verified" and act on the answer without
/// the other pipeline changing it underneath. Tracking state for a code id is only
/// created or removed while the guard is held.
#[derive(Debug, Default)]
pub struct LedgerGuard {
    lock: Mutex<()>,
}

impl LedgerGuard {
    pub fn new() -> LedgerGuard {
        LedgerGuard::default()
    }

    pub async fn lock(&self, holder: &str) -> MutexGuard<'_, ()> {
        tracing::trace!("{holder} waiting for ledger guard");
        let guard = self.lock.lock().await;
        tracing::trace!("{holder} holds ledger guard");
        guard
    }
}
