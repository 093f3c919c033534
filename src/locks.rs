//! Per-order serialization (spec.md §5): "all state transitions are
//! serialized by a per-order lock in the Order Engine. The lock is acquired
//! at the beginning of the operation and released at transaction commit or
//! rollback." Cross-order operations hold no global lock.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(Default)]
pub struct OrderLocks {
    locks: Mutex<HashMap<i64, Arc<AsyncMutex<()>>>>,
}

impl OrderLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, id_order: i64) -> Arc<AsyncMutex<()>> {
        self.locks
            .lock()
            .entry(id_order)
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Acquire the lock for one order. Held across the whole
    /// read-decide-write-commit span of an engine operation, not just the
    /// SQL transaction, so two callers racing the same order never
    /// interleave their reads and writes.
    pub async fn acquire(&self, id_order: i64) -> OwnedMutexGuard<()> {
        self.entry(id_order).lock_owned().await
    }
}
