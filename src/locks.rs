//! Per-event in-process lock table.
//!
//! Serializes same-process bookings targeting the same event before they
//! touch storage. This layer is a throughput optimization for the common
//! single-process case; correctness never depends on it — the storage-level
//! row lock and conditional update in [`crate::store`] hold on their own.

use crate::types::EventId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Lazily-populated map from event id to a mutual-exclusion lock.
///
/// The first caller for a given event creates the lock; later callers reuse
/// it. Entries are never evicted, so the table grows with the number of
/// distinct events ever booked. That is fine for bounded catalogs; for
/// unbounded ones, reference-counted eviction or sharding into a fixed pool
/// of locks is the extension point.
#[derive(Debug, Default)]
pub struct EventLocks {
    table: Mutex<HashMap<EventId, Arc<AsyncMutex<()>>>>,
}

impl EventLocks {
    /// Creates an empty lock table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the lock for `event_id`, creating it on first use.
    ///
    /// Lookup-or-create happens atomically under the table mutex, so two
    /// first callers for the same event can never end up with distinct
    /// locks. The returned guard releases on drop, on every exit path.
    pub async fn acquire(&self, event_id: &EventId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut table = self
                .table
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            Arc::clone(
                table
                    .entry(event_id.clone())
                    .or_insert_with(|| Arc::new(AsyncMutex::new(()))),
            )
        };
        lock.lock_owned().await
    }

    /// Number of distinct events that have ever been locked.
    #[must_use]
    pub fn len(&self) -> usize {
        self.table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns `true` if no lock has been created yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[tokio::test]
    async fn same_event_reuses_one_lock_entry() {
        let locks = EventLocks::new();
        let id = EventId::new("evt-1");
        drop(locks.acquire(&id).await);
        drop(locks.acquire(&id).await);
        assert_eq!(locks.len(), 1);
    }

    #[tokio::test]
    async fn distinct_events_do_not_contend() {
        let locks = Arc::new(EventLocks::new());
        let a = locks.acquire(&EventId::new("evt-a")).await;
        // Holding evt-a's lock must not block evt-b.
        let b = locks.acquire(&EventId::new("evt-b")).await;
        drop((a, b));
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn lock_is_exclusive_per_event() {
        let locks = Arc::new(EventLocks::new());
        let id = EventId::new("evt-1");
        let held = Arc::new(AtomicBool::new(false));

        let guard = locks.acquire(&id).await;
        held.store(true, Ordering::SeqCst);

        let locks2 = Arc::clone(&locks);
        let held2 = Arc::clone(&held);
        let id2 = id.clone();
        let contender = tokio::spawn(async move {
            let _guard = locks2.acquire(&id2).await;
            // Must only run after the first guard was dropped.
            assert!(!held2.load(Ordering::SeqCst));
        });

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        held.store(false, Ordering::SeqCst);
        drop(guard);
        contender.await.unwrap();
    }
}
