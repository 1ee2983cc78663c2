//! In-memory transactional store.
//!
//! A hermetic stand-in for [`crate::store::postgres::PostgresStore`] used by
//! the concurrency tests. It models the storage behaviors the engine relies
//! on: a per-event row lock held for the transaction duration (the analogue
//! of `SELECT ... FOR UPDATE`), a capacity predicate re-checked at write
//! time, uniqueness over active `(user, event)` registrations, and rollback
//! that undoes every staged mutation. A fault-injection knob makes the next
//! registration insert fail so the atomicity-on-failure property can be
//! exercised.

use crate::error::StoreError;
use crate::locks::EventLocks;
use crate::store::{ClaimOutcome, EventStore, RegistrationStore, Transactor};
use crate::types::{Event, EventId, Registration, RegistrationId, RegistrationStatus, UserId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::OwnedMutexGuard;

#[derive(Debug, Default)]
struct Tables {
    events: HashMap<EventId, Event>,
    registrations: Vec<Registration>,
}

/// Transaction handle for [`MemoryStore`].
///
/// Holds the claimed event's row lock until commit or rollback, plus enough
/// undo state to make rollback exact.
pub struct MemoryTx {
    row_locks: Vec<OwnedMutexGuard<()>>,
    claimed: Option<EventId>,
    inserted: Vec<RegistrationId>,
}

/// In-memory store implementing [`Transactor`], [`EventStore`], and
/// [`RegistrationStore`].
///
/// Mutations become visible as they are applied and are undone on rollback;
/// the per-event row lock keeps concurrent claimers serialized exactly as
/// the database row lock would.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
    row_locks: Arc<EventLocks>,
    fail_next_insert: Arc<AtomicBool>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Persists a new event.
    pub fn create_event(&self, event: Event) {
        self.tables().events.insert(event.id.clone(), event);
    }

    /// Fetches an event by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if no such event exists.
    pub fn fetch_event(&self, event_id: &EventId) -> Result<Event, StoreError> {
        self.tables()
            .events
            .get(event_id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    /// Makes the next [`RegistrationStore::insert_registration`] call fail
    /// with a storage error. Fault injection for atomicity tests.
    pub fn fail_next_insert(&self) {
        self.fail_next_insert.store(true, Ordering::SeqCst);
    }
}

impl Transactor for MemoryStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> Result<Self::Tx, StoreError> {
        Ok(MemoryTx {
            row_locks: Vec::new(),
            claimed: None,
            inserted: Vec::new(),
        })
    }

    async fn commit(&self, tx: Self::Tx) -> Result<(), StoreError> {
        // Mutations were applied in place; committing just releases the row
        // locks and discards the undo state.
        drop(tx);
        Ok(())
    }

    async fn rollback(&self, tx: Self::Tx) -> Result<(), StoreError> {
        let mut tables = self.tables();
        if let Some(event_id) = &tx.claimed {
            if let Some(event) = tables.events.get_mut(event_id) {
                event.registered -= 1;
            }
        }
        tables
            .registrations
            .retain(|reg| !tx.inserted.contains(&reg.id));
        drop(tables);
        drop(tx);
        Ok(())
    }
}

impl EventStore for MemoryStore {
    async fn claim_seat(
        &self,
        tx: &mut Self::Tx,
        event_id: &EventId,
    ) -> Result<ClaimOutcome, StoreError> {
        // Row lock, held until the transaction ends. Concurrent claimers for
        // the same event block here, like they would on FOR UPDATE.
        let guard = self.row_locks.acquire(event_id).await;
        tx.row_locks.push(guard);

        let mut tables = self.tables();
        let event = tables
            .events
            .get_mut(event_id)
            .ok_or(StoreError::NotFound)?;

        if event.registered >= event.capacity {
            return Ok(ClaimOutcome::Full(event.clone()));
        }

        // Conditional write: the predicate is evaluated against current row
        // state, so the claim cannot over-admit even if the row lock above
        // were bypassed.
        if event.registered < event.capacity {
            event.registered += 1;
            tx.claimed = Some(event_id.clone());
            Ok(ClaimOutcome::Granted(event.clone()))
        } else {
            Ok(ClaimOutcome::Full(event.clone()))
        }
    }
}

impl RegistrationStore for MemoryStore {
    async fn find_active(
        &self,
        user_id: &UserId,
        event_id: &EventId,
    ) -> Result<Option<Registration>, StoreError> {
        Ok(self
            .tables()
            .registrations
            .iter()
            .find(|reg| {
                reg.user_id == *user_id
                    && reg.event_id == *event_id
                    && reg.status == RegistrationStatus::Active
            })
            .cloned())
    }

    async fn insert_registration(
        &self,
        tx: &mut Self::Tx,
        registration: &Registration,
    ) -> Result<(), StoreError> {
        if self.fail_next_insert.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Database(
                "injected insert failure".to_string(),
            ));
        }

        let mut tables = self.tables();

        // The in-memory rendition of the uniq_active_registration index.
        let duplicate = tables.registrations.iter().any(|reg| {
            reg.user_id == registration.user_id
                && reg.event_id == registration.event_id
                && reg.status == RegistrationStatus::Active
        });
        if duplicate {
            return Err(StoreError::UniqueViolation);
        }

        tables.registrations.push(registration.clone());
        tx.inserted.push(registration.id.clone());
        Ok(())
    }

    async fn registrations_for_event(
        &self,
        event_id: &EventId,
    ) -> Result<Vec<Registration>, StoreError> {
        let mut rows: Vec<Registration> = self
            .tables()
            .registrations
            .iter()
            .filter(|reg| {
                reg.event_id == *event_id && reg.status == RegistrationStatus::Active
            })
            .cloned()
            .collect();
        rows.sort_by_key(|reg| reg.created_at);
        Ok(rows)
    }

    async fn registrations_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<Registration>, StoreError> {
        let mut rows: Vec<Registration> = self
            .tables()
            .registrations
            .iter()
            .filter(|reg| {
                reg.user_id == *user_id && reg.status == RegistrationStatus::Active
            })
            .cloned()
            .collect();
        rows.sort_by_key(|reg| reg.created_at);
        Ok(rows)
    }
}
