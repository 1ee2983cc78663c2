//! Booking coordinator.
//!
//! Three-layer defence against overbooking:
//!  1. Per-event in-process lock — serializes same-process callers for the
//!     same event ([`EventLocks`]).
//!  2. Storage transaction — the claim and the registration insert commit or
//!     roll back together.
//!  3. Conditional UPDATE guarded by `registered < capacity` — the ultimate
//!     net, correct even across independent service processes
//!     ([`EventStore::claim_seat`]).
//!
//! Layers 1 and the optimistic duplicate check are optimizations; only layer
//! 3 and the storage-level uniqueness constraint are sources of truth.

use crate::error::{BookingError, Result, StoreError};
use crate::locks::EventLocks;
use crate::store::{ClaimOutcome, EventStore, RegistrationStore};
use crate::types::{EventId, Registration, UserId};
use tracing::{info, warn};

/// Coordinates seat reservations against a transactional store.
pub struct BookingService<S> {
    store: S,
    locks: EventLocks,
    use_event_lock: bool,
}

impl<S> BookingService<S>
where
    S: EventStore + RegistrationStore,
{
    /// Creates a coordinator over `store`.
    #[must_use]
    pub fn new(store: S) -> Self {
        Self {
            store,
            locks: EventLocks::new(),
            use_event_lock: true,
        }
    }

    /// Creates a coordinator with the in-process lock layer disabled.
    ///
    /// This models a second service process that shares the backing store
    /// but not this process's lock table. The capacity and no-duplicate
    /// invariants must hold regardless; tests use this constructor to prove
    /// the storage layer carries them alone.
    #[must_use]
    pub fn without_event_lock(store: S) -> Self {
        Self {
            store,
            locks: EventLocks::new(),
            use_event_lock: false,
        }
    }

    /// Access to the underlying store.
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Reserves one seat of `event_id` for `user_id`, exactly once.
    ///
    /// On success exactly one counter increment and one registration row are
    /// committed together; on any failure nothing is persisted.
    ///
    /// # Errors
    ///
    /// - [`BookingError::DuplicateBooking`] if the user already holds an
    ///   active registration for this event, including when the race is only
    ///   caught by the storage-level uniqueness constraint.
    /// - [`BookingError::EventFull`] if capacity is exhausted at claim time.
    /// - [`BookingError::Internal`] for storage failures, or for an event
    ///   row missing mid-flight (existence is validated upstream).
    #[tracing::instrument(skip(self), fields(user = %user_id, event = %event_id))]
    pub async fn reserve(&self, user_id: &UserId, event_id: &EventId) -> Result<Registration> {
        // Layer 1. The guard is dropped on every exit path below.
        let _event_guard = if self.use_event_lock {
            Some(self.locks.acquire(event_id).await)
        } else {
            None
        };

        info!("booking attempt");

        // Optimistic duplicate check. A fast path only: the partial unique
        // index on the registrations table is what actually prevents
        // cross-process duplicates.
        if self.store.find_active(user_id, event_id).await?.is_some() {
            warn!("booking rejected: duplicate registration");
            return Err(BookingError::DuplicateBooking);
        }

        // Layers 2 and 3: transaction plus conditional claim.
        let mut tx = self.store.begin().await?;

        let event = match self.store.claim_seat(&mut tx, event_id).await {
            Ok(ClaimOutcome::Granted(event)) => event,
            Ok(ClaimOutcome::Full(_)) => {
                self.store.rollback(tx).await?;
                warn!("booking rejected: event full");
                return Err(BookingError::EventFull);
            }
            Err(err) => {
                let _ = self.store.rollback(tx).await;
                return Err(err.into());
            }
        };

        let registration = Registration::new(user_id.clone(), event_id.clone());
        if let Err(err) = self.store.insert_registration(&mut tx, &registration).await {
            let _ = self.store.rollback(tx).await;
            if err == StoreError::UniqueViolation {
                // Two processes passed the optimistic check; the constraint
                // caught the race. A duplicate, not a system fault.
                warn!("booking rejected: duplicate caught by unique constraint");
            }
            return Err(err.into());
        }

        self.store.commit(tx).await?;

        info!(
            registration = %registration.id,
            seats_left = event.available_seats(),
            "seat reserved"
        );
        Ok(registration)
    }

    /// All active registrations for `event_id`, in booking order.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::Internal`] on storage failure.
    pub async fn registrations_for_event(&self, event_id: &EventId) -> Result<Vec<Registration>> {
        Ok(self.store.registrations_for_event(event_id).await?)
    }

    /// All active registrations for `user_id`, in booking order.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::Internal`] on storage failure.
    pub async fn registrations_for_user(&self, user_id: &UserId) -> Result<Vec<Registration>> {
        Ok(self.store.registrations_for_user(user_id).await?)
    }
}
