//! Storage abstraction for the booking engine.
//!
//! The coordinator runs against any backend providing three things: a
//! transaction handle ([`Transactor`]), an atomic seat claim scoped to that
//! transaction ([`EventStore`]), and registration lookup/insert/list
//! operations ([`RegistrationStore`]). Production uses
//! [`postgres::PostgresStore`]; tests use the hermetic
//! [`memory::MemoryStore`].

pub mod memory;
pub mod postgres;

use crate::error::StoreError;
use crate::types::{Event, EventId, Registration, UserId};

/// Outcome of an atomic seat claim.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// One seat was claimed; carries the post-increment event state.
    Granted(Event),
    /// No capacity left. Never an error: this is the expected outcome both
    /// when the pre-check sees a full event and when the conditional update
    /// loses a race it could not observe.
    Full(Event),
}

/// Begins, commits, and rolls back storage transactions.
pub trait Transactor {
    /// Backend transaction handle. All mutations in one `reserve` call share
    /// one value of this type so they commit or roll back together.
    type Tx: Send;

    /// Opens a transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot start a transaction.
    fn begin(&self) -> impl Future<Output = Result<Self::Tx, StoreError>> + Send;

    /// Commits `tx`, making all staged mutations durable atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if the commit fails; no partial state survives.
    fn commit(&self, tx: Self::Tx) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Rolls back `tx`, discarding all staged mutations.
    ///
    /// # Errors
    ///
    /// Returns an error if the rollback itself fails.
    fn rollback(&self, tx: Self::Tx) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// Durable capacity counters per event.
pub trait EventStore: Transactor {
    /// Atomically claims one seat of `event_id` inside `tx`.
    ///
    /// The implementation must read the event row under a storage-level
    /// exclusive lock scoped to `tx`, return [`ClaimOutcome::Full`] without
    /// mutation when `registered >= capacity`, and otherwise increment the
    /// counter with a conditional update that re-checks
    /// `registered < capacity` at write time. A conditional update that
    /// affects zero rows is [`ClaimOutcome::Full`], not an error — it is the
    /// second safety net for backends whose row lock is weaker than assumed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the event row does not exist, or
    /// [`StoreError::Database`] on storage failure.
    fn claim_seat(
        &self,
        tx: &mut Self::Tx,
        event_id: &EventId,
    ) -> impl Future<Output = Result<ClaimOutcome, StoreError>> + Send;
}

/// Durable log of registrations.
pub trait RegistrationStore: Transactor {
    /// Looks up the active registration for `(user_id, event_id)`, if any.
    ///
    /// This backs the coordinator's optimistic duplicate check; the
    /// authoritative duplicate guard is the uniqueness constraint enforced
    /// on insert.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on storage failure.
    fn find_active(
        &self,
        user_id: &UserId,
        event_id: &EventId,
    ) -> impl Future<Output = Result<Option<Registration>, StoreError>> + Send;

    /// Inserts `registration` inside `tx`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UniqueViolation`] when another transaction
    /// already holds the active `(user, event)` slot, or
    /// [`StoreError::Database`] on storage failure.
    fn insert_registration(
        &self,
        tx: &mut Self::Tx,
        registration: &Registration,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// All active registrations for `event_id`, in booking order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on storage failure.
    fn registrations_for_event(
        &self,
        event_id: &EventId,
    ) -> impl Future<Output = Result<Vec<Registration>, StoreError>> + Send;

    /// All active registrations for `user_id`, in booking order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on storage failure.
    fn registrations_for_user(
        &self,
        user_id: &UserId,
    ) -> impl Future<Output = Result<Vec<Registration>, StoreError>> + Send;
}
