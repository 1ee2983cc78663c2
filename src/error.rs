//! Error types for booking and storage operations.

use thiserror::Error;

/// Result type alias for booking operations.
pub type Result<T> = std::result::Result<T, BookingError>;

/// Errors surfaced by the storage layer.
///
/// These stay inside the crate boundary; the coordinator classifies them
/// into the public [`BookingError`] taxonomy.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The referenced row does not exist.
    #[error("row not found")]
    NotFound,

    /// A uniqueness constraint was violated.
    ///
    /// For registrations this is the partial unique index over
    /// `(user_id, event_id)` where the status is active — the signal that a
    /// concurrent transaction already booked the same seat for the same user.
    #[error("unique constraint violated")]
    UniqueViolation,

    /// Any other storage failure (connectivity, serialization, constraint).
    #[error("database error: {0}")]
    Database(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => Self::NotFound,
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                Self::UniqueViolation
            }
            _ => Self::Database(err.to_string()),
        }
    }
}

/// Error taxonomy for the public booking operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BookingError {
    /// Capacity exhausted at claim time. Recoverable by the caller; no
    /// retry is implied.
    #[error("event is fully booked")]
    EventFull,

    /// The user already holds an active registration for this event.
    #[error("user has already registered for this event")]
    DuplicateBooking,

    /// A resource or actor reference supplied by a collaborator does not
    /// resolve. Passed through from upstream components; this crate's own
    /// operations report a missing event row as [`BookingError::Internal`]
    /// because existence is validated before `reserve` is called.
    #[error("resource not found")]
    NotFound,

    /// Storage failure, unclassified constraint violation, or transaction
    /// abort. Callers should not retry without backoff.
    #[error("internal error: {0}")]
    Internal(String),
}

impl BookingError {
    /// Returns `true` if this error is an expected caller-facing outcome
    /// rather than a system fault.
    #[must_use]
    pub const fn is_user_error(&self) -> bool {
        matches!(self, Self::EventFull | Self::DuplicateBooking)
    }
}

impl From<StoreError> for BookingError {
    fn from(err: StoreError) -> Self {
        match err {
            // A concurrent transaction inserted the same active registration
            // first; classified as a duplicate, not a fault.
            StoreError::UniqueViolation => Self::DuplicateBooking,
            // Event existence is validated upstream, so a missing row inside
            // the claim is a system inconsistency.
            StoreError::NotFound => {
                Self::Internal("referenced row missing during transaction".to_string())
            }
            StoreError::Database(msg) => Self::Internal(msg),
        }
    }
}
