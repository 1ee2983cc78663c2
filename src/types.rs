//! Domain types for the seat reservation engine.
//!
//! Identifiers are opaque strings supplied by the surrounding system (the
//! event catalog and the identity provider); `generate` constructors are
//! provided for the cases where this crate mints an id itself.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

/// Unique identifier for an event.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(String);

impl EventId {
    /// Wraps an externally supplied event identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Mints a fresh random `EventId`.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Borrows the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a user (the booking actor).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(String);

impl UserId {
    /// Wraps an externally supplied user identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrows the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a registration.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegistrationId(String);

impl RegistrationId {
    /// Wraps an externally supplied registration identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Mints a fresh random `RegistrationId`.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Borrows the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RegistrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Entities
// ============================================================================

/// A fixed-capacity event.
///
/// `registered` only ever increases in this crate (there is no cancellation
/// path here) and is mutated exclusively through the atomic claim operation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Event identifier.
    pub id: EventId,
    /// Human-readable title.
    pub title: String,
    /// Total seats, fixed at creation.
    pub capacity: i32,
    /// Seats claimed so far; `0 <= registered <= capacity`.
    pub registered: i32,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl Event {
    /// Creates a new event with no seats claimed.
    #[must_use]
    pub fn new(id: EventId, title: impl Into<String>, capacity: i32) -> Self {
        Self {
            id,
            title: title.into(),
            capacity,
            registered: 0,
            created_at: Utc::now(),
        }
    }

    /// Seats still available.
    #[must_use]
    pub const fn available_seats(&self) -> i32 {
        self.capacity - self.registered
    }
}

/// Lifecycle state of a registration.
///
/// Only [`RegistrationStatus::Active`] is produced by this crate; the
/// cancelled state exists so the storage schema and collaborators that
/// implement cancellation share one vocabulary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistrationStatus {
    /// The registration currently holds one unit of the event's capacity.
    Active,
    /// The registration has been cancelled and holds no capacity.
    Cancelled,
}

impl RegistrationStatus {
    /// The storage-layer representation of the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parses the storage-layer representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

impl fmt::Display for RegistrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A registration binding one user to one unit of one event's capacity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    /// Registration identifier.
    pub id: RegistrationId,
    /// The booking actor.
    pub user_id: UserId,
    /// The reserved event.
    pub event_id: EventId,
    /// Lifecycle state; always [`RegistrationStatus::Active`] when created here.
    pub status: RegistrationStatus,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl Registration {
    /// Creates a fresh active registration with a generated id.
    #[must_use]
    pub fn new(user_id: UserId, event_id: EventId) -> Self {
        Self {
            id: RegistrationId::generate(),
            user_id,
            event_id,
            status: RegistrationStatus::Active,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn available_seats_counts_down() {
        let mut event = Event::new(EventId::generate(), "Launch party", 3);
        assert_eq!(event.available_seats(), 3);
        event.registered = 2;
        assert_eq!(event.available_seats(), 1);
    }

    #[test]
    fn status_round_trips_through_storage_form() {
        assert_eq!(
            RegistrationStatus::parse(RegistrationStatus::Active.as_str()),
            Some(RegistrationStatus::Active)
        );
        assert_eq!(
            RegistrationStatus::parse(RegistrationStatus::Cancelled.as_str()),
            Some(RegistrationStatus::Cancelled)
        );
        assert_eq!(RegistrationStatus::parse("pending"), None);
    }

    #[test]
    fn new_registration_is_active() {
        let reg = Registration::new(UserId::new("u-1"), EventId::new("e-1"));
        assert_eq!(reg.status, RegistrationStatus::Active);
        assert_eq!(reg.user_id.as_str(), "u-1");
    }
}
