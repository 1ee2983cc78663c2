//! Concurrency-safe seat reservation engine.
//!
//! This crate turns "decrement available capacity and record who holds it"
//! into a correct, race-free operation under arbitrary concurrent load,
//! including load arriving from multiple independent service processes
//! sharing one PostgreSQL database. It is a library-level primitive meant to
//! be called by a thin service layer; HTTP, authentication, and catalog CRUD
//! are collaborators, not residents.
//!
//! # Architecture
//!
//! - [`locks::EventLocks`] — per-event in-process mutual exclusion, created
//!   lazily, never evicted. A throughput optimization.
//! - [`booking::BookingService`] — the coordinator: lock, duplicate check,
//!   transaction { atomic claim, registration insert }, commit.
//! - [`store`] — storage traits plus the PostgreSQL implementation whose
//!   `FOR UPDATE` read and conditional `UPDATE ... WHERE registered <
//!   capacity` are the authoritative overbooking guard, and an in-memory
//!   double for hermetic tests.
//!
//! # Example
//!
//! ```no_run
//! use seatlock::{BookingService, PostgresStore, EventId, UserId};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = sqlx::PgPool::connect("postgres://localhost/bookings").await?;
//! let store = PostgresStore::new(pool);
//! store.apply_schema().await?;
//!
//! let bookings = BookingService::new(store);
//! let registration = bookings
//!     .reserve(&UserId::new("user-1"), &EventId::new("event-1"))
//!     .await?;
//! println!("reserved: {}", registration.id);
//! # Ok(())
//! # }
//! ```

pub mod booking;
pub mod error;
pub mod locks;
pub mod store;
pub mod types;

pub use booking::BookingService;
pub use error::{BookingError, Result, StoreError};
pub use locks::EventLocks;
pub use store::memory::MemoryStore;
pub use store::postgres::PostgresStore;
pub use store::{ClaimOutcome, EventStore, RegistrationStore, Transactor};
pub use types::{Event, EventId, Registration, RegistrationId, RegistrationStatus, UserId};
