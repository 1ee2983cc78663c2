//! PostgreSQL-backed stores.
//!
//! The seat claim is the authoritative correctness boundary for multi-process
//! deployments: `SELECT ... FOR UPDATE` serializes concurrent claimers at the
//! storage engine, and the conditional `UPDATE ... WHERE registered <
//! capacity` stays correct even where the row lock is weaker than assumed.
//! Cross-process duplicate bookings are stopped by the
//! `uniq_active_registration` partial unique index (see
//! `migrations/0001_bookings.sql`).

use crate::error::StoreError;
use crate::store::{ClaimOutcome, EventStore, RegistrationStore, Transactor};
use crate::types::{Event, EventId, Registration, RegistrationId, RegistrationStatus, UserId};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};

/// Schema for the bookings tables, applied idempotently.
const SCHEMA_SQL: &str = include_str!("../../migrations/0001_bookings.sql");

type EventRow = (String, String, i32, i32, DateTime<Utc>);
type RegistrationRow = (String, String, String, String, DateTime<Utc>);

fn event_from_row(row: EventRow) -> Event {
    let (id, title, capacity, registered, created_at) = row;
    Event {
        id: EventId::new(id),
        title,
        capacity,
        registered,
        created_at,
    }
}

fn registration_from_row(row: RegistrationRow) -> Result<Registration, StoreError> {
    let (id, user_id, event_id, status, created_at) = row;
    let status = RegistrationStatus::parse(&status)
        .ok_or_else(|| StoreError::Database(format!("unknown registration status: {status}")))?;
    Ok(Registration {
        id: RegistrationId::new(id),
        user_id: UserId::new(user_id),
        event_id: EventId::new(event_id),
        status,
        created_at,
    })
}

/// PostgreSQL store implementing [`Transactor`], [`EventStore`], and
/// [`RegistrationStore`] over one connection pool.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a store over an existing connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Applies the bookings schema (tables plus the partial unique index
    /// that guards against cross-process duplicate registrations).
    ///
    /// # Errors
    ///
    /// Returns an error if any schema statement fails.
    pub async fn apply_schema(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA_SQL)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Database(format!("failed to apply schema: {e}")))?;
        Ok(())
    }

    /// Persists a new event. Provisioning only — full catalog management
    /// lives outside this crate.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UniqueViolation`] if the id already exists, or
    /// [`StoreError::Database`] on storage failure.
    pub async fn create_event(&self, event: &Event) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO events (id, title, capacity, registered, created_at)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(event.id.as_str())
        .bind(&event.title)
        .bind(event.capacity)
        .bind(event.registered)
        .bind(event.created_at)
        .execute(&self.pool)
        .await
        .map_err(StoreError::from)?;
        Ok(())
    }

    /// Fetches an event by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if no such event exists, or
    /// [`StoreError::Database`] on storage failure.
    pub async fn fetch_event(&self, event_id: &EventId) -> Result<Event, StoreError> {
        let row: Option<EventRow> = sqlx::query_as(
            "SELECT id, title, capacity, registered, created_at
             FROM events WHERE id = $1",
        )
        .bind(event_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from)?;

        row.map(event_from_row).ok_or(StoreError::NotFound)
    }
}

impl Transactor for PostgresStore {
    type Tx = Transaction<'static, Postgres>;

    async fn begin(&self) -> Result<Self::Tx, StoreError> {
        self.pool.begin().await.map_err(StoreError::from)
    }

    async fn commit(&self, tx: Self::Tx) -> Result<(), StoreError> {
        tx.commit().await.map_err(StoreError::from)
    }

    async fn rollback(&self, tx: Self::Tx) -> Result<(), StoreError> {
        tx.rollback().await.map_err(StoreError::from)
    }
}

impl EventStore for PostgresStore {
    async fn claim_seat(
        &self,
        tx: &mut Self::Tx,
        event_id: &EventId,
    ) -> Result<ClaimOutcome, StoreError> {
        // Row lock held for the transaction duration: concurrent claimers
        // for the same event serialize here, whatever process they run in.
        let row: Option<EventRow> = sqlx::query_as(
            "SELECT id, title, capacity, registered, created_at
             FROM events WHERE id = $1
             FOR UPDATE",
        )
        .bind(event_id.as_str())
        .fetch_optional(&mut **tx)
        .await
        .map_err(StoreError::from)?;

        let event = row.map(event_from_row).ok_or(StoreError::NotFound)?;

        if event.registered >= event.capacity {
            return Ok(ClaimOutcome::Full(event));
        }

        // The predicate re-checks capacity at write time, so the claim stays
        // correct even if the row lock above was not honored.
        let result = sqlx::query(
            "UPDATE events
             SET registered = registered + 1
             WHERE id = $1 AND registered < capacity",
        )
        .bind(event_id.as_str())
        .execute(&mut **tx)
        .await
        .map_err(StoreError::from)?;

        if result.rows_affected() == 0 {
            // Another transaction won the race between the read and the
            // update. Expected outcome, not an error.
            return Ok(ClaimOutcome::Full(event));
        }

        Ok(ClaimOutcome::Granted(Event {
            registered: event.registered + 1,
            ..event
        }))
    }
}

impl RegistrationStore for PostgresStore {
    async fn find_active(
        &self,
        user_id: &UserId,
        event_id: &EventId,
    ) -> Result<Option<Registration>, StoreError> {
        let row: Option<RegistrationRow> = sqlx::query_as(
            "SELECT id, user_id, event_id, status, created_at
             FROM registrations
             WHERE user_id = $1 AND event_id = $2 AND status = $3",
        )
        .bind(user_id.as_str())
        .bind(event_id.as_str())
        .bind(RegistrationStatus::Active.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from)?;

        row.map(registration_from_row).transpose()
    }

    async fn insert_registration(
        &self,
        tx: &mut Self::Tx,
        registration: &Registration,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO registrations (id, user_id, event_id, status, created_at)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(registration.id.as_str())
        .bind(registration.user_id.as_str())
        .bind(registration.event_id.as_str())
        .bind(registration.status.as_str())
        .bind(registration.created_at)
        .execute(&mut **tx)
        .await
        .map_err(StoreError::from)?;
        Ok(())
    }

    async fn registrations_for_event(
        &self,
        event_id: &EventId,
    ) -> Result<Vec<Registration>, StoreError> {
        let rows: Vec<RegistrationRow> = sqlx::query_as(
            "SELECT id, user_id, event_id, status, created_at
             FROM registrations
             WHERE event_id = $1 AND status = $2
             ORDER BY created_at ASC",
        )
        .bind(event_id.as_str())
        .bind(RegistrationStatus::Active.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::from)?;

        rows.into_iter().map(registration_from_row).collect()
    }

    async fn registrations_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<Registration>, StoreError> {
        let rows: Vec<RegistrationRow> = sqlx::query_as(
            "SELECT id, user_id, event_id, status, created_at
             FROM registrations
             WHERE user_id = $1 AND status = $2
             ORDER BY created_at ASC",
        )
        .bind(user_id.as_str())
        .bind(RegistrationStatus::Active.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::from)?;

        rows.into_iter().map(registration_from_row).collect()
    }
}
