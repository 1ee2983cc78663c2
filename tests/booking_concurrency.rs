//! Concurrency tests for the booking engine against the in-memory store.
//!
//! These verify the core safety properties: capacity is never exceeded, no
//! actor ever holds two active registrations for one event, the counter
//! always equals the number of active registrations, and failures leave zero
//! partial state — with and without the in-process lock layer (the latter
//! models a second service process sharing the backing store).

#![allow(clippy::expect_used, clippy::unwrap_used)] // Test code can use unwrap/expect

use futures::future::join_all;
use seatlock::{
    BookingError, BookingService, ClaimOutcome, Event, EventId, EventStore, MemoryStore,
    Transactor, UserId,
};
use std::collections::HashSet;
use std::sync::Arc;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("seatlock=debug")
        .with_test_writer()
        .try_init();
}

fn seeded_service(capacity: i32, with_lock: bool) -> (Arc<BookingService<MemoryStore>>, EventId) {
    let store = MemoryStore::new();
    let event = Event::new(EventId::generate(), "stress test event", capacity);
    let event_id = event.id.clone();
    store.create_event(event);
    let service = if with_lock {
        BookingService::new(store)
    } else {
        BookingService::without_event_lock(store)
    };
    (Arc::new(service), event_id)
}

/// Drives `total` distinct users concurrently at one event and returns the
/// (winning user ids, failure errors).
async fn race_distinct_users(
    service: &Arc<BookingService<MemoryStore>>,
    event_id: &EventId,
    total: usize,
) -> (HashSet<String>, Vec<BookingError>) {
    let mut handles = Vec::with_capacity(total);
    for i in 0..total {
        let service = Arc::clone(service);
        let event_id = event_id.clone();
        handles.push(tokio::spawn(async move {
            let user_id = UserId::new(format!("user-{i}"));
            let result = service.reserve(&user_id, &event_id).await;
            (user_id, result)
        }));
    }

    let mut winners = HashSet::new();
    let mut failures = Vec::new();
    for outcome in join_all(handles).await {
        let (user_id, result) = outcome.expect("booking task panicked");
        match result {
            Ok(registration) => {
                assert_eq!(registration.user_id, user_id);
                winners.insert(user_id.as_str().to_string());
            }
            Err(err) => failures.push(err),
        }
    }
    (winners, failures)
}

/// Asserts the central invariant: the event counter equals the number of
/// active registrations, and both match `expected`.
async fn assert_counter_matches_rows(
    service: &BookingService<MemoryStore>,
    event_id: &EventId,
    expected: i32,
) {
    let event = service.store().fetch_event(event_id).unwrap();
    assert_eq!(event.registered, expected, "counter drifted");
    let rows = service.registrations_for_event(event_id).await.unwrap();
    assert_eq!(rows.len(), usize::try_from(expected).unwrap(), "row count drifted");
}

/// Seed scenario: 50 distinct users race for 5 seats. Exactly 5 succeed with
/// distinct registrations, 45 fail with `EventFull`, and the stored rows
/// match the winners exactly.
#[tokio::test]
async fn fifty_users_race_for_five_seats() {
    init_tracing();
    let (service, event_id) = seeded_service(5, true);

    let (winners, failures) = race_distinct_users(&service, &event_id, 50).await;

    assert_eq!(winners.len(), 5, "expected exactly 5 successful bookings");
    assert_eq!(failures.len(), 45, "expected exactly 45 rejections");
    assert!(
        failures.iter().all(|err| *err == BookingError::EventFull),
        "all rejections must be EventFull, got {failures:?}"
    );

    assert_counter_matches_rows(&service, &event_id, 5).await;

    let row_users: HashSet<String> = service
        .registrations_for_event(&event_id)
        .await
        .unwrap()
        .into_iter()
        .map(|reg| reg.user_id.as_str().to_string())
        .collect();
    assert_eq!(row_users, winners, "stored rows must match the winners");
}

/// The invariants must hold with the in-process lock disabled: the storage
/// row lock and conditional update carry correctness alone, as they would
/// for a fleet of processes sharing one database.
#[tokio::test]
async fn fifty_users_race_for_five_seats_without_process_lock() {
    init_tracing();
    let (service, event_id) = seeded_service(5, false);

    let (winners, failures) = race_distinct_users(&service, &event_id, 50).await;

    assert_eq!(winners.len(), 5);
    assert_eq!(failures.len(), 45);
    assert!(failures.iter().all(|err| *err == BookingError::EventFull));
    assert_counter_matches_rows(&service, &event_id, 5).await;
}

/// Second seed scenario: the same user books twice sequentially against a
/// capacity-10 event. First succeeds, second is a deterministic
/// `DuplicateBooking`, and the counter stays at 1.
#[tokio::test]
async fn second_sequential_booking_is_rejected_as_duplicate() {
    init_tracing();
    let (service, event_id) = seeded_service(10, true);
    let user = UserId::new("user-1");

    service.reserve(&user, &event_id).await.unwrap();
    let err = service.reserve(&user, &event_id).await.unwrap_err();
    assert_eq!(err, BookingError::DuplicateBooking);

    assert_counter_matches_rows(&service, &event_id, 1).await;
}

/// One user hammering the same event concurrently gets exactly one seat.
#[tokio::test]
async fn concurrent_bookings_by_one_user_yield_one_registration() {
    init_tracing();
    let (service, event_id) = seeded_service(10, true);

    let mut handles = Vec::new();
    for _ in 0..10 {
        let service = Arc::clone(&service);
        let event_id = event_id.clone();
        handles.push(tokio::spawn(async move {
            service.reserve(&UserId::new("user-1"), &event_id).await
        }));
    }

    let results: Vec<_> = join_all(handles)
        .await
        .into_iter()
        .map(|r| r.expect("booking task panicked"))
        .collect();

    let successes = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1, "exactly one attempt may win");
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|err| *err == BookingError::DuplicateBooking));

    assert_counter_matches_rows(&service, &event_id, 1).await;
}

/// Same race with the in-process lock disabled: both attempts pass the
/// optimistic check, and the uniqueness constraint must catch the loser and
/// report it as a duplicate, never as an internal fault.
#[tokio::test]
async fn duplicate_race_without_process_lock_is_caught_by_constraint() {
    init_tracing();
    let (service, event_id) = seeded_service(10, false);

    let mut handles = Vec::new();
    for _ in 0..8 {
        let service = Arc::clone(&service);
        let event_id = event_id.clone();
        handles.push(tokio::spawn(async move {
            service.reserve(&UserId::new("user-1"), &event_id).await
        }));
    }

    let results: Vec<_> = join_all(handles)
        .await
        .into_iter()
        .map(|r| r.expect("booking task panicked"))
        .collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    for err in results.iter().filter_map(|r| r.as_ref().err()) {
        assert_eq!(*err, BookingError::DuplicateBooking);
    }

    assert_counter_matches_rows(&service, &event_id, 1).await;
}

/// A capacity-0 event rejects every booking with `EventFull`.
#[tokio::test]
async fn zero_capacity_event_rejects_everyone() {
    init_tracing();
    let (service, event_id) = seeded_service(0, true);

    for i in 0..3 {
        let err = service
            .reserve(&UserId::new(format!("user-{i}")), &event_id)
            .await
            .unwrap_err();
        assert_eq!(err, BookingError::EventFull);
    }

    assert_counter_matches_rows(&service, &event_id, 0).await;
}

/// Atomicity on failure: if the registration insert fails after the counter
/// claim succeeded, the increment must not survive the rollback.
#[tokio::test]
async fn failed_insert_rolls_back_the_claim() {
    init_tracing();
    let (service, event_id) = seeded_service(5, true);

    service.store().fail_next_insert();
    let err = service
        .reserve(&UserId::new("user-1"), &event_id)
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::Internal(_)), "got {err:?}");

    assert_counter_matches_rows(&service, &event_id, 0).await;

    // The engine is healthy afterwards: the same user can book normally.
    service
        .reserve(&UserId::new("user-1"), &event_id)
        .await
        .unwrap();
    assert_counter_matches_rows(&service, &event_id, 1).await;
}

/// Reserving a nonexistent event surfaces as an internal fault (existence is
/// validated upstream by the catalog), with no state created.
#[tokio::test]
async fn missing_event_is_an_internal_error() {
    init_tracing();
    let service = BookingService::new(MemoryStore::new());
    let err = service
        .reserve(&UserId::new("user-1"), &EventId::new("ghost"))
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::Internal(_)));
}

/// Listing by user spans events and only returns that user's rows.
#[tokio::test]
async fn user_listing_spans_events() {
    init_tracing();
    let store = MemoryStore::new();
    let first = Event::new(EventId::generate(), "first", 5);
    let second = Event::new(EventId::generate(), "second", 5);
    let (first_id, second_id) = (first.id.clone(), second.id.clone());
    store.create_event(first);
    store.create_event(second);

    let service = BookingService::new(store);
    let user = UserId::new("user-1");
    let other = UserId::new("user-2");

    service.reserve(&user, &first_id).await.unwrap();
    service.reserve(&user, &second_id).await.unwrap();
    service.reserve(&other, &first_id).await.unwrap();

    let mine = service.registrations_for_user(&user).await.unwrap();
    assert_eq!(mine.len(), 2);
    assert!(mine.iter().all(|reg| reg.user_id == user));

    let first_rows = service.registrations_for_event(&first_id).await.unwrap();
    assert_eq!(first_rows.len(), 2);
}

/// Bare store-level race: concurrent transactions claiming directly, with no
/// coordinator and no in-process lock, never over-admit. The conditional
/// update is the property that cannot be bypassed.
#[tokio::test]
async fn raw_claims_never_exceed_capacity() {
    init_tracing();
    let store = MemoryStore::new();
    let event = Event::new(EventId::generate(), "raw claims", 3);
    let event_id = event.id.clone();
    store.create_event(event);

    let mut handles = Vec::new();
    for _ in 0..20 {
        let store = store.clone();
        let event_id = event_id.clone();
        handles.push(tokio::spawn(async move {
            let mut tx = store.begin().await?;
            let outcome = store.claim_seat(&mut tx, &event_id).await?;
            match outcome {
                ClaimOutcome::Granted(_) => {
                    store.commit(tx).await?;
                    Ok::<bool, seatlock::StoreError>(true)
                }
                ClaimOutcome::Full(_) => {
                    store.rollback(tx).await?;
                    Ok(false)
                }
            }
        }));
    }

    let granted = join_all(handles)
        .await
        .into_iter()
        .map(|r| r.expect("claim task panicked").expect("claim errored"))
        .filter(|granted| *granted)
        .count();

    assert_eq!(granted, 3, "exactly capacity claims may be granted");
    assert_eq!(store.fetch_event(&event_id).unwrap().registered, 3);
}
