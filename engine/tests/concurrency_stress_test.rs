//! Concurrency stress tests for last-seat scenarios.
//!
//! These tests verify that under heavy concurrent load the engine never
//! oversells: the count of bookings reaching `pending` or `confirmed`
//! never pushes reserved + confirmed past the capacity ceiling.

#![allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect

mod common;

use common::{harness, published_event};
use evently_core::error::BookingError;
use evently_core::types::UserId;
use futures::future::join_all;
use std::sync::Arc;

/// Capacity 1, two concurrent single-unit requests: exactly one booking
/// reaches `pending`, the other caller is told to join the waitlist.
#[tokio::test]
async fn last_seat_two_contenders() {
    let h = harness();
    let event_id = published_event(&h, 1);

    let first = {
        let engine = Arc::clone(&h.engine);
        tokio::spawn(async move { engine.create_booking(UserId::new(), event_id, 1).await })
    };
    let second = {
        let engine = Arc::clone(&h.engine);
        tokio::spawn(async move { engine.create_booking(UserId::new(), event_id, 1).await })
    };

    let outcomes = [first.await.unwrap(), second.await.unwrap()];
    let successes = outcomes.iter().filter(|r| r.is_ok()).count();
    let capacity_rejections = outcomes
        .iter()
        .filter(|r| matches!(r, Err(BookingError::InsufficientCapacity { .. })))
        .count();

    assert_eq!(successes, 1);
    assert_eq!(capacity_rejections, 1);

    let ledger = h.ledger(event_id).await;
    assert_eq!(ledger.available_capacity, 0);
    assert_eq!(ledger.reserved_capacity, 1);
}

/// 100 concurrent requests for 5 seats: exactly 5 single-unit bookings
/// succeed, 95 fail for capacity, and the ledger invariant holds.
#[tokio::test]
async fn hundred_contenders_for_five_seats() {
    let h = harness();
    let event_id = published_event(&h, 5);

    let attempts = (0..100).map(|_| {
        let engine = Arc::clone(&h.engine);
        tokio::spawn(async move { engine.create_booking(UserId::new(), event_id, 1).await })
    });
    let outcomes: Vec<_> = join_all(attempts)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let successes = outcomes.iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 5);
    assert!(
        outcomes
            .iter()
            .filter(|r| r.is_err())
            .all(|r| matches!(r, Err(BookingError::InsufficientCapacity { .. })))
    );

    let ledger = h.ledger(event_id).await;
    assert_eq!(ledger.reserved_capacity, 5);
    assert_eq!(ledger.available_capacity, 0);
}

/// Mixed quantities summing past the ceiling: whatever subset wins,
/// reserved + confirmed never exceeds the total.
#[tokio::test]
async fn mixed_quantities_never_oversell() {
    let h = harness();
    let event_id = published_event(&h, 10);

    let quantities = [4_u32, 3, 3, 2, 2, 1, 1, 4, 3, 2];
    let attempts = quantities.into_iter().map(|quantity| {
        let engine = Arc::clone(&h.engine);
        tokio::spawn(async move { engine.create_booking(UserId::new(), event_id, quantity).await })
    });
    let outcomes: Vec<_> = join_all(attempts)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let granted: u32 = outcomes
        .iter()
        .filter_map(|r| r.as_ref().ok())
        .map(|b| b.quantity)
        .sum();

    let ledger = h.ledger(event_id).await;
    assert_eq!(ledger.reserved_capacity, granted);
    assert!(ledger.reserved_capacity + ledger.confirmed_capacity <= ledger.total_capacity);
}

/// Concurrent confirms and cancels racing over the same bookings: every
/// outcome is a legal transition and the ledger stays consistent.
#[tokio::test]
async fn racing_confirm_and_cancel_on_same_booking() {
    let h = harness();
    let event_id = published_event(&h, 8);

    let mut bookings = Vec::new();
    for _ in 0..8 {
        bookings.push(
            h.engine
                .create_booking(UserId::new(), event_id, 1)
                .await
                .unwrap(),
        );
    }

    let races = bookings.iter().flat_map(|booking| {
        let confirm = {
            let engine = Arc::clone(&h.engine);
            let (id, version) = (booking.id, booking.version);
            tokio::spawn(async move { engine.confirm_booking(id, version).await.map(|_| "confirm") })
        };
        let cancel = {
            let engine = Arc::clone(&h.engine);
            let (id, version) = (booking.id, booking.version);
            tokio::spawn(async move {
                engine
                    .cancel_booking(id, version, None, None)
                    .await
                    .map(|_| "cancel")
            })
        };
        [confirm, cancel]
    });
    let outcomes: Vec<_> = join_all(races)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    // Per booking exactly one action won; the loser saw a version
    // conflict or an invalid transition, never silent corruption.
    let wins = outcomes.iter().filter(|r| r.is_ok()).count();
    assert_eq!(wins, 8);
    for outcome in outcomes.iter().filter(|r| r.is_err()) {
        assert!(matches!(
            outcome,
            Err(BookingError::VersionConflict { .. } | BookingError::InvalidTransition { .. })
        ));
    }

    let ledger = h.ledger(event_id).await;
    assert_eq!(ledger.reserved_capacity, 0);
    assert_eq!(
        u64::from(ledger.available_capacity) + u64::from(ledger.confirmed_capacity),
        8
    );
}
