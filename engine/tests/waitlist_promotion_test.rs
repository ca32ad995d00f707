//! Waitlist ordering, promotion, and acceptance tests.

#![allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect

mod common;

use common::{harness, published_event};
use evently_core::error::BookingError;
use evently_core::types::{BookingStatus, UserId, WaitlistStatus};

#[tokio::test]
async fn cancellation_promotes_highest_priority_entry_only() {
    let h = harness();
    let event_id = published_event(&h, 1);

    let booking = h
        .engine
        .create_booking(UserId::new(), event_id, 1)
        .await
        .unwrap();

    let user_a = UserId::new();
    let user_b = UserId::new();
    let entry_a = h
        .engine
        .join_waitlist(user_a, event_id, 1, Some(1))
        .await
        .unwrap();
    let entry_b = h
        .engine
        .join_waitlist(user_b, event_id, 1, Some(2))
        .await
        .unwrap();

    // One unit frees up: A (priority 1) is promoted, B stays pending.
    h.engine
        .cancel_booking(booking.id, booking.version, None, None)
        .await
        .unwrap();

    let a = h.engine.waitlist_entry(entry_a.id).await.unwrap();
    let b = h.engine.waitlist_entry(entry_b.id).await.unwrap();
    assert_eq!(a.status, WaitlistStatus::Notified);
    assert!(a.expires_at.is_some());
    assert_eq!(b.status, WaitlistStatus::Pending);

    // The promotion holds the unit: nothing is available to outsiders.
    let ledger = h.ledger(event_id).await;
    assert_eq!(ledger.available_capacity, 0);
    assert_eq!(ledger.reserved_capacity, 1);
}

#[tokio::test]
async fn equal_priority_entries_promote_in_join_order() {
    let h = harness();
    let event_id = published_event(&h, 2);

    let booking = h
        .engine
        .create_booking(UserId::new(), event_id, 2)
        .await
        .unwrap();

    let mut entry_ids = Vec::new();
    for _ in 0..3 {
        h.clock.advance(chrono::Duration::seconds(1));
        let entry = h
            .engine
            .join_waitlist(UserId::new(), event_id, 1, None)
            .await
            .unwrap();
        entry_ids.push(entry.id);
    }

    // Two units free: the two earliest joiners are promoted, in order.
    h.engine
        .cancel_booking(booking.id, booking.version, None, None)
        .await
        .unwrap();

    let statuses = [
        h.engine.waitlist_entry(entry_ids[0]).await.unwrap().status,
        h.engine.waitlist_entry(entry_ids[1]).await.unwrap().status,
        h.engine.waitlist_entry(entry_ids[2]).await.unwrap().status,
    ];
    assert_eq!(
        statuses,
        [
            WaitlistStatus::Notified,
            WaitlistStatus::Notified,
            WaitlistStatus::Pending
        ]
    );
}

#[tokio::test]
async fn oversized_entry_is_skipped_smaller_later_entry_is_served() {
    let h = harness();
    let event_id = published_event(&h, 1);

    let booking = h
        .engine
        .create_booking(UserId::new(), event_id, 1)
        .await
        .unwrap();

    // First in line wants more than will free up; strict order with skip
    // lets the smaller entry behind it take the unit.
    let big = h
        .engine
        .join_waitlist(UserId::new(), event_id, 3, Some(1))
        .await
        .unwrap();
    let small = h
        .engine
        .join_waitlist(UserId::new(), event_id, 1, Some(2))
        .await
        .unwrap();

    h.engine
        .cancel_booking(booking.id, booking.version, None, None)
        .await
        .unwrap();

    assert_eq!(
        h.engine.waitlist_entry(big.id).await.unwrap().status,
        WaitlistStatus::Pending
    );
    assert_eq!(
        h.engine.waitlist_entry(small.id).await.unwrap().status,
        WaitlistStatus::Notified
    );
}

#[tokio::test]
async fn acceptance_consumes_no_additional_capacity() {
    let h = harness();
    let event_id = published_event(&h, 1);

    let booking = h
        .engine
        .create_booking(UserId::new(), event_id, 1)
        .await
        .unwrap();
    let user = UserId::new();
    let entry = h
        .engine
        .join_waitlist(user, event_id, 1, None)
        .await
        .unwrap();
    h.engine
        .cancel_booking(booking.id, booking.version, None, None)
        .await
        .unwrap();

    let before = h.ledger(event_id).await;
    let (new_booking, booked) = h.engine.accept_from_waitlist(entry.id).await.unwrap();
    let after = h.ledger(event_id).await;

    // The held reservation changed hands; counters did not move.
    assert_eq!(before.available_capacity, after.available_capacity);
    assert_eq!(before.reserved_capacity, after.reserved_capacity);
    assert_eq!(before.version, after.version);

    assert_eq!(new_booking.status, BookingStatus::Pending);
    assert_eq!(new_booking.user_id, user);
    assert_eq!(booked.status, WaitlistStatus::Booked);
    assert_eq!(booked.booking_id, Some(new_booking.id));

    // And the accepted booking completes its normal lifecycle.
    let confirmed = h
        .engine
        .confirm_booking(new_booking.id, new_booking.version)
        .await
        .unwrap();
    assert_eq!(confirmed.status, BookingStatus::Confirmed);
}

#[tokio::test]
async fn duplicate_active_join_is_rejected() {
    let h = harness();
    let event_id = published_event(&h, 1);
    let user = UserId::new();

    h.engine
        .create_booking(UserId::new(), event_id, 1)
        .await
        .unwrap();
    h.engine
        .join_waitlist(user, event_id, 1, None)
        .await
        .unwrap();

    let error = h
        .engine
        .join_waitlist(user, event_id, 1, None)
        .await
        .unwrap_err();
    assert!(matches!(error, BookingError::InvalidTransition { .. }));
}

#[tokio::test]
async fn join_is_refused_while_capacity_remains() {
    let h = harness();
    let event_id = published_event(&h, 5);

    let error = h
        .engine
        .join_waitlist(UserId::new(), event_id, 2, None)
        .await
        .unwrap_err();
    assert!(matches!(error, BookingError::InvalidTransition { .. }));
}

#[tokio::test]
async fn cancelling_notified_entry_reoffers_held_units() {
    let h = harness();
    let event_id = published_event(&h, 1);

    let booking = h
        .engine
        .create_booking(UserId::new(), event_id, 1)
        .await
        .unwrap();
    let first = h
        .engine
        .join_waitlist(UserId::new(), event_id, 1, Some(1))
        .await
        .unwrap();
    let second = h
        .engine
        .join_waitlist(UserId::new(), event_id, 1, Some(2))
        .await
        .unwrap();
    h.engine
        .cancel_booking(booking.id, booking.version, None, None)
        .await
        .unwrap();

    let promoted = h.engine.waitlist_entry(first.id).await.unwrap();
    assert_eq!(promoted.status, WaitlistStatus::Notified);

    // The promoted user declines; the unit moves straight to the next in line.
    h.engine
        .cancel_waitlist(promoted.id, promoted.version, None, None)
        .await
        .unwrap();

    let next = h.engine.waitlist_entry(second.id).await.unwrap();
    assert_eq!(next.status, WaitlistStatus::Notified);
    let ledger = h.ledger(event_id).await;
    assert_eq!(ledger.available_capacity, 0);
    assert_eq!(ledger.reserved_capacity, 1);
}

#[tokio::test]
async fn waitlist_position_ranks_by_queue_order() {
    let h = harness();
    let event_id = published_event(&h, 1);

    h.engine
        .create_booking(UserId::new(), event_id, 1)
        .await
        .unwrap();

    let first = h
        .engine
        .join_waitlist(UserId::new(), event_id, 1, Some(5))
        .await
        .unwrap();
    h.clock.advance(chrono::Duration::seconds(1));
    let second = h
        .engine
        .join_waitlist(UserId::new(), event_id, 1, Some(5))
        .await
        .unwrap();
    let vip = h
        .engine
        .join_waitlist(UserId::new(), event_id, 1, Some(1))
        .await
        .unwrap();

    assert_eq!(h.engine.waitlist_position(vip.id).await.unwrap(), 1);
    assert_eq!(h.engine.waitlist_position(first.id).await.unwrap(), 2);
    assert_eq!(h.engine.waitlist_position(second.id).await.unwrap(), 3);
}

#[tokio::test]
async fn growing_capacity_promotes_the_queue() {
    let h = harness();
    let event_id = published_event(&h, 1);

    h.engine
        .create_booking(UserId::new(), event_id, 1)
        .await
        .unwrap();
    let entry = h
        .engine
        .join_waitlist(UserId::new(), event_id, 2, None)
        .await
        .unwrap();

    // Admin adds two seats; the freed units go to the queue.
    let resized = h.engine.update_capacity(event_id, 3).await.unwrap();
    assert_eq!(resized.total_capacity, 3);

    let promoted = h.engine.waitlist_entry(entry.id).await.unwrap();
    assert_eq!(promoted.status, WaitlistStatus::Notified);
    let ledger = h.ledger(event_id).await;
    assert_eq!(ledger.available_capacity, 0);
    assert_eq!(ledger.reserved_capacity, 3);
}
