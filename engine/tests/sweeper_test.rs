//! Sweeper tests: deadline reclamation, idempotence, and read-time
//! expiry taking precedence over the background pass.

#![allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect

mod common;

use common::{harness, published_event};
use evently_core::audit::{AuditEntity, AuditStore};
use evently_core::error::BookingError;
use evently_core::types::{BookingStatus, UserId, WaitlistStatus};
use evently_engine::Sweeper;
use std::sync::Arc;

#[tokio::test]
async fn overdue_pending_booking_is_expired_and_capacity_restored() {
    let h = harness();
    let event_id = published_event(&h, 1);

    let booking = h
        .engine
        .create_booking(UserId::new(), event_id, 1)
        .await
        .unwrap();
    assert_eq!(h.ledger(event_id).await.available_capacity, 0);

    // Reservation held 15 minutes; sweep one minute past the deadline.
    h.clock.advance(chrono::Duration::minutes(16));
    let sweeper = Sweeper::new(Arc::clone(&h.engine));
    let report = sweeper.sweep_once().await.unwrap();

    assert_eq!(report.expired_bookings, 1);
    assert_eq!(
        h.engine.booking(booking.id).await.unwrap().status,
        BookingStatus::Expired
    );
    let ledger = h.ledger(event_id).await;
    assert_eq!(ledger.available_capacity, 1);
    assert_eq!(ledger.reserved_capacity, 0);
}

#[tokio::test]
async fn sweep_is_idempotent_no_double_credit_no_duplicate_audit() {
    let h = harness();
    let event_id = published_event(&h, 2);

    let booking = h
        .engine
        .create_booking(UserId::new(), event_id, 1)
        .await
        .unwrap();
    h.clock.advance(chrono::Duration::minutes(16));

    let sweeper = Sweeper::new(Arc::clone(&h.engine));
    let first = sweeper.sweep_once().await.unwrap();
    assert_eq!(first.expired_bookings, 1);

    let ledger_after_first = h.ledger(event_id).await;
    let audits_after_first = h
        .audit
        .for_entity(AuditEntity::Booking, *booking.id.as_uuid())
        .await
        .unwrap()
        .len();

    // Re-running against the already-expired row is a no-op.
    let second = sweeper.sweep_once().await.unwrap();
    assert_eq!(second.expired_bookings, 0);
    assert_eq!(h.ledger(event_id).await, ledger_after_first);
    let audits_after_second = h
        .audit
        .for_entity(AuditEntity::Booking, *booking.id.as_uuid())
        .await
        .unwrap()
        .len();
    assert_eq!(audits_after_second, audits_after_first);
}

#[tokio::test]
async fn reader_sees_expiry_before_the_sweeper_runs() {
    let h = harness();
    let event_id = published_event(&h, 1);

    let booking = h
        .engine
        .create_booking(UserId::new(), event_id, 1)
        .await
        .unwrap();
    h.clock.advance(chrono::Duration::minutes(16));

    // No sweep has happened, but the confirm must already treat the
    // booking as expired, reclaim it, and refuse.
    let error = h
        .engine
        .confirm_booking(booking.id, booking.version)
        .await
        .unwrap_err();
    assert!(matches!(error, BookingError::InvalidTransition { .. }));
    assert_eq!(
        h.engine.booking(booking.id).await.unwrap().status,
        BookingStatus::Expired
    );
    assert_eq!(h.ledger(event_id).await.available_capacity, 1);
}

#[tokio::test]
async fn unanswered_notification_expires_and_unit_moves_down_the_queue() {
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
    assert_eq!(
        h.engine.waitlist_entry(first.id).await.unwrap().status,
        WaitlistStatus::Notified
    );

    // The notified user never responds; the window is 30 minutes.
    h.clock.advance(chrono::Duration::minutes(31));
    let sweeper = Sweeper::new(Arc::clone(&h.engine));
    let report = sweeper.sweep_once().await.unwrap();

    assert_eq!(report.expired_notifications, 1);
    assert_eq!(
        h.engine.waitlist_entry(first.id).await.unwrap().status,
        WaitlistStatus::Expired
    );
    // The held unit was re-offered to the next entry in order.
    assert_eq!(
        h.engine.waitlist_entry(second.id).await.unwrap().status,
        WaitlistStatus::Notified
    );
    let ledger = h.ledger(event_id).await;
    assert_eq!(ledger.available_capacity, 0);
    assert_eq!(ledger.reserved_capacity, 1);
}

#[tokio::test]
async fn accepting_after_the_window_fails_and_expires_in_place() {
    let h = harness();
    let event_id = published_event(&h, 1);

    let booking = h
        .engine
        .create_booking(UserId::new(), event_id, 1)
        .await
        .unwrap();
    let entry = h
        .engine
        .join_waitlist(UserId::new(), event_id, 1, None)
        .await
        .unwrap();
    h.engine
        .cancel_booking(booking.id, booking.version, None, None)
        .await
        .unwrap();

    h.clock.advance(chrono::Duration::minutes(31));
    let error = h.engine.accept_from_waitlist(entry.id).await.unwrap_err();
    assert!(matches!(error, BookingError::InvalidTransition { .. }));
    assert_eq!(
        h.engine.waitlist_entry(entry.id).await.unwrap().status,
        WaitlistStatus::Expired
    );
    assert_eq!(h.ledger(event_id).await.available_capacity, 1);
}

#[tokio::test]
async fn background_loop_sweeps_and_shuts_down() {
    // Surface sweep traces when run with --nocapture.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let h = harness();
    let event_id = published_event(&h, 1);

    h.engine
        .create_booking(UserId::new(), event_id, 1)
        .await
        .unwrap();
    h.clock.advance(chrono::Duration::minutes(16));

    let sweeper =
        Sweeper::new(Arc::clone(&h.engine)).with_interval(std::time::Duration::from_millis(20));
    let (task, shutdown) = sweeper.spawn();

    // Give the loop a couple of ticks to reclaim the booking.
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    assert_eq!(h.ledger(event_id).await.available_capacity, 1);

    shutdown.send(true).unwrap();
    task.await.unwrap();
}
