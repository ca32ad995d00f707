//! Shared test harness: an engine wired from the in-memory doubles.

#![allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
#![allow(dead_code)] // Not every test file uses every helper

use evently_core::ledger::EventAvailability;
use evently_core::types::{EventId, Money};
use evently_engine::{BookingEngine, EngineConfig, RetryPolicy};
use evently_testing::{
    FixedClock, MemoryAuditStore, MemoryAvailabilityStore, MemoryBookingStore, MemoryEventLock,
    MemoryWaitlistStore, RecordingPublisher, StaticCatalog,
};
use std::sync::Arc;
use std::time::Duration;

/// An engine plus handles on all of its doubles.
pub struct Harness {
    pub engine: Arc<BookingEngine>,
    pub catalog: StaticCatalog,
    pub clock: FixedClock,
    pub publisher: RecordingPublisher,
    pub availability: MemoryAvailabilityStore,
    pub bookings: MemoryBookingStore,
    pub waitlist: MemoryWaitlistStore,
    pub audit: MemoryAuditStore,
    pub lock: MemoryEventLock,
}

impl Harness {
    /// Current ledger snapshot for an event, with the invariant checked.
    pub async fn ledger(&self, event_id: EventId) -> EventAvailability {
        let snapshot = self
            .engine
            .availability(event_id)
            .await
            .expect("ledger should exist");
        snapshot.verify().expect("ledger invariant must hold");
        snapshot
    }
}

/// Builds an engine over fresh in-memory doubles with test-friendly
/// timeouts (fast lock retries, default business knobs).
pub fn harness() -> Harness {
    let catalog = StaticCatalog::new();
    let clock = FixedClock::from_system();
    let publisher = RecordingPublisher::new();
    let availability = MemoryAvailabilityStore::new();
    let bookings = MemoryBookingStore::new();
    let waitlist = MemoryWaitlistStore::new();
    let audit = MemoryAuditStore::new();
    let lock = MemoryEventLock::new();

    let config = EngineConfig {
        lock_timeout: Duration::from_secs(2),
        lock_lease: Duration::from_secs(5),
        lock_retry: RetryPolicy {
            max_retries: 3,
            initial_delay: Duration::from_millis(5),
            ..RetryPolicy::default()
        },
        ..EngineConfig::default()
    };

    let engine = Arc::new(BookingEngine::new(
        Arc::new(availability.clone()),
        Arc::new(bookings.clone()),
        Arc::new(waitlist.clone()),
        Arc::new(audit.clone()),
        Arc::new(lock.clone()),
        Arc::new(catalog.clone()),
        Arc::new(publisher.clone()),
        Arc::new(clock.clone()),
        config,
    ));

    Harness {
        engine,
        catalog,
        clock,
        publisher,
        availability,
        bookings,
        waitlist,
        audit,
        lock,
    }
}

/// A published event with the given capacity at $50.00 per unit.
pub fn published_event(harness: &Harness, capacity: u32) -> EventId {
    harness.catalog.publish(capacity, Money::from_cents(5000))
}
