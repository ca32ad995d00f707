//! In-memory store implementations with real compare-and-swap semantics.
//!
//! These doubles enforce the same version discipline as the SQL stores,
//! so optimistic-concurrency properties can be exercised without a
//! database: an `update` whose `expected_version` does not match the
//! stored row fails with `VersionConflict` carrying the actual version.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Lock poisoning aborts the test anyway

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use evently_core::audit::{AuditEntity, AuditRecord, AuditStore};
use evently_core::booking::Booking;
use evently_core::error::{BookingError, Result};
use evently_core::ledger::EventAvailability;
use evently_core::store::{AvailabilityStats, AvailabilityStore, BookingStore, WaitlistStore};
use evently_core::types::{BookingId, BookingStatus, EventId, UserId, WaitlistEntryId};
use evently_core::waitlist::{WaitlistEntry, queue_order};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, RwLock};
use uuid::Uuid;

/// In-memory availability ledger storage.
#[derive(Clone, Default)]
pub struct MemoryAvailabilityStore {
    rows: Arc<RwLock<HashMap<EventId, EventAvailability>>>,
}

impl MemoryAvailabilityStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrites a row without version checks, for corrupting state in
    /// tests.
    pub fn put_raw(&self, availability: EventAvailability) {
        self.rows
            .write()
            .unwrap()
            .insert(availability.event_id, availability);
    }
}

#[async_trait]
impl AvailabilityStore for MemoryAvailabilityStore {
    async fn get(&self, event_id: EventId) -> Result<Option<EventAvailability>> {
        Ok(self.rows.read().unwrap().get(&event_id).cloned())
    }

    async fn insert(&self, availability: &EventAvailability) -> Result<()> {
        let mut rows = self.rows.write().unwrap();
        if rows.contains_key(&availability.event_id) {
            return Err(BookingError::Store(format!(
                "availability already materialized for event {}",
                availability.event_id
            )));
        }
        rows.insert(availability.event_id, availability.clone());
        Ok(())
    }

    async fn update(&self, availability: &EventAvailability, expected_version: i64) -> Result<()> {
        let mut rows = self.rows.write().unwrap();
        let current = rows
            .get(&availability.event_id)
            .ok_or(BookingError::EventNotFound(availability.event_id))?;
        if current.version != expected_version {
            return Err(BookingError::VersionConflict {
                expected: expected_version,
                actual: current.version,
            });
        }
        rows.insert(availability.event_id, availability.clone());
        Ok(())
    }

    async fn stats(&self) -> Result<AvailabilityStats> {
        let rows = self.rows.read().unwrap();
        let mut stats = AvailabilityStats {
            total_events: rows.len() as u64,
            ..AvailabilityStats::default()
        };
        for row in rows.values() {
            if row.available_capacity > 0 {
                stats.available_events += 1;
            } else {
                stats.sold_out_events += 1;
            }
            stats.total_capacity += u64::from(row.total_capacity);
            stats.total_available += u64::from(row.available_capacity);
            stats.total_reserved += u64::from(row.reserved_capacity);
            stats.total_confirmed += u64::from(row.confirmed_capacity);
        }
        Ok(stats)
    }
}

/// In-memory booking storage with reference uniqueness.
#[derive(Clone, Default)]
pub struct MemoryBookingStore {
    rows: Arc<RwLock<HashMap<BookingId, Booking>>>,
    references: Arc<RwLock<HashSet<String>>>,
    forced_collisions: Arc<AtomicU32>,
}

impl MemoryBookingStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` inserts fail as reference collisions, to
    /// exercise the regeneration path deterministically.
    pub fn force_reference_collisions(&self, count: u32) {
        self.forced_collisions.store(count, Ordering::SeqCst);
    }
}

#[async_trait]
impl BookingStore for MemoryBookingStore {
    async fn insert(&self, booking: &Booking) -> Result<()> {
        if self
            .forced_collisions
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(BookingError::DuplicateReference(
                booking.booking_reference.as_str().to_string(),
            ));
        }
        let mut references = self.references.write().unwrap();
        if !references.insert(booking.booking_reference.as_str().to_string()) {
            return Err(BookingError::DuplicateReference(
                booking.booking_reference.as_str().to_string(),
            ));
        }
        self.rows.write().unwrap().insert(booking.id, booking.clone());
        Ok(())
    }

    async fn get(&self, id: BookingId) -> Result<Option<Booking>> {
        Ok(self.rows.read().unwrap().get(&id).cloned())
    }

    async fn update(&self, booking: &Booking, expected_version: i64) -> Result<()> {
        let mut rows = self.rows.write().unwrap();
        let current = rows
            .get(&booking.id)
            .ok_or(BookingError::BookingNotFound(booking.id))?;
        if current.version != expected_version {
            return Err(BookingError::VersionConflict {
                expected: expected_version,
                actual: current.version,
            });
        }
        rows.insert(booking.id, booking.clone());
        Ok(())
    }

    async fn for_user(
        &self,
        user_id: UserId,
        page: u32,
        page_size: u32,
    ) -> Result<(Vec<Booking>, u64)> {
        let rows = self.rows.read().unwrap();
        let mut bookings: Vec<Booking> = rows
            .values()
            .filter(|b| b.user_id == user_id)
            .cloned()
            .collect();
        bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = bookings.len() as u64;
        let offset = (page.saturating_sub(1) as usize) * page_size as usize;
        let bookings = bookings
            .into_iter()
            .skip(offset)
            .take(page_size as usize)
            .collect();
        Ok((bookings, total))
    }

    async fn expired_pending(&self, now: DateTime<Utc>) -> Result<Vec<Booking>> {
        let rows = self.rows.read().unwrap();
        let mut expired: Vec<Booking> = rows
            .values()
            .filter(|b| b.is_expired(now))
            .cloned()
            .collect();
        expired.sort_by_key(|b| b.expires_at);
        Ok(expired)
    }

    async fn confirmed_for_event(&self, event_id: EventId) -> Result<Vec<Booking>> {
        let rows = self.rows.read().unwrap();
        Ok(rows
            .values()
            .filter(|b| b.event_id == event_id && b.status == BookingStatus::Confirmed)
            .cloned()
            .collect())
    }
}

/// In-memory waitlist storage.
#[derive(Clone, Default)]
pub struct MemoryWaitlistStore {
    rows: Arc<RwLock<HashMap<WaitlistEntryId, WaitlistEntry>>>,
}

impl MemoryWaitlistStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WaitlistStore for MemoryWaitlistStore {
    async fn insert(&self, entry: &WaitlistEntry) -> Result<()> {
        self.rows.write().unwrap().insert(entry.id, entry.clone());
        Ok(())
    }

    async fn get(&self, id: WaitlistEntryId) -> Result<Option<WaitlistEntry>> {
        Ok(self.rows.read().unwrap().get(&id).cloned())
    }

    async fn update(&self, entry: &WaitlistEntry, expected_version: i64) -> Result<()> {
        let mut rows = self.rows.write().unwrap();
        let current = rows
            .get(&entry.id)
            .ok_or(BookingError::WaitlistEntryNotFound(entry.id))?;
        if current.version != expected_version {
            return Err(BookingError::VersionConflict {
                expected: expected_version,
                actual: current.version,
            });
        }
        rows.insert(entry.id, entry.clone());
        Ok(())
    }

    async fn active_for_user(
        &self,
        user_id: UserId,
        event_id: EventId,
    ) -> Result<Option<WaitlistEntry>> {
        let rows = self.rows.read().unwrap();
        Ok(rows
            .values()
            .find(|e| e.user_id == user_id && e.event_id == event_id && e.status.is_active())
            .cloned())
    }

    async fn pending_for_event(&self, event_id: EventId) -> Result<Vec<WaitlistEntry>> {
        let rows = self.rows.read().unwrap();
        let mut pending: Vec<WaitlistEntry> = rows
            .values()
            .filter(|e| {
                e.event_id == event_id && e.status == evently_core::types::WaitlistStatus::Pending
            })
            .cloned()
            .collect();
        pending.sort_by(queue_order);
        Ok(pending)
    }

    async fn active_for_event(&self, event_id: EventId) -> Result<Vec<WaitlistEntry>> {
        let rows = self.rows.read().unwrap();
        let mut active: Vec<WaitlistEntry> = rows
            .values()
            .filter(|e| e.event_id == event_id && e.status.is_active())
            .cloned()
            .collect();
        active.sort_by(queue_order);
        Ok(active)
    }

    async fn expired_notifications(&self, now: DateTime<Utc>) -> Result<Vec<WaitlistEntry>> {
        let rows = self.rows.read().unwrap();
        let mut expired: Vec<WaitlistEntry> = rows
            .values()
            .filter(|e| e.is_notification_expired(now))
            .cloned()
            .collect();
        expired.sort_by(queue_order);
        Ok(expired)
    }
}

/// In-memory append-only audit storage.
#[derive(Clone, Default)]
pub struct MemoryAuditStore {
    records: Arc<RwLock<Vec<AuditRecord>>>,
}

impl MemoryAuditStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every record appended so far, in append order.
    #[must_use]
    pub fn all(&self) -> Vec<AuditRecord> {
        self.records.read().unwrap().clone()
    }
}

#[async_trait]
impl AuditStore for MemoryAuditStore {
    async fn append(&self, record: &AuditRecord) -> Result<()> {
        self.records.write().unwrap().push(record.clone());
        Ok(())
    }

    async fn for_entity(&self, entity: AuditEntity, entity_id: Uuid) -> Result<Vec<AuditRecord>> {
        let records = self.records.read().unwrap();
        Ok(records
            .iter()
            .filter(|r| r.entity == entity && r.entity_id == entity_id)
            .cloned()
            .collect())
    }
}
