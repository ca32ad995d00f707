//! Storage trait seams for the booking engine.
//!
//! One trait per persisted aggregate, in the spirit of a store per
//! concern. Implementations must provide compare-and-swap semantics on
//! `update`: the write succeeds only if the row's current version equals
//! `expected_version`, otherwise [`BookingError::VersionConflict`] is
//! returned with the actual version. The in-memory test doubles implement
//! the exact same contract as the SQL stores so concurrency properties
//! can be exercised without a database.
//!
//! [`BookingError::VersionConflict`]: crate::error::BookingError::VersionConflict

use crate::booking::Booking;
use crate::error::Result;
use crate::ledger::EventAvailability;
use crate::types::{BookingId, EventId, UserId, WaitlistEntryId};
use crate::waitlist::WaitlistEntry;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Aggregate counters across every availability row, for operator
/// dashboards.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AvailabilityStats {
    /// Number of events with a materialized ledger.
    pub total_events: u64,
    /// Events with at least one available unit.
    pub available_events: u64,
    /// Events at zero available units.
    pub sold_out_events: u64,
    /// Sum of total capacity across events.
    pub total_capacity: u64,
    /// Sum of available units across events.
    pub total_available: u64,
    /// Sum of reserved units across events.
    pub total_reserved: u64,
    /// Sum of confirmed units across events.
    pub total_confirmed: u64,
}

/// Storage for availability ledger rows.
#[async_trait]
pub trait AvailabilityStore: Send + Sync {
    /// Reads the ledger row for one event.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend read fails.
    async fn get(&self, event_id: EventId) -> Result<Option<EventAvailability>>;

    /// Inserts a freshly materialized ledger row.
    ///
    /// # Errors
    ///
    /// Returns an error if a row for the event already exists or the
    /// backend write fails.
    async fn insert(&self, availability: &EventAvailability) -> Result<()>;

    /// Replaces the ledger row if its stored version is `expected_version`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::BookingError::VersionConflict`] if the
    /// stored version differs, or an error if the backend write fails.
    async fn update(&self, availability: &EventAvailability, expected_version: i64) -> Result<()>;

    /// Aggregates counters across all ledger rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend read fails.
    async fn stats(&self) -> Result<AvailabilityStats>;
}

/// Storage for booking rows.
#[async_trait]
pub trait BookingStore: Send + Sync {
    /// Inserts a new booking.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::BookingError::DuplicateReference`] if the
    /// booking reference is already taken, or an error if the backend
    /// write fails.
    async fn insert(&self, booking: &Booking) -> Result<()>;

    /// Reads one booking.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend read fails.
    async fn get(&self, id: BookingId) -> Result<Option<Booking>>;

    /// Replaces a booking if its stored version is `expected_version`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::BookingError::VersionConflict`] if the
    /// stored version differs, or an error if the backend write fails.
    async fn update(&self, booking: &Booking, expected_version: i64) -> Result<()>;

    /// Returns one page of a user's bookings, newest first, along with
    /// the total count.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend read fails.
    async fn for_user(
        &self,
        user_id: UserId,
        page: u32,
        page_size: u32,
    ) -> Result<(Vec<Booking>, u64)>;

    /// Returns every `pending` booking whose deadline is before `now`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend read fails.
    async fn expired_pending(&self, now: DateTime<Utc>) -> Result<Vec<Booking>>;

    /// Returns every `confirmed` booking for an event.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend read fails.
    async fn confirmed_for_event(&self, event_id: EventId) -> Result<Vec<Booking>>;
}

/// Storage for waitlist entries.
#[async_trait]
pub trait WaitlistStore: Send + Sync {
    /// Inserts a new entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend write fails.
    async fn insert(&self, entry: &WaitlistEntry) -> Result<()>;

    /// Reads one entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend read fails.
    async fn get(&self, id: WaitlistEntryId) -> Result<Option<WaitlistEntry>>;

    /// Replaces an entry if its stored version is `expected_version`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::BookingError::VersionConflict`] if the
    /// stored version differs, or an error if the backend write fails.
    async fn update(&self, entry: &WaitlistEntry, expected_version: i64) -> Result<()>;

    /// Returns the user's active (pending or notified) entry for an
    /// event, if any. At most one exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend read fails.
    async fn active_for_user(
        &self,
        user_id: UserId,
        event_id: EventId,
    ) -> Result<Option<WaitlistEntry>>;

    /// Returns an event's `pending` entries in `(priority, joined_at)`
    /// order.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend read fails.
    async fn pending_for_event(&self, event_id: EventId) -> Result<Vec<WaitlistEntry>>;

    /// Returns an event's active (pending or notified) entries in
    /// `(priority, joined_at)` order.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend read fails.
    async fn active_for_event(&self, event_id: EventId) -> Result<Vec<WaitlistEntry>>;

    /// Returns every `notified` entry whose window closed before `now`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend read fails.
    async fn expired_notifications(&self, now: DateTime<Utc>) -> Result<Vec<WaitlistEntry>>;
}
