//! Waitlist entry and its lifecycle state machine.
//!
//! Entries are ordered by `(priority, joined_at)`: lower priority number
//! first, join order breaking ties. Promotion flips `pending` entries to
//! `notified` and holds a real ledger reservation on their behalf, so
//! acceptance needs no second capacity check.

use crate::error::{BookingError, Result};
use crate::types::{BookingId, EventId, UserId, WaitlistEntryId, WaitlistStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default priority for entries joined without an admin-assigned rank.
pub const DEFAULT_PRIORITY: i32 = 100;

/// A queued request for capacity on a sold-out event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitlistEntry {
    /// Unique identifier.
    pub id: WaitlistEntryId,
    /// Waiting user.
    pub user_id: UserId,
    /// Event being waited on.
    pub event_id: EventId,
    /// Units the entry wants; promoted all-or-nothing.
    pub quantity: u32,
    /// Queue rank; lower is served first, ties broken by join order.
    pub priority: i32,
    /// Lifecycle status.
    pub status: WaitlistStatus,
    /// Instant the user joined the queue.
    pub joined_at: DateTime<Utc>,
    /// Set when the entry is promoted to `notified`.
    pub notified_at: Option<DateTime<Utc>>,
    /// Notification window deadline; set only while `notified`.
    pub expires_at: Option<DateTime<Utc>>,
    /// Set when the entry converts into a booking.
    pub booked_at: Option<DateTime<Utc>>,
    /// Set when the entry is cancelled.
    pub cancelled_at: Option<DateTime<Utc>>,
    /// Booking created from this entry, if accepted.
    pub booking_id: Option<BookingId>,
    /// Instant of the last mutation.
    pub updated_at: DateTime<Utc>,
    /// Incremented on every mutation; compare-and-swap key.
    pub version: i64,
}

impl WaitlistEntry {
    /// Creates a `pending` entry at the given queue rank.
    #[must_use]
    pub fn join(
        user_id: UserId,
        event_id: EventId,
        quantity: u32,
        priority: i32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: WaitlistEntryId::new(),
            user_id,
            event_id,
            quantity,
            priority,
            status: WaitlistStatus::Pending,
            joined_at: now,
            notified_at: None,
            expires_at: None,
            booked_at: None,
            cancelled_at: None,
            booking_id: None,
            updated_at: now,
            version: 1,
        }
    }

    /// Whether this entry is `notified` and past its notification window.
    #[must_use]
    pub fn is_notification_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == WaitlistStatus::Notified
            && self.expires_at.is_some_and(|deadline| now > deadline)
    }

    /// Promotes a `pending` entry: capacity is now held for it and the
    /// user has until `expires_at` to accept.
    ///
    /// # Errors
    ///
    /// [`BookingError::InvalidTransition`] if the entry is not `pending`.
    pub fn notify(&self, expires_at: DateTime<Utc>, now: DateTime<Utc>) -> Result<Self> {
        if self.status != WaitlistStatus::Pending {
            return Err(self.invalid("notify"));
        }
        Ok(Self {
            status: WaitlistStatus::Notified,
            notified_at: Some(now),
            expires_at: Some(expires_at),
            updated_at: now,
            version: self.version + 1,
            ..self.clone()
        })
    }

    /// Converts a `notified`, unexpired entry into a booking.
    ///
    /// # Errors
    ///
    /// [`BookingError::InvalidTransition`] if the entry is not `notified`
    /// or its notification window has closed.
    pub fn book(&self, booking_id: BookingId, now: DateTime<Utc>) -> Result<Self> {
        if self.status != WaitlistStatus::Notified {
            return Err(self.invalid("accept"));
        }
        if self.is_notification_expired(now) {
            return Err(BookingError::InvalidTransition {
                from: "notified (expired)".to_string(),
                action: "accept",
            });
        }
        Ok(Self {
            status: WaitlistStatus::Booked,
            expires_at: None,
            booked_at: Some(now),
            booking_id: Some(booking_id),
            updated_at: now,
            version: self.version + 1,
            ..self.clone()
        })
    }

    /// Expires a `notified` entry whose window closed unanswered.
    ///
    /// # Errors
    ///
    /// [`BookingError::InvalidTransition`] if the entry is not
    /// `notified`; this status check is what makes the sweeper
    /// idempotent.
    pub fn expire(&self, now: DateTime<Utc>) -> Result<Self> {
        if self.status != WaitlistStatus::Notified {
            return Err(self.invalid("expire"));
        }
        Ok(Self {
            status: WaitlistStatus::Expired,
            expires_at: None,
            updated_at: now,
            version: self.version + 1,
            ..self.clone()
        })
    }

    /// Cancels a `pending` or `notified` entry.
    ///
    /// Returns the next snapshot and whether the entry was holding a
    /// reservation (`notified`) that must be credited back.
    ///
    /// # Errors
    ///
    /// [`BookingError::InvalidTransition`] from any other state.
    pub fn cancel(&self, now: DateTime<Utc>) -> Result<(Self, bool)> {
        let held = match self.status {
            WaitlistStatus::Pending => false,
            WaitlistStatus::Notified => true,
            _ => return Err(self.invalid("cancel")),
        };
        let next = Self {
            status: WaitlistStatus::Cancelled,
            expires_at: None,
            cancelled_at: Some(now),
            updated_at: now,
            version: self.version + 1,
            ..self.clone()
        };
        Ok((next, held))
    }

    fn invalid(&self, action: &'static str) -> BookingError {
        BookingError::InvalidTransition {
            from: self.status.as_str().to_string(),
            action,
        }
    }
}

/// Queue ordering: `(priority, joined_at)`, lower priority number first.
#[must_use]
pub fn queue_order(a: &WaitlistEntry, b: &WaitlistEntry) -> std::cmp::Ordering {
    a.priority
        .cmp(&b.priority)
        .then(a.joined_at.cmp(&b.joined_at))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use chrono::Duration;

    #[test]
    fn promotion_and_acceptance() {
        let now = Utc::now();
        let entry = WaitlistEntry::join(UserId::new(), EventId::new(), 2, DEFAULT_PRIORITY, now);
        let notified = entry.notify(now + Duration::minutes(30), now).unwrap();
        assert_eq!(notified.status, WaitlistStatus::Notified);

        let booking_id = BookingId::new();
        let booked = notified.book(booking_id, now + Duration::minutes(5)).unwrap();
        assert_eq!(booked.status, WaitlistStatus::Booked);
        assert_eq!(booked.booking_id, Some(booking_id));
    }

    #[test]
    fn acceptance_after_window_is_rejected() {
        let now = Utc::now();
        let entry = WaitlistEntry::join(UserId::new(), EventId::new(), 1, DEFAULT_PRIORITY, now);
        let notified = entry.notify(now + Duration::minutes(30), now).unwrap();
        let late = now + Duration::minutes(31);
        assert!(notified.is_notification_expired(late));
        assert!(notified.book(BookingId::new(), late).is_err());
        assert!(notified.expire(late).is_ok());
    }

    #[test]
    fn cancel_reports_held_reservation() {
        let now = Utc::now();
        let entry = WaitlistEntry::join(UserId::new(), EventId::new(), 1, DEFAULT_PRIORITY, now);
        let (_, held) = entry.cancel(now).unwrap();
        assert!(!held);

        let notified = entry.notify(now + Duration::minutes(30), now).unwrap();
        let (_, held) = notified.cancel(now).unwrap();
        assert!(held);
    }

    #[test]
    fn queue_order_is_priority_then_join_time() {
        let t0 = Utc::now();
        let t1 = t0 + Duration::seconds(1);
        let event_id = EventId::new();
        let early = WaitlistEntry::join(UserId::new(), event_id, 1, 1, t0);
        let late_same_priority = WaitlistEntry::join(UserId::new(), event_id, 1, 1, t1);
        let high_priority = WaitlistEntry::join(UserId::new(), event_id, 1, 0, t1);

        let mut entries = vec![late_same_priority.clone(), early.clone(), high_priority.clone()];
        entries.sort_by(queue_order);
        assert_eq!(entries[0].id, high_priority.id);
        assert_eq!(entries[1].id, early.id);
        assert_eq!(entries[2].id, late_same_priority.id);
    }

    #[test]
    fn expire_is_rejected_for_non_notified() {
        let now = Utc::now();
        let entry = WaitlistEntry::join(UserId::new(), EventId::new(), 1, DEFAULT_PRIORITY, now);
        assert!(entry.expire(now).is_err());
    }
}
