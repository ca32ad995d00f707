//! Booking entity and its lifecycle state machine.
//!
//! ```text
//! (none) --create, ledger debit ok--> pending
//! pending --confirm--> confirmed
//! pending --expire--> expired          [ledger credit back]
//! pending --cancel--> cancelled        [ledger credit back]
//! confirmed --cancel--> cancelled      [ledger credit back, refund flow]
//! confirmed --complete--> completed
//! cancelled --refund settled--> refunded
//! expired / refunded / completed: terminal
//! ```
//!
//! Transition methods are pure: they validate the current state, return
//! the next snapshot with the version bumped, and leave persistence (a
//! compare-and-swap on the old version) to the caller. A `pending`
//! booking past its deadline is treated as already expired by every
//! reader, even before the sweeper physically transitions it.

use crate::error::{BookingError, Result};
use crate::types::{
    BookingId, BookingReference, BookingStatus, CapacityKind, EventId, Money, PaymentStatus,
    UserId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A request for `quantity` units of one event's capacity.
///
/// Never physically deleted: terminal rows are retained for audit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    /// Unique identifier.
    pub id: BookingId,
    /// Owner of the booking.
    pub user_id: UserId,
    /// Event being booked.
    pub event_id: EventId,
    /// Human-readable globally unique reference.
    pub booking_reference: BookingReference,
    /// Units held by this booking.
    pub quantity: u32,
    /// Price x quantity at creation time.
    pub total_amount: Money,
    /// ISO 4217 currency code.
    pub currency: String,
    /// Lifecycle status.
    pub status: BookingStatus,
    /// Payment status as reported by the payment collaborator.
    pub payment_status: PaymentStatus,
    /// Reservation deadline; set only while `pending`.
    pub expires_at: Option<DateTime<Utc>>,
    /// Set when the booking is confirmed.
    pub confirmed_at: Option<DateTime<Utc>>,
    /// Set when the booking is cancelled.
    pub cancelled_at: Option<DateTime<Utc>>,
    /// Creation instant.
    pub created_at: DateTime<Utc>,
    /// Instant of the last mutation.
    pub updated_at: DateTime<Utc>,
    /// Incremented on every mutation; compare-and-swap key.
    pub version: i64,
}

impl Booking {
    /// Creates a `pending` booking after a successful ledger debit.
    #[must_use]
    pub fn create(
        user_id: UserId,
        event_id: EventId,
        booking_reference: BookingReference,
        quantity: u32,
        total_amount: Money,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: BookingId::new(),
            user_id,
            event_id,
            booking_reference,
            quantity,
            total_amount,
            currency: "USD".to_string(),
            status: BookingStatus::Pending,
            payment_status: PaymentStatus::Pending,
            expires_at: Some(expires_at),
            confirmed_at: None,
            cancelled_at: None,
            created_at: now,
            updated_at: now,
            version: 1,
        }
    }

    /// Whether this booking is `pending` and past its deadline.
    ///
    /// The read-time check takes precedence over the background sweep:
    /// readers must treat such a booking as expired even if the sweeper
    /// has not visited it yet.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == BookingStatus::Pending
            && self.expires_at.is_some_and(|deadline| now > deadline)
    }

    /// Confirms a `pending`, unexpired booking.
    ///
    /// # Errors
    ///
    /// [`BookingError::InvalidTransition`] if the booking is not
    /// `pending` or its reservation deadline has passed.
    pub fn confirm(&self, now: DateTime<Utc>) -> Result<Self> {
        if self.status != BookingStatus::Pending {
            return Err(self.invalid("confirm"));
        }
        if self.is_expired(now) {
            return Err(BookingError::InvalidTransition {
                from: "pending (expired)".to_string(),
                action: "confirm",
            });
        }
        Ok(Self {
            status: BookingStatus::Confirmed,
            payment_status: PaymentStatus::Completed,
            expires_at: None,
            confirmed_at: Some(now),
            updated_at: now,
            version: self.version + 1,
            ..self.clone()
        })
    }

    /// Cancels a `pending` or `confirmed` booking.
    ///
    /// Returns the next snapshot together with the ledger bucket the
    /// freed units must be credited from. Cancelling a confirmed booking
    /// starts the refund flow (payment status `refunded`).
    ///
    /// # Errors
    ///
    /// [`BookingError::InvalidTransition`] from any other state.
    pub fn cancel(&self, now: DateTime<Utc>) -> Result<(Self, CapacityKind)> {
        let (kind, payment_status) = match self.status {
            BookingStatus::Pending => (CapacityKind::Reserved, self.payment_status),
            BookingStatus::Confirmed => (CapacityKind::Confirmed, PaymentStatus::Refunded),
            _ => return Err(self.invalid("cancel")),
        };
        let next = Self {
            status: BookingStatus::Cancelled,
            payment_status,
            expires_at: None,
            cancelled_at: Some(now),
            updated_at: now,
            version: self.version + 1,
            ..self.clone()
        };
        Ok((next, kind))
    }

    /// Expires a `pending` booking whose deadline has passed.
    ///
    /// # Errors
    ///
    /// [`BookingError::InvalidTransition`] if the booking is not
    /// `pending`. Idempotence for the sweeper comes from this check: an
    /// already-expired row fails the transition and is skipped.
    pub fn expire(&self, now: DateTime<Utc>) -> Result<Self> {
        if self.status != BookingStatus::Pending {
            return Err(self.invalid("expire"));
        }
        Ok(Self {
            status: BookingStatus::Expired,
            expires_at: None,
            updated_at: now,
            version: self.version + 1,
            ..self.clone()
        })
    }

    /// Records refund settlement on a cancelled booking.
    ///
    /// # Errors
    ///
    /// [`BookingError::InvalidTransition`] unless the booking is
    /// `cancelled` with its payment already returned.
    pub fn refund(&self, now: DateTime<Utc>) -> Result<Self> {
        if self.status != BookingStatus::Cancelled
            || self.payment_status != PaymentStatus::Refunded
        {
            return Err(self.invalid("record refund"));
        }
        Ok(Self {
            status: BookingStatus::Refunded,
            updated_at: now,
            version: self.version + 1,
            ..self.clone()
        })
    }

    /// Marks a `confirmed` booking completed once the event took place.
    ///
    /// # Errors
    ///
    /// [`BookingError::InvalidTransition`] if the booking is not
    /// `confirmed`.
    pub fn complete(&self, now: DateTime<Utc>) -> Result<Self> {
        if self.status != BookingStatus::Confirmed {
            return Err(self.invalid("complete"));
        }
        Ok(Self {
            status: BookingStatus::Completed,
            updated_at: now,
            version: self.version + 1,
            ..self.clone()
        })
    }

    fn invalid(&self, action: &'static str) -> BookingError {
        BookingError::InvalidTransition {
            from: self.status.as_str().to_string(),
            action,
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use chrono::Duration;

    fn pending(now: DateTime<Utc>) -> Booking {
        Booking::create(
            UserId::new(),
            EventId::new(),
            BookingReference::generate(now),
            2,
            Money::from_cents(5000),
            now + Duration::minutes(15),
            now,
        )
    }

    #[test]
    fn confirm_from_pending() {
        let now = Utc::now();
        let booking = pending(now);
        let confirmed = booking.confirm(now).unwrap();
        assert_eq!(confirmed.status, BookingStatus::Confirmed);
        assert_eq!(confirmed.payment_status, PaymentStatus::Completed);
        assert_eq!(confirmed.expires_at, None);
        assert_eq!(confirmed.version, 2);
    }

    #[test]
    fn confirm_past_deadline_is_rejected() {
        let now = Utc::now();
        let booking = pending(now);
        let late = now + Duration::minutes(16);
        assert!(booking.is_expired(late));
        assert!(matches!(
            booking.confirm(late),
            Err(BookingError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn cancel_reports_source_bucket() {
        let now = Utc::now();
        let booking = pending(now);
        let (_, kind) = booking.cancel(now).unwrap();
        assert_eq!(kind, CapacityKind::Reserved);

        let confirmed = booking.confirm(now).unwrap();
        let (cancelled, kind) = confirmed.cancel(now).unwrap();
        assert_eq!(kind, CapacityKind::Confirmed);
        assert_eq!(cancelled.payment_status, PaymentStatus::Refunded);
    }

    #[test]
    fn terminal_states_refuse_everything() {
        let now = Utc::now();
        let expired = pending(now).expire(now).unwrap();
        assert!(expired.confirm(now).is_err());
        assert!(expired.cancel(now).is_err());
        assert!(expired.expire(now).is_err());
        assert!(expired.complete(now).is_err());
    }

    #[test]
    fn refund_only_after_refunded_cancellation() {
        let now = Utc::now();
        let booking = pending(now);

        // Cancelled from pending: nothing was paid, no refund to record.
        let (cancelled_pending, _) = booking.cancel(now).unwrap();
        assert!(cancelled_pending.refund(now).is_err());

        let (cancelled_confirmed, _) = booking.confirm(now).unwrap().cancel(now).unwrap();
        let refunded = cancelled_confirmed.refund(now).unwrap();
        assert_eq!(refunded.status, BookingStatus::Refunded);
        assert!(refunded.status.is_terminal());
    }
}
