//! Booking lifecycle operations.
//!
//! Create debits the ledger and leaves the booking `pending` with a
//! reservation deadline; confirm transfers the held units into the
//! confirmed bucket; cancel and expiry credit them back and offer the
//! freed quantity to the waitlist. Callers of confirm/cancel supply the
//! version they last read; a mismatch is a [`BookingError::VersionConflict`]
//! asking them to re-read and retry, never a fatal error.

use crate::engine::BookingEngine;
use crate::metrics;
use evently_core::audit::{AuditEntity, AuditRecord};
use evently_core::booking::Booking;
use evently_core::clock::Clock;
use evently_core::error::{BookingError, Result};
use evently_core::lifecycle::{LifecycleEntity, LifecycleEvent};
use evently_core::store::{AvailabilityStore, BookingStore};
use evently_core::types::{BookingId, BookingReference, BookingStatus, EventId, UserId};

impl BookingEngine {
    /// Creates a booking: debits the event's ledger and records a
    /// `pending` booking holding the units until the reservation
    /// deadline.
    ///
    /// # Errors
    ///
    /// [`BookingError::InsufficientCapacity`] when the event cannot seat
    /// the request; the caller should offer a waitlist join instead.
    /// [`BookingError::InvalidQuantity`] for a zero or over-cap
    /// quantity, [`BookingError::CollaboratorUnavailable`] when the
    /// catalog cannot be consulted (fail closed), plus lock and store
    /// failures.
    pub async fn create_booking(
        &self,
        user_id: UserId,
        event_id: EventId,
        quantity: u32,
    ) -> Result<Booking> {
        self.validate_quantity(quantity)?;

        let handle = self.lock_event(event_id).await?;
        let result = self.create_booking_locked(user_id, event_id, quantity).await;
        self.unlock(handle).await;

        let booking = match self.alert_on_corruption(result) {
            Ok(booking) => booking,
            Err(error) => {
                if let BookingError::InsufficientCapacity { available, .. } = &error {
                    metrics::record_capacity_rejection();
                    tracing::info!(%event_id, quantity, available, "booking rejected for capacity");
                }
                return Err(error);
            }
        };

        metrics::record_booking_transition("created");
        self.publish_best_effort(LifecycleEvent::new(
            LifecycleEntity::Booking,
            *booking.id.as_uuid(),
            event_id,
            None,
            BookingStatus::Pending.as_str(),
            booking.version,
            booking.created_at,
        ))
        .await;
        tracing::info!(
            booking_reference = %booking.booking_reference,
            %event_id,
            %user_id,
            quantity,
            "booking created"
        );
        Ok(booking)
    }

    /// Confirms a `pending` booking, transferring its units from
    /// reserved to confirmed.
    ///
    /// A `pending` booking past its deadline is treated as already
    /// expired: it is reclaimed in place and the confirm fails, even if
    /// the sweeper has not visited it yet.
    ///
    /// # Errors
    ///
    /// [`BookingError::VersionConflict`] if `expected_version` is stale,
    /// [`BookingError::InvalidTransition`] if the booking is not
    /// `pending` or its reservation ran out,
    /// [`BookingError::BookingNotFound`] for unknown ids.
    pub async fn confirm_booking(
        &self,
        booking_id: BookingId,
        expected_version: i64,
    ) -> Result<Booking> {
        let booking = self.get_booking(booking_id).await?;
        if booking.is_expired(self.clock.now()) {
            self.expire_booking(booking_id).await?;
            return Err(BookingError::InvalidTransition {
                from: "pending (expired)".to_string(),
                action: "confirm",
            });
        }

        let handle = self.lock_event(booking.event_id).await?;
        let result = self.confirm_locked(booking_id, expected_version).await;
        self.unlock(handle).await;
        let confirmed = self.alert_on_corruption(result)?;

        metrics::record_booking_transition("confirmed");
        self.publish_best_effort(LifecycleEvent::new(
            LifecycleEntity::Booking,
            *confirmed.id.as_uuid(),
            confirmed.event_id,
            Some(BookingStatus::Pending.as_str()),
            BookingStatus::Confirmed.as_str(),
            confirmed.version,
            confirmed.updated_at,
        ))
        .await;
        tracing::info!(booking_reference = %confirmed.booking_reference, "booking confirmed");
        Ok(confirmed)
    }

    /// Cancels a `pending` or `confirmed` booking, credits the ledger
    /// back, and offers the freed quantity to the waitlist.
    ///
    /// # Errors
    ///
    /// [`BookingError::VersionConflict`] if `expected_version` is stale,
    /// [`BookingError::InvalidTransition`] from terminal states,
    /// [`BookingError::BookingNotFound`] for unknown ids.
    pub async fn cancel_booking(
        &self,
        booking_id: BookingId,
        expected_version: i64,
        actor: Option<UserId>,
        reason: Option<String>,
    ) -> Result<Booking> {
        let booking = self.get_booking(booking_id).await?;

        let handle = self.lock_event(booking.event_id).await?;
        let result = self
            .cancel_locked(booking_id, expected_version, actor, reason)
            .await;
        self.unlock(handle).await;
        let (cancelled, old_status, promoted) = self.alert_on_corruption(result)?;

        metrics::record_booking_transition("cancelled");
        self.publish_best_effort(LifecycleEvent::new(
            LifecycleEntity::Booking,
            *cancelled.id.as_uuid(),
            cancelled.event_id,
            Some(old_status.as_str()),
            BookingStatus::Cancelled.as_str(),
            cancelled.version,
            cancelled.updated_at,
        ))
        .await;
        self.publish_all(promoted).await;
        tracing::info!(booking_reference = %cancelled.booking_reference, "booking cancelled");
        Ok(cancelled)
    }

    /// Expires one overdue `pending` booking and re-offers its units.
    ///
    /// Idempotent: returns `Ok(false)` without touching anything when
    /// the booking is no longer `pending` or its deadline has not
    /// passed. Driven by the sweeper and by read-time expiry checks.
    ///
    /// # Errors
    ///
    /// [`BookingError::BookingNotFound`] for unknown ids, plus lock and
    /// store failures.
    pub async fn expire_booking(&self, booking_id: BookingId) -> Result<bool> {
        let booking = self.get_booking(booking_id).await?;
        if booking.status != BookingStatus::Pending {
            return Ok(false);
        }

        let handle = self.lock_event(booking.event_id).await?;
        let result = self.expire_locked(booking_id).await;
        self.unlock(handle).await;

        let Some((expired, promoted)) = self.alert_on_corruption(result)? else {
            return Ok(false);
        };
        metrics::record_booking_transition("expired");
        self.publish_best_effort(LifecycleEvent::new(
            LifecycleEntity::Booking,
            *expired.id.as_uuid(),
            expired.event_id,
            Some(BookingStatus::Pending.as_str()),
            BookingStatus::Expired.as_str(),
            expired.version,
            expired.updated_at,
        ))
        .await;
        self.publish_all(promoted).await;
        tracing::info!(booking_reference = %expired.booking_reference, "booking expired");
        Ok(true)
    }

    /// Records refund settlement reported by the payment collaborator:
    /// `cancelled` (with payment already returned) becomes `refunded`.
    ///
    /// No ledger movement: the units were credited back at cancellation.
    ///
    /// # Errors
    ///
    /// [`BookingError::VersionConflict`] if `expected_version` is stale,
    /// [`BookingError::InvalidTransition`] unless the booking is
    /// cancelled with its payment returned.
    pub async fn record_refund(
        &self,
        booking_id: BookingId,
        expected_version: i64,
    ) -> Result<Booking> {
        let booking = self.get_booking(booking_id).await?;
        if booking.version != expected_version {
            return Err(BookingError::VersionConflict {
                expected: expected_version,
                actual: booking.version,
            });
        }
        let now = self.clock.now();
        let refunded = booking.refund(now)?;
        self.bookings.update(&refunded, expected_version).await?;
        self.audit_best_effort(AuditRecord::status_change(
            AuditEntity::Booking,
            *booking_id.as_uuid(),
            "REFUND",
            Some(BookingStatus::Cancelled.as_str()),
            BookingStatus::Refunded.as_str(),
            None,
            None,
            now,
        ))
        .await;
        metrics::record_booking_transition("refunded");
        self.publish_best_effort(LifecycleEvent::new(
            LifecycleEntity::Booking,
            *refunded.id.as_uuid(),
            refunded.event_id,
            Some(BookingStatus::Cancelled.as_str()),
            BookingStatus::Refunded.as_str(),
            refunded.version,
            now,
        ))
        .await;
        Ok(refunded)
    }

    /// Marks every `confirmed` booking of a finished event `completed`.
    ///
    /// Returns how many bookings transitioned. Bookings mutated
    /// concurrently are skipped and picked up by a later call.
    ///
    /// # Errors
    ///
    /// Propagates store failures other than version conflicts.
    pub async fn complete_event(&self, event_id: EventId) -> Result<u64> {
        let confirmed = self.bookings.confirmed_for_event(event_id).await?;
        let now = self.clock.now();
        let mut completed = 0;
        for booking in confirmed {
            let Ok(next) = booking.complete(now) else {
                continue;
            };
            match self.bookings.update(&next, booking.version).await {
                Ok(()) => {
                    self.audit_best_effort(AuditRecord::status_change(
                        AuditEntity::Booking,
                        *booking.id.as_uuid(),
                        "COMPLETE",
                        Some(BookingStatus::Confirmed.as_str()),
                        BookingStatus::Completed.as_str(),
                        None,
                        None,
                        now,
                    ))
                    .await;
                    metrics::record_booking_transition("completed");
                    self.publish_best_effort(LifecycleEvent::new(
                        LifecycleEntity::Booking,
                        *next.id.as_uuid(),
                        event_id,
                        Some(BookingStatus::Confirmed.as_str()),
                        BookingStatus::Completed.as_str(),
                        next.version,
                        now,
                    ))
                    .await;
                    completed += 1;
                }
                Err(BookingError::VersionConflict { .. }) => {
                    tracing::debug!(booking_id = %booking.id, "skipped completion, booking mutated concurrently");
                }
                Err(error) => return Err(error),
            }
        }
        tracing::info!(%event_id, completed, "event completed");
        Ok(completed)
    }

    /// Reads one booking.
    ///
    /// # Errors
    ///
    /// [`BookingError::BookingNotFound`] for unknown ids.
    pub async fn booking(&self, booking_id: BookingId) -> Result<Booking> {
        self.get_booking(booking_id).await
    }

    /// Returns one page of a user's bookings, newest first, with the
    /// total count.
    ///
    /// # Errors
    ///
    /// Propagates backend read failures.
    pub async fn user_bookings(
        &self,
        user_id: UserId,
        page: u32,
        page_size: u32,
    ) -> Result<(Vec<Booking>, u64)> {
        self.bookings.for_user(user_id, page, page_size).await
    }

    // ========================================================================
    // Locked sections
    // ========================================================================

    async fn create_booking_locked(
        &self,
        user_id: UserId,
        event_id: EventId,
        quantity: u32,
    ) -> Result<Booking> {
        let now = self.clock.now();
        let ledger = self.ensure_ledger_locked(event_id).await?;
        let total_amount =
            ledger
                .price
                .checked_multiply(quantity)
                .ok_or(BookingError::InvalidQuantity {
                    quantity,
                    max: self.config.max_quantity_per_request,
                })?;

        let debited = ledger.try_reserve(quantity, now)?;
        self.availability.update(&debited, ledger.version).await?;

        let mut booking = Booking::create(
            user_id,
            event_id,
            BookingReference::generate(now),
            quantity,
            total_amount,
            now + self.config.reservation_hold,
            now,
        );
        if let Err(error) = self.persist_new_booking(&mut booking).await {
            // Undo the debit; still under the event lock, so this cannot race.
            let current = self.load_ledger(event_id).await?;
            let restored =
                current.release(quantity, evently_core::types::CapacityKind::Reserved, now)?;
            self.availability.update(&restored, current.version).await?;
            return Err(error);
        }

        self.audit_best_effort(AuditRecord::status_change(
            AuditEntity::Booking,
            *booking.id.as_uuid(),
            "CREATE",
            None,
            BookingStatus::Pending.as_str(),
            Some(user_id),
            None,
            now,
        ))
        .await;
        Ok(booking)
    }

    async fn confirm_locked(
        &self,
        booking_id: BookingId,
        expected_version: i64,
    ) -> Result<Booking> {
        let now = self.clock.now();
        let booking = self.get_booking(booking_id).await?;
        if booking.version != expected_version {
            return Err(BookingError::VersionConflict {
                expected: expected_version,
                actual: booking.version,
            });
        }
        // Validate the ledger arithmetic before touching either row, so
        // a corrupted ledger fails the operation with nothing persisted.
        let confirmed = booking.confirm(now)?;
        let ledger = self.load_ledger(booking.event_id).await?;
        let transferred = ledger.confirm_reserved(booking.quantity, now)?;

        self.bookings.update(&confirmed, expected_version).await?;
        self.availability.update(&transferred, ledger.version).await?;

        self.audit_best_effort(AuditRecord::status_change(
            AuditEntity::Booking,
            *booking_id.as_uuid(),
            "CONFIRM",
            Some(BookingStatus::Pending.as_str()),
            BookingStatus::Confirmed.as_str(),
            Some(booking.user_id),
            None,
            now,
        ))
        .await;
        Ok(confirmed)
    }

    async fn cancel_locked(
        &self,
        booking_id: BookingId,
        expected_version: i64,
        actor: Option<UserId>,
        reason: Option<String>,
    ) -> Result<(Booking, BookingStatus, Vec<LifecycleEvent>)> {
        let now = self.clock.now();
        let booking = self.get_booking(booking_id).await?;
        if booking.version != expected_version {
            return Err(BookingError::VersionConflict {
                expected: expected_version,
                actual: booking.version,
            });
        }
        let old_status = booking.status;
        let (cancelled, kind) = booking.cancel(now)?;
        let ledger = self.load_ledger(booking.event_id).await?;
        let credited = ledger.release(booking.quantity, kind, now)?;

        self.bookings.update(&cancelled, expected_version).await?;
        self.availability.update(&credited, ledger.version).await?;

        self.audit_best_effort(AuditRecord::status_change(
            AuditEntity::Booking,
            *booking_id.as_uuid(),
            "CANCEL",
            Some(old_status.as_str()),
            BookingStatus::Cancelled.as_str(),
            actor,
            reason,
            now,
        ))
        .await;

        let promoted = self
            .promote_locked(booking.event_id, booking.quantity)
            .await?;
        Ok((cancelled, old_status, promoted))
    }

    async fn expire_locked(
        &self,
        booking_id: BookingId,
    ) -> Result<Option<(Booking, Vec<LifecycleEvent>)>> {
        let now = self.clock.now();
        let booking = self.get_booking(booking_id).await?;
        // Idempotence: only an overdue pending booking transitions.
        if !booking.is_expired(now) {
            return Ok(None);
        }
        let expired = booking.expire(now)?;
        let ledger = self.load_ledger(booking.event_id).await?;
        let credited = ledger.release(
            booking.quantity,
            evently_core::types::CapacityKind::Reserved,
            now,
        )?;

        self.bookings.update(&expired, booking.version).await?;
        self.availability.update(&credited, ledger.version).await?;

        self.audit_best_effort(AuditRecord::status_change(
            AuditEntity::Booking,
            *booking_id.as_uuid(),
            "EXPIRE",
            Some(BookingStatus::Pending.as_str()),
            BookingStatus::Expired.as_str(),
            None,
            Some("reservation deadline passed".to_string()),
            now,
        ))
        .await;

        let promoted = self
            .promote_locked(booking.event_id, booking.quantity)
            .await?;
        Ok(Some((expired, promoted)))
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    pub(crate) async fn get_booking(&self, booking_id: BookingId) -> Result<Booking> {
        self.bookings
            .get(booking_id)
            .await?
            .ok_or(BookingError::BookingNotFound(booking_id))
    }

    /// Inserts a new booking, regenerating the reference on the rare
    /// collision up to the configured attempts.
    pub(crate) async fn persist_new_booking(&self, booking: &mut Booking) -> Result<()> {
        let mut attempt = 0;
        loop {
            match self.bookings.insert(booking).await {
                Ok(()) => return Ok(()),
                Err(BookingError::DuplicateReference(reference))
                    if attempt + 1 < self.config.reference_attempts =>
                {
                    attempt += 1;
                    tracing::warn!(%reference, attempt, "booking reference collision, regenerating");
                    booking.booking_reference = BookingReference::generate(booking.created_at);
                }
                Err(error) => return Err(error),
            }
        }
    }
}
