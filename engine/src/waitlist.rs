//! Waitlist operations and promotion.
//!
//! Promotion is greedy in `(priority, joined_at)` order and deliberately
//! makes no attempt at bin-packing across entries of different sizes: an
//! entry larger than the remaining freed quantity is skipped and later,
//! smaller entries may still be served (strict order with skip). Each
//! promoted entry gets a real ledger debit held on its behalf, so
//! acceptance converts the held units directly into a booking with no
//! second capacity check.

use crate::engine::BookingEngine;
use crate::metrics;
use evently_core::audit::{AuditEntity, AuditRecord};
use evently_core::booking::Booking;
use evently_core::clock::Clock;
use evently_core::error::{BookingError, Result};
use evently_core::lifecycle::{LifecycleEntity, LifecycleEvent};
use evently_core::store::{AvailabilityStore, WaitlistStore};
use evently_core::types::{
    BookingReference, BookingStatus, CapacityKind, EventId, UserId, WaitlistEntryId,
    WaitlistStatus,
};
use evently_core::waitlist::{DEFAULT_PRIORITY, WaitlistEntry};

impl BookingEngine {
    /// Joins the waitlist of a sold-out event.
    ///
    /// Only allowed while available capacity cannot seat the request; a
    /// user may hold at most one active entry per event. Admins may pass
    /// an explicit `priority` (lower is served first); everyone else
    /// queues at the neutral default, ordered by join time.
    ///
    /// # Errors
    ///
    /// [`BookingError::InvalidTransition`] when the event still has room
    /// for the request or the user already waits on this event;
    /// [`BookingError::InvalidQuantity`] for a zero or over-cap
    /// quantity.
    pub async fn join_waitlist(
        &self,
        user_id: UserId,
        event_id: EventId,
        quantity: u32,
        priority: Option<i32>,
    ) -> Result<WaitlistEntry> {
        self.validate_quantity(quantity)?;

        let handle = self.lock_event(event_id).await?;
        let result = self
            .join_waitlist_locked(user_id, event_id, quantity, priority)
            .await;
        self.unlock(handle).await;
        let entry = self.alert_on_corruption(result)?;

        self.publish_best_effort(LifecycleEvent::new(
            LifecycleEntity::Waitlist,
            *entry.id.as_uuid(),
            event_id,
            None,
            WaitlistStatus::Pending.as_str(),
            entry.version,
            entry.joined_at,
        ))
        .await;
        tracing::info!(%event_id, %user_id, quantity, priority = entry.priority, "joined waitlist");
        Ok(entry)
    }

    /// Cancels a waitlist entry.
    ///
    /// Cancelling a `notified` entry releases its held units and
    /// re-offers them to the next entry in order. Cancelling a `pending`
    /// entry touches no ledger state, so it relies on the version check
    /// alone; a concurrent promotion wins the race by bumping the
    /// version first.
    ///
    /// # Errors
    ///
    /// [`BookingError::VersionConflict`] if `expected_version` is stale,
    /// [`BookingError::InvalidTransition`] if the entry already left the
    /// queue.
    pub async fn cancel_waitlist(
        &self,
        entry_id: WaitlistEntryId,
        expected_version: i64,
        actor: Option<UserId>,
        reason: Option<String>,
    ) -> Result<WaitlistEntry> {
        let entry = self.get_waitlist_entry(entry_id).await?;
        if entry.version != expected_version {
            return Err(BookingError::VersionConflict {
                expected: expected_version,
                actual: entry.version,
            });
        }

        let (cancelled, promoted) = if entry.status == WaitlistStatus::Notified {
            let handle = self.lock_event(entry.event_id).await?;
            let result = self
                .cancel_notified_locked(entry_id, expected_version, actor, reason)
                .await;
            self.unlock(handle).await;
            self.alert_on_corruption(result)?
        } else {
            let now = self.clock.now();
            let (cancelled, _) = entry.cancel(now)?;
            self.waitlist.update(&cancelled, expected_version).await?;
            self.audit_best_effort(AuditRecord::status_change(
                AuditEntity::Waitlist,
                *entry_id.as_uuid(),
                "CANCEL",
                Some(entry.status.as_str()),
                WaitlistStatus::Cancelled.as_str(),
                actor,
                reason,
                now,
            ))
            .await;
            (cancelled, Vec::new())
        };

        self.publish_best_effort(LifecycleEvent::new(
            LifecycleEntity::Waitlist,
            *cancelled.id.as_uuid(),
            cancelled.event_id,
            Some(entry.status.as_str()),
            WaitlistStatus::Cancelled.as_str(),
            cancelled.version,
            cancelled.updated_at,
        ))
        .await;
        self.publish_all(promoted).await;
        tracing::info!(%entry_id, "waitlist entry cancelled");
        Ok(cancelled)
    }

    /// Converts a `notified`, unexpired entry into a `pending` booking.
    ///
    /// The units were already debited at promotion, so no capacity check
    /// happens here; the reservation simply changes hands.
    ///
    /// # Errors
    ///
    /// [`BookingError::InvalidTransition`] if the entry is not
    /// `notified` or its window closed (an overdue entry is expired in
    /// place first), [`BookingError::WaitlistEntryNotFound`] for unknown
    /// ids.
    pub async fn accept_from_waitlist(
        &self,
        entry_id: WaitlistEntryId,
    ) -> Result<(Booking, WaitlistEntry)> {
        let entry = self.get_waitlist_entry(entry_id).await?;
        if entry.is_notification_expired(self.clock.now()) {
            self.expire_waitlist_entry(entry_id).await?;
            return Err(BookingError::InvalidTransition {
                from: "notified (expired)".to_string(),
                action: "accept",
            });
        }

        let handle = self.lock_event(entry.event_id).await?;
        let result = self.accept_locked(entry_id).await;
        self.unlock(handle).await;
        let (booking, booked) = self.alert_on_corruption(result)?;

        metrics::record_booking_transition("created");
        self.publish_best_effort(LifecycleEvent::new(
            LifecycleEntity::Waitlist,
            *booked.id.as_uuid(),
            booked.event_id,
            Some(WaitlistStatus::Notified.as_str()),
            WaitlistStatus::Booked.as_str(),
            booked.version,
            booked.updated_at,
        ))
        .await;
        self.publish_best_effort(LifecycleEvent::new(
            LifecycleEntity::Booking,
            *booking.id.as_uuid(),
            booking.event_id,
            None,
            BookingStatus::Pending.as_str(),
            booking.version,
            booking.created_at,
        ))
        .await;
        tracing::info!(
            %entry_id,
            booking_reference = %booking.booking_reference,
            "waitlist entry accepted into booking"
        );
        Ok((booking, booked))
    }

    /// Expires one `notified` entry whose window closed, releasing its
    /// held units and re-offering them to the next entry in order.
    ///
    /// Idempotent: returns `Ok(false)` when the entry is no longer
    /// `notified` or its window is still open. Driven by the sweeper and
    /// by read-time checks.
    ///
    /// # Errors
    ///
    /// [`BookingError::WaitlistEntryNotFound`] for unknown ids, plus
    /// lock and store failures.
    pub async fn expire_waitlist_entry(&self, entry_id: WaitlistEntryId) -> Result<bool> {
        let entry = self.get_waitlist_entry(entry_id).await?;
        if entry.status != WaitlistStatus::Notified {
            return Ok(false);
        }

        let handle = self.lock_event(entry.event_id).await?;
        let result = self.expire_entry_locked(entry_id).await;
        self.unlock(handle).await;

        let Some((expired, promoted)) = self.alert_on_corruption(result)? else {
            return Ok(false);
        };
        self.publish_best_effort(LifecycleEvent::new(
            LifecycleEntity::Waitlist,
            *expired.id.as_uuid(),
            expired.event_id,
            Some(WaitlistStatus::Notified.as_str()),
            WaitlistStatus::Expired.as_str(),
            expired.version,
            expired.updated_at,
        ))
        .await;
        self.publish_all(promoted).await;
        tracing::info!(%entry_id, "waitlist notification expired");
        Ok(true)
    }

    /// 1-based rank of an active entry within its event's queue.
    ///
    /// # Errors
    ///
    /// [`BookingError::InvalidTransition`] for entries that already left
    /// the queue, [`BookingError::WaitlistEntryNotFound`] for unknown
    /// ids.
    pub async fn waitlist_position(&self, entry_id: WaitlistEntryId) -> Result<u32> {
        let entry = self.get_waitlist_entry(entry_id).await?;
        if !entry.status.is_active() {
            return Err(BookingError::InvalidTransition {
                from: entry.status.as_str().to_string(),
                action: "rank",
            });
        }
        let active = self.waitlist.active_for_event(entry.event_id).await?;
        active
            .iter()
            .position(|e| e.id == entry_id)
            .map(|index| index as u32 + 1)
            .ok_or(BookingError::WaitlistEntryNotFound(entry_id))
    }

    /// Reads one waitlist entry.
    ///
    /// # Errors
    ///
    /// [`BookingError::WaitlistEntryNotFound`] for unknown ids.
    pub async fn waitlist_entry(&self, entry_id: WaitlistEntryId) -> Result<WaitlistEntry> {
        self.get_waitlist_entry(entry_id).await
    }

    // ========================================================================
    // Promotion
    // ========================================================================

    /// Offers `freed_quantity` units to pending entries in queue order.
    ///
    /// Must run under the event lock, immediately after the credit that
    /// freed the units. Greedy, strict order with skip: each entry that
    /// fits gets a fresh ledger debit held on its behalf and a
    /// notification window; an entry that does not fit is skipped.
    /// Returns the lifecycle events to publish once the lock is
    /// released.
    pub(crate) async fn promote_locked(
        &self,
        event_id: EventId,
        freed_quantity: u32,
    ) -> Result<Vec<LifecycleEvent>> {
        let now = self.clock.now();
        let pending = self.waitlist.pending_for_event(event_id).await?;
        let mut remaining = freed_quantity;
        let mut events = Vec::new();

        for entry in pending {
            if remaining == 0 {
                break;
            }
            if entry.quantity > remaining {
                continue;
            }
            let ledger = self.load_ledger(event_id).await?;
            let debited = match ledger.try_reserve(entry.quantity, now) {
                Ok(next) => next,
                Err(BookingError::InsufficientCapacity { .. }) => continue,
                Err(error) => return Err(error),
            };
            self.availability.update(&debited, ledger.version).await?;

            let notified = entry.notify(now + self.config.notification_window, now)?;
            self.waitlist.update(&notified, entry.version).await?;

            self.audit_best_effort(AuditRecord::status_change(
                AuditEntity::Waitlist,
                *entry.id.as_uuid(),
                "NOTIFY",
                Some(WaitlistStatus::Pending.as_str()),
                WaitlistStatus::Notified.as_str(),
                None,
                Some("capacity held, awaiting acceptance".to_string()),
                now,
            ))
            .await;
            events.push(LifecycleEvent::new(
                LifecycleEntity::Waitlist,
                *notified.id.as_uuid(),
                event_id,
                Some(WaitlistStatus::Pending.as_str()),
                WaitlistStatus::Notified.as_str(),
                notified.version,
                now,
            ));
            remaining -= entry.quantity;
        }

        metrics::record_promotions(events.len() as u64);
        if !events.is_empty() {
            tracing::info!(%event_id, promoted = events.len(), "waitlist entries promoted");
        }
        Ok(events)
    }

    // ========================================================================
    // Locked sections
    // ========================================================================

    async fn join_waitlist_locked(
        &self,
        user_id: UserId,
        event_id: EventId,
        quantity: u32,
        priority: Option<i32>,
    ) -> Result<WaitlistEntry> {
        let now = self.clock.now();
        let ledger = self.ensure_ledger_locked(event_id).await?;
        if ledger.available_capacity >= quantity {
            return Err(BookingError::InvalidTransition {
                from: format!("{} units available", ledger.available_capacity),
                action: "join waitlist",
            });
        }
        if let Some(existing) = self.waitlist.active_for_user(user_id, event_id).await? {
            return Err(BookingError::InvalidTransition {
                from: format!("existing {} entry", existing.status),
                action: "join waitlist again",
            });
        }

        let entry = WaitlistEntry::join(
            user_id,
            event_id,
            quantity,
            priority.unwrap_or(DEFAULT_PRIORITY),
            now,
        );
        self.waitlist.insert(&entry).await?;
        self.audit_best_effort(AuditRecord::status_change(
            AuditEntity::Waitlist,
            *entry.id.as_uuid(),
            "JOIN",
            None,
            WaitlistStatus::Pending.as_str(),
            Some(user_id),
            None,
            now,
        ))
        .await;
        Ok(entry)
    }

    async fn cancel_notified_locked(
        &self,
        entry_id: WaitlistEntryId,
        expected_version: i64,
        actor: Option<UserId>,
        reason: Option<String>,
    ) -> Result<(WaitlistEntry, Vec<LifecycleEvent>)> {
        let now = self.clock.now();
        let entry = self.get_waitlist_entry(entry_id).await?;
        if entry.version != expected_version {
            return Err(BookingError::VersionConflict {
                expected: expected_version,
                actual: entry.version,
            });
        }
        let old_status = entry.status;
        let (cancelled, held) = entry.cancel(now)?;
        // Validate the credit before touching either row, so a corrupted
        // ledger fails the operation with nothing persisted.
        let ledger = self.load_ledger(entry.event_id).await?;
        let credited = if held {
            Some((ledger.release(entry.quantity, CapacityKind::Reserved, now)?, ledger.version))
        } else {
            None
        };

        self.waitlist.update(&cancelled, expected_version).await?;
        self.audit_best_effort(AuditRecord::status_change(
            AuditEntity::Waitlist,
            *entry_id.as_uuid(),
            "CANCEL",
            Some(old_status.as_str()),
            WaitlistStatus::Cancelled.as_str(),
            actor,
            reason,
            now,
        ))
        .await;

        let promoted = if let Some((credited, expected)) = credited {
            self.availability.update(&credited, expected).await?;
            self.promote_locked(entry.event_id, entry.quantity).await?
        } else {
            Vec::new()
        };
        Ok((cancelled, promoted))
    }

    async fn accept_locked(
        &self,
        entry_id: WaitlistEntryId,
    ) -> Result<(Booking, WaitlistEntry)> {
        let now = self.clock.now();
        let entry = self.get_waitlist_entry(entry_id).await?;
        let ledger = self.load_ledger(entry.event_id).await?;
        let total_amount = ledger
            .price
            .checked_multiply(entry.quantity)
            .ok_or(BookingError::InvalidQuantity {
                quantity: entry.quantity,
                max: self.config.max_quantity_per_request,
            })?;

        let mut booking = Booking::create(
            entry.user_id,
            entry.event_id,
            BookingReference::generate(now),
            entry.quantity,
            total_amount,
            now + self.config.reservation_hold,
            now,
        );
        // Flip the entry first: every notified-entry mutator holds the
        // event lock, so this compare-and-swap conflicting means the read
        // was stale, and nothing has been persisted yet.
        let booked = entry.book(booking.id, now)?;
        self.waitlist.update(&booked, entry.version).await?;
        self.persist_new_booking(&mut booking).await?;

        self.audit_best_effort(AuditRecord::status_change(
            AuditEntity::Waitlist,
            *entry_id.as_uuid(),
            "BOOK",
            Some(WaitlistStatus::Notified.as_str()),
            WaitlistStatus::Booked.as_str(),
            Some(entry.user_id),
            None,
            now,
        ))
        .await;
        self.audit_best_effort(AuditRecord::status_change(
            AuditEntity::Booking,
            *booking.id.as_uuid(),
            "CREATE",
            None,
            BookingStatus::Pending.as_str(),
            Some(entry.user_id),
            Some("accepted from waitlist".to_string()),
            now,
        ))
        .await;
        Ok((booking, booked))
    }

    async fn expire_entry_locked(
        &self,
        entry_id: WaitlistEntryId,
    ) -> Result<Option<(WaitlistEntry, Vec<LifecycleEvent>)>> {
        let now = self.clock.now();
        let entry = self.get_waitlist_entry(entry_id).await?;
        // Idempotence: only an overdue notified entry transitions.
        if !entry.is_notification_expired(now) {
            return Ok(None);
        }
        let expired = entry.expire(now)?;
        let ledger = self.load_ledger(entry.event_id).await?;
        let credited = ledger.release(entry.quantity, CapacityKind::Reserved, now)?;

        self.waitlist.update(&expired, entry.version).await?;
        self.availability.update(&credited, ledger.version).await?;

        self.audit_best_effort(AuditRecord::status_change(
            AuditEntity::Waitlist,
            *entry_id.as_uuid(),
            "EXPIRE",
            Some(WaitlistStatus::Notified.as_str()),
            WaitlistStatus::Expired.as_str(),
            None,
            Some("notification window passed".to_string()),
            now,
        ))
        .await;

        let promoted = self.promote_locked(entry.event_id, entry.quantity).await?;
        Ok(Some((expired, promoted)))
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    pub(crate) async fn get_waitlist_entry(
        &self,
        entry_id: WaitlistEntryId,
    ) -> Result<WaitlistEntry> {
        self.waitlist
            .get(entry_id)
            .await?
            .ok_or(BookingError::WaitlistEntryNotFound(entry_id))
    }
}
