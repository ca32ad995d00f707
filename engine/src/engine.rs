//! Engine composition and availability-ledger operations.
//!
//! [`BookingEngine`] owns `Arc<dyn ...>` collaborators for every trait
//! seam and sequences all ledger mutations inside the event's
//! distributed lock. The locking discipline is uniform: a public
//! operation acquires the lock (with bounded backoff on contention),
//! delegates to a `*_locked` method, releases the lock on every exit
//! path, and only then publishes lifecycle events, since publishing is
//! best-effort and must never extend lock hold time.

use crate::config::EngineConfig;
use crate::metrics;
use evently_core::audit::{AuditEntity, AuditRecord, AuditStore};
use evently_core::catalog::{CatalogEventStatus, EventCatalog};
use evently_core::clock::Clock;
use evently_core::error::{BookingError, Result};
use evently_core::ledger::EventAvailability;
use evently_core::lifecycle::{LifecycleEvent, LifecyclePublisher};
use evently_core::lock::{EventLock, LockHandle};
use evently_core::store::{AvailabilityStats, AvailabilityStore, BookingStore, WaitlistStore};
use evently_core::types::EventId;
use std::sync::Arc;
use std::time::Instant;

/// The availability & booking concurrency engine.
///
/// Tracks per-event capacity, arbitrates concurrent reservation
/// attempts, advances bookings through their lifecycle, and promotes
/// waitlisted requests when capacity frees up.
pub struct BookingEngine {
    pub(crate) availability: Arc<dyn AvailabilityStore>,
    pub(crate) bookings: Arc<dyn BookingStore>,
    pub(crate) waitlist: Arc<dyn WaitlistStore>,
    pub(crate) audit: Arc<dyn AuditStore>,
    pub(crate) lock: Arc<dyn EventLock>,
    pub(crate) catalog: Arc<dyn EventCatalog>,
    pub(crate) publisher: Arc<dyn LifecyclePublisher>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) config: EngineConfig,
}

impl BookingEngine {
    /// Composes an engine from its collaborators.
    #[must_use]
    #[allow(clippy::too_many_arguments)] // One seam per collaborator, wired once at startup
    pub fn new(
        availability: Arc<dyn AvailabilityStore>,
        bookings: Arc<dyn BookingStore>,
        waitlist: Arc<dyn WaitlistStore>,
        audit: Arc<dyn AuditStore>,
        lock: Arc<dyn EventLock>,
        catalog: Arc<dyn EventCatalog>,
        publisher: Arc<dyn LifecyclePublisher>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Self {
        Self {
            availability,
            bookings,
            waitlist,
            audit,
            lock,
            catalog,
            publisher,
            clock,
            config,
        }
    }

    /// Engine configuration.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ========================================================================
    // Availability operations
    // ========================================================================

    /// Returns the availability snapshot for an event, lazily
    /// materializing the ledger from the catalog on first reference.
    ///
    /// # Errors
    ///
    /// [`BookingError::EventNotFound`] for events unknown to the
    /// catalog, [`BookingError::InvalidTransition`] for non-published
    /// events, [`BookingError::CollaboratorUnavailable`] when the
    /// catalog is down (fail closed).
    pub async fn availability(&self, event_id: EventId) -> Result<EventAvailability> {
        if let Some(ledger) = self.availability.get(event_id).await? {
            return Ok(ledger);
        }
        let handle = self.lock_event(event_id).await?;
        let result = self.ensure_ledger_locked(event_id).await;
        self.unlock(handle).await;
        self.alert_on_corruption(result)
    }

    /// Resizes an event's capacity ceiling (admin operation).
    ///
    /// Growing the ceiling frees units, so the waitlist is offered the
    /// difference, like after any other ledger credit.
    ///
    /// # Errors
    ///
    /// [`BookingError::EventNotFound`] if no ledger exists,
    /// [`BookingError::InvalidTransition`] if the new total is below the
    /// units already held.
    pub async fn update_capacity(
        &self,
        event_id: EventId,
        new_total: u32,
    ) -> Result<EventAvailability> {
        let handle = self.lock_event(event_id).await?;
        let result = self.update_capacity_locked(event_id, new_total).await;
        self.unlock(handle).await;
        let (resized, promoted) = self.alert_on_corruption(result)?;
        self.publish_all(promoted).await;
        tracing::info!(%event_id, new_total, "event capacity updated");
        Ok(resized)
    }

    /// Aggregate availability counters across all events.
    ///
    /// # Errors
    ///
    /// Propagates backend read failures.
    pub async fn availability_stats(&self) -> Result<AvailabilityStats> {
        self.availability.stats().await
    }

    async fn update_capacity_locked(
        &self,
        event_id: EventId,
        new_total: u32,
    ) -> Result<(EventAvailability, Vec<LifecycleEvent>)> {
        let now = self.clock.now();
        let ledger = self.load_ledger(event_id).await?;
        let resized = ledger.resize(new_total, now)?;
        self.availability.update(&resized, ledger.version).await?;
        self.audit_best_effort(AuditRecord {
            id: uuid::Uuid::new_v4(),
            entity: AuditEntity::Availability,
            entity_id: *event_id.as_uuid(),
            action: "RESIZE".to_string(),
            field: Some("total_capacity".to_string()),
            old_value: Some(ledger.total_capacity.to_string()),
            new_value: Some(new_total.to_string()),
            changed_by: None,
            reason: None,
            occurred_at: now,
        })
        .await;

        let freed = resized
            .available_capacity
            .saturating_sub(ledger.available_capacity);
        let promoted = if freed > 0 {
            self.promote_locked(event_id, freed).await?
        } else {
            Vec::new()
        };
        Ok((resized, promoted))
    }

    // ========================================================================
    // Internals shared across operations
    // ========================================================================

    /// Acquires the event's lock, retrying contention with exponential
    /// backoff up to the configured attempts.
    pub(crate) async fn lock_event(&self, event_id: EventId) -> Result<LockHandle> {
        let started = Instant::now();
        let mut attempt = 0;
        loop {
            match self
                .lock
                .acquire(event_id, self.config.lock_timeout, self.config.lock_lease)
                .await
            {
                Ok(handle) => {
                    metrics::record_lock_wait(started.elapsed());
                    return Ok(handle);
                }
                Err(error @ BookingError::LockContended { .. })
                    if attempt < self.config.lock_retry.max_retries =>
                {
                    let delay = self.config.lock_retry.delay_for_attempt(attempt);
                    tracing::debug!(%event_id, attempt, ?delay, %error, "event lock contended, backing off");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }

    /// Releases a held lock; a failed release is logged and left to the
    /// lease.
    pub(crate) async fn unlock(&self, handle: LockHandle) {
        let key = handle.key.clone();
        if let Err(error) = self.lock.release(handle).await {
            tracing::warn!(%error, %key, "failed to release event lock; lease will expire it");
        }
    }

    /// Loads an event's ledger row, failing if it was never materialized.
    pub(crate) async fn load_ledger(&self, event_id: EventId) -> Result<EventAvailability> {
        self.availability
            .get(event_id)
            .await?
            .ok_or(BookingError::EventNotFound(event_id))
    }

    /// Loads the ledger row, materializing it from the catalog on first
    /// reference. Must run under the event lock.
    pub(crate) async fn ensure_ledger_locked(&self, event_id: EventId) -> Result<EventAvailability> {
        if let Some(ledger) = self.availability.get(event_id).await? {
            return Ok(ledger);
        }
        let info = self.catalog.capacity_info(event_id).await?;
        if info.status != CatalogEventStatus::Published {
            return Err(BookingError::InvalidTransition {
                from: format!("catalog status {}", info.status.as_str()),
                action: "book",
            });
        }
        let now = self.clock.now();
        let ledger = EventAvailability::materialize(event_id, info.total_capacity, info.price, now);
        self.availability.insert(&ledger).await?;
        self.audit_best_effort(AuditRecord {
            id: uuid::Uuid::new_v4(),
            entity: AuditEntity::Availability,
            entity_id: *event_id.as_uuid(),
            action: "MATERIALIZE".to_string(),
            field: Some("total_capacity".to_string()),
            old_value: None,
            new_value: Some(info.total_capacity.to_string()),
            changed_by: None,
            reason: None,
            occurred_at: now,
        })
        .await;
        tracing::info!(%event_id, total_capacity = info.total_capacity, "availability ledger materialized");
        Ok(ledger)
    }

    /// Raises the operator alert when a result carries a corrupted
    /// ledger before handing the error back.
    ///
    /// The corrupted row is left untouched, so every later mutation
    /// attempt re-detects the breach: mutation of that event stays
    /// halted until operators intervene.
    pub(crate) fn alert_on_corruption<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(BookingError::LedgerCorrupted { event_id }) = &result {
            tracing::error!(
                %event_id,
                "availability ledger corrupted; refusing further mutation of this event"
            );
        }
        result
    }

    /// Appends an audit record; failures are logged loudly but do not
    /// unwind the already-committed transition.
    pub(crate) async fn audit_best_effort(&self, record: AuditRecord) {
        if let Err(error) = self.audit.append(&record).await {
            tracing::error!(
                %error,
                entity = %record.entity,
                entity_id = %record.entity_id,
                action = %record.action,
                "audit append failed"
            );
        }
    }

    /// Publishes a lifecycle event; failures are logged and the message
    /// is dropped (at-most-once, never transactional).
    pub(crate) async fn publish_best_effort(&self, event: LifecycleEvent) {
        if let Err(error) = self.publisher.publish(&event).await {
            tracing::warn!(
                %error,
                entity = %event.entity_type,
                entity_id = %event.entity_id,
                new_status = %event.new_status,
                "lifecycle publish failed, dropping"
            );
        }
    }

    /// Publishes a batch of lifecycle events in order, best-effort.
    pub(crate) async fn publish_all(&self, events: Vec<LifecycleEvent>) {
        for event in events {
            self.publish_best_effort(event).await;
        }
    }

    /// Validates the per-request quantity bounds.
    pub(crate) fn validate_quantity(&self, quantity: u32) -> Result<()> {
        if quantity == 0 || quantity > self.config.max_quantity_per_request {
            return Err(BookingError::InvalidQuantity {
                quantity,
                max: self.config.max_quantity_per_request,
            });
        }
        Ok(())
    }
}
