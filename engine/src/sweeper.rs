//! Reservation expiry sweeper.
//!
//! A fixed-interval background pass that reclaims capacity held past a
//! deadline: `pending` bookings whose reservation ran out and `notified`
//! waitlist entries whose window closed unanswered. Each row is
//! transitioned under its event's lock through the same engine
//! operations an explicit expiry would use, so the pass is idempotent:
//! a row someone else already transitioned is skipped.
//!
//! The interval trades promptness of capacity reclaim for throughput: a
//! tighter interval shortens the window during which abandoned
//! reservations hold capacity hostage.

use crate::engine::BookingEngine;
use crate::metrics;
use evently_core::clock::Clock;
use evently_core::store::{BookingStore, WaitlistStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Outcome of one sweep pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Pending bookings transitioned to expired.
    pub expired_bookings: u64,
    /// Notified waitlist entries transitioned to expired.
    pub expired_notifications: u64,
}

/// Background reclaimer of abandoned reservations.
pub struct Sweeper {
    engine: Arc<BookingEngine>,
    interval: Duration,
}

impl Sweeper {
    /// Creates a sweeper over `engine`, using the engine's configured
    /// sweep interval.
    #[must_use]
    pub fn new(engine: Arc<BookingEngine>) -> Self {
        let interval = engine.config().sweep_interval;
        Self { engine, interval }
    }

    /// Overrides the sweep interval.
    #[must_use]
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Runs one sweep pass.
    ///
    /// Failures on individual rows are logged and skipped so one bad row
    /// cannot stall reclamation of the rest.
    ///
    /// # Errors
    ///
    /// Returns an error only if the candidate scans themselves fail.
    pub async fn sweep_once(&self) -> evently_core::Result<SweepReport> {
        let now = self.engine.clock.now();
        let mut report = SweepReport::default();

        for booking in self.engine.bookings.expired_pending(now).await? {
            match self.engine.expire_booking(booking.id).await {
                Ok(true) => report.expired_bookings += 1,
                Ok(false) => {}
                Err(error) => {
                    tracing::warn!(%error, booking_id = %booking.id, "sweep failed to expire booking");
                }
            }
        }

        for entry in self.engine.waitlist.expired_notifications(now).await? {
            match self.engine.expire_waitlist_entry(entry.id).await {
                Ok(true) => report.expired_notifications += 1,
                Ok(false) => {}
                Err(error) => {
                    tracing::warn!(%error, entry_id = %entry.id, "sweep failed to expire waitlist entry");
                }
            }
        }

        metrics::record_sweeper_reclaimed("booking", report.expired_bookings);
        metrics::record_sweeper_reclaimed("waitlist", report.expired_notifications);
        if report != SweepReport::default() {
            tracing::info!(
                expired_bookings = report.expired_bookings,
                expired_notifications = report.expired_notifications,
                "sweep pass reclaimed capacity"
            );
        }
        Ok(report)
    }

    /// Spawns the sweep loop.
    ///
    /// Returns the task handle and a shutdown sender; send `true` to
    /// stop the loop.
    #[must_use]
    pub fn spawn(self) -> (JoinHandle<()>, watch::Sender<bool>) {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(error) = self.sweep_once().await {
                            tracing::error!(%error, "sweep pass failed");
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        // A dropped sender also stops the loop.
                        if changed.is_err() || *shutdown_rx.borrow() {
                            tracing::info!("sweeper shutting down");
                            break;
                        }
                    }
                }
            }
        });
        (handle, shutdown_tx)
    }
}
