//! Business metrics for the booking engine.
//!
//! Exported through the `metrics` facade; the process embedding the
//! engine decides on an exporter.
//!
//! # Exported Metrics
//!
//! ## Counters
//! - `evently_bookings_total{status}` - booking transitions by new status
//! - `evently_capacity_rejections_total` - create attempts refused for capacity
//! - `evently_waitlist_promotions_total` - entries promoted to notified
//! - `evently_sweeper_reclaimed_total{entity}` - rows reclaimed by the sweeper
//!
//! ## Histograms
//! - `evently_lock_wait_seconds` - time spent acquiring the event lock

use metrics::{describe_counter, describe_histogram};
use std::time::Duration;

/// Registers metric descriptions. Call once at startup, before any
/// metric is recorded.
pub fn register_engine_metrics() {
    describe_counter!(
        "evently_bookings_total",
        "Total booking transitions by new status (created, confirmed, cancelled, expired, refunded, completed)"
    );
    describe_counter!(
        "evently_capacity_rejections_total",
        "Booking attempts rejected because available capacity was insufficient"
    );
    describe_counter!(
        "evently_waitlist_promotions_total",
        "Waitlist entries promoted to notified with capacity held"
    );
    describe_counter!(
        "evently_sweeper_reclaimed_total",
        "Rows reclaimed by the expiry sweeper, by entity kind"
    );
    describe_histogram!(
        "evently_lock_wait_seconds",
        "Time spent waiting for an event's distributed lock"
    );

    tracing::info!("Engine metrics registered");
}

/// Records one booking transition.
pub fn record_booking_transition(status: &'static str) {
    metrics::counter!("evently_bookings_total", "status" => status).increment(1);
}

/// Records a create attempt refused for capacity.
pub fn record_capacity_rejection() {
    metrics::counter!("evently_capacity_rejections_total").increment(1);
}

/// Records waitlist promotions.
pub fn record_promotions(count: u64) {
    if count > 0 {
        metrics::counter!("evently_waitlist_promotions_total").increment(count);
    }
}

/// Records rows reclaimed by the sweeper.
pub fn record_sweeper_reclaimed(entity: &'static str, count: u64) {
    if count > 0 {
        metrics::counter!("evently_sweeper_reclaimed_total", "entity" => entity).increment(count);
    }
}

/// Records how long one lock acquisition took.
pub fn record_lock_wait(wait: Duration) {
    metrics::histogram!("evently_lock_wait_seconds").record(wait.as_secs_f64());
}
