//! Engine configuration.
//!
//! Loaded from environment variables with sensible defaults.

use crate::retry::RetryPolicy;
use std::env;
use std::time::Duration;

/// Tunables of the booking engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum units one booking request may ask for.
    pub max_quantity_per_request: u32,
    /// How long a pending booking holds its reservation.
    pub reservation_hold: chrono::Duration,
    /// How long a notified waitlist entry may claim its held units.
    pub notification_window: chrono::Duration,
    /// Interval between sweeper passes.
    pub sweep_interval: Duration,
    /// How long one lock acquisition may block before `LockContended`.
    pub lock_timeout: Duration,
    /// Lease after which a held lock auto-expires.
    pub lock_lease: Duration,
    /// Backoff policy for lock-contention retries.
    pub lock_retry: RetryPolicy,
    /// Attempts at generating a unique booking reference.
    pub reference_attempts: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_quantity_per_request: 10,
            reservation_hold: chrono::Duration::minutes(15),
            notification_window: chrono::Duration::minutes(30),
            sweep_interval: Duration::from_secs(60),
            lock_timeout: Duration::from_secs(10),
            lock_lease: Duration::from_secs(30),
            lock_retry: RetryPolicy::default(),
            reference_attempts: 3,
        }
    }
}

impl EngineConfig {
    /// Loads configuration from environment variables, falling back to
    /// the defaults above for anything unset or unparsable.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_quantity_per_request: env_u32("MAX_BOOKING_QUANTITY")
                .unwrap_or(defaults.max_quantity_per_request),
            reservation_hold: env_u32("BOOKING_HOLD_DURATION_MINUTES")
                .map_or(defaults.reservation_hold, |m| {
                    chrono::Duration::minutes(i64::from(m))
                }),
            notification_window: env_u32("WAITLIST_NOTIFICATION_EXPIRY_MINUTES")
                .map_or(defaults.notification_window, |m| {
                    chrono::Duration::minutes(i64::from(m))
                }),
            sweep_interval: env_u32("SWEEP_INTERVAL_SECONDS")
                .map_or(defaults.sweep_interval, |s| {
                    Duration::from_secs(u64::from(s))
                }),
            lock_timeout: env_u32("LOCK_TIMEOUT_SECONDS")
                .map_or(defaults.lock_timeout, |s| Duration::from_secs(u64::from(s))),
            lock_lease: env_u32("LOCK_LEASE_SECONDS")
                .map_or(defaults.lock_lease, |s| Duration::from_secs(u64::from(s))),
            lock_retry: RetryPolicy {
                max_retries: env_u32("MAX_RETRY_ATTEMPTS")
                    .map_or(defaults.lock_retry.max_retries, |n| n as usize),
                initial_delay: env_u32("RETRY_DELAY_MS")
                    .map_or(defaults.lock_retry.initial_delay, |ms| {
                        Duration::from_millis(u64::from(ms))
                    }),
                ..defaults.lock_retry
            },
            reference_attempts: defaults.reference_attempts,
        }
    }
}

fn env_u32(key: &str) -> Option<u32> {
    env::var(key).ok().and_then(|s| s.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = EngineConfig::default();
        assert_eq!(config.max_quantity_per_request, 10);
        assert_eq!(config.reservation_hold, chrono::Duration::minutes(15));
        assert_eq!(config.notification_window, chrono::Duration::minutes(30));
        assert_eq!(config.lock_retry.max_retries, 3);
    }
}
