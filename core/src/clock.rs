//! Clock abstraction so time-dependent logic stays testable.

use chrono::{DateTime, Utc};

/// Source of the current time.
///
/// Every deadline comparison in the engine goes through this trait;
/// tests substitute a fixed clock to make expiry deterministic.
pub trait Clock: Send + Sync {
    /// Returns the current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock backed by the system time.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
