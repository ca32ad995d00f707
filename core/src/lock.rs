//! Distributed mutual-exclusion lock, one key per event.
//!
//! The lock serializes the read-modify-write of one event's availability
//! ledger across process instances. It is lease-based: the lock
//! auto-expires after the lease even if the holder crashes, so a dead
//! holder can never deadlock an event permanently. A holder running long
//! must [`EventLock::renew`] before the lease runs out or risk a second
//! holder interleaving.
//!
//! The lock guards ledger mutation only; it is never used to serialize
//! unrelated reads. Booking and waitlist rows rely on their own
//! optimistic versions instead.

use crate::error::Result;
use crate::types::EventId;
use async_trait::async_trait;
use std::time::Duration;

/// Proof of lock ownership.
///
/// The token is compared on release and renew so a holder whose lease
/// already expired cannot release a lock that has since been granted to
/// someone else.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LockHandle {
    /// The lock key, derived from the event id.
    pub key: String,
    /// Per-acquisition fencing token.
    pub token: String,
}

/// Lease-based distributed lock keyed by event.
#[async_trait]
pub trait EventLock: Send + Sync {
    /// Acquires the event's lock, blocking up to `timeout`.
    ///
    /// The returned handle is valid for `lease`; after that the lock may
    /// be granted to another caller regardless of release.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::BookingError::LockContended`] if the lock
    /// stayed busy for the whole timeout, or an error if the backend
    /// fails.
    async fn acquire(
        &self,
        event_id: EventId,
        timeout: Duration,
        lease: Duration,
    ) -> Result<LockHandle>;

    /// Extends the lease of a held lock.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::BookingError::LockContended`] if the
    /// handle no longer owns the lock (lease expired and someone else
    /// took it), or an error if the backend fails.
    async fn renew(&self, handle: &LockHandle, lease: Duration) -> Result<()>;

    /// Releases a held lock.
    ///
    /// Releasing an already-expired handle is a no-op: the lease has
    /// done the cleanup.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    async fn release(&self, handle: LockHandle) -> Result<()>;
}

/// Lock key for an event's availability ledger.
#[must_use]
pub fn availability_lock_key(event_id: EventId) -> String {
    format!("availability:event:{event_id}")
}
