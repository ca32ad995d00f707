//! Error taxonomy for the booking engine.

use crate::types::{BookingId, EventId, WaitlistEntryId};
use thiserror::Error;

/// Result type alias for booking engine operations.
pub type Result<T> = std::result::Result<T, BookingError>;

/// All failure modes of the booking engine, organized by how the caller
/// should react to each.
///
/// Business conditions (`InsufficientCapacity`), optimistic-concurrency
/// collisions (`VersionConflict`), and transient contention
/// (`LockContended`) are not faults: the first routes to a waitlist
/// offer, the other two to a retry with a fresh read. Everything the
/// caller must act on is a distinct variant; callers never receive a
/// generic failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BookingError {
    // ═══════════════════════════════════════════════════════════
    // Business conditions
    // ═══════════════════════════════════════════════════════════
    /// The event does not have enough available capacity for the request.
    ///
    /// Not a fault: the caller should offer the user a waitlist join.
    #[error("insufficient capacity for event {event_id}: requested {requested}, available {available}")]
    InsufficientCapacity {
        /// Event that was out of capacity.
        event_id: EventId,
        /// Units requested.
        requested: u32,
        /// Units actually available at the time of the attempt.
        available: u32,
    },

    /// Requested quantity is zero or above the per-request cap.
    #[error("invalid quantity {quantity}: must be between 1 and {max}")]
    InvalidQuantity {
        /// Quantity the caller asked for.
        quantity: u32,
        /// Configured per-request maximum.
        max: u32,
    },

    // ═══════════════════════════════════════════════════════════
    // Concurrency collisions (retry with a fresh read)
    // ═══════════════════════════════════════════════════════════
    /// The row was mutated by someone else since the caller's read.
    #[error("version conflict: expected {expected}, found {actual}")]
    VersionConflict {
        /// Version the caller supplied.
        expected: i64,
        /// Version actually on the row.
        actual: i64,
    },

    /// The event lock could not be acquired within the timeout.
    ///
    /// Retried internally with backoff; surfaced only once the bounded
    /// attempts are exhausted.
    #[error("lock contended: {key}")]
    LockContended {
        /// The lock key that stayed busy.
        key: String,
    },

    // ═══════════════════════════════════════════════════════════
    // Lookup and state errors
    // ═══════════════════════════════════════════════════════════
    /// No such booking.
    #[error("booking {0} not found")]
    BookingNotFound(BookingId),

    /// No such waitlist entry.
    #[error("waitlist entry {0} not found")]
    WaitlistEntryNotFound(WaitlistEntryId),

    /// No such event in the catalog or no availability ledger for it.
    #[error("event {0} not found")]
    EventNotFound(EventId),

    /// The action is not allowed from the entity's current state.
    #[error("cannot {action} from state {from}")]
    InvalidTransition {
        /// Current state of the entity.
        from: String,
        /// Action that was attempted.
        action: &'static str,
    },

    /// The generated booking reference already exists.
    ///
    /// The engine regenerates and retries a bounded number of times
    /// before surfacing this.
    #[error("booking reference already exists: {0}")]
    DuplicateReference(String),

    // ═══════════════════════════════════════════════════════════
    // Collaborator and infrastructure faults
    // ═══════════════════════════════════════════════════════════
    /// A required external collaborator call failed.
    ///
    /// Catalog lookups fail the booking path closed; notification
    /// publishes are best-effort and never surface this to callers.
    #[error("{collaborator} unavailable: {reason}")]
    CollaboratorUnavailable {
        /// Which collaborator failed.
        collaborator: &'static str,
        /// Underlying failure description.
        reason: String,
    },

    /// A storage backend operation failed.
    #[error("store error: {0}")]
    Store(String),

    /// Payload could not be serialized or deserialized.
    #[error("serialization error: {0}")]
    Serialization(String),

    // ═══════════════════════════════════════════════════════════
    // Fatal
    // ═══════════════════════════════════════════════════════════
    /// The availability counters no longer sum to the total capacity.
    ///
    /// Fatal for the event: the corrupted row is left untouched so every
    /// subsequent mutation attempt re-detects the breach and fails, which
    /// halts further mutation of that event until operators intervene.
    #[error("availability ledger corrupted for event {event_id}")]
    LedgerCorrupted {
        /// Event whose counters are inconsistent.
        event_id: EventId,
    },
}

impl BookingError {
    /// Whether retrying the operation with a fresh read can succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::VersionConflict { .. } | Self::LockContended { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(
            BookingError::VersionConflict {
                expected: 1,
                actual: 2
            }
            .is_retryable()
        );
        assert!(
            BookingError::LockContended {
                key: "availability:event:x".to_string()
            }
            .is_retryable()
        );
        assert!(!BookingError::Store("down".to_string()).is_retryable());
        assert!(
            !BookingError::LedgerCorrupted {
                event_id: EventId::new()
            }
            .is_retryable()
        );
    }
}
