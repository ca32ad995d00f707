//! The availability ledger: per-event capacity counters.
//!
//! One [`EventAvailability`] row exists per event and is the single
//! source of truth for "is there room". All mutation helpers are pure:
//! they take the current snapshot, validate the arithmetic, and return
//! the next snapshot with the version bumped. The caller persists the
//! result with a compare-and-swap on the old version, inside the event's
//! distributed lock, so no intermediate state is ever observable.

use crate::error::{BookingError, Result};
use crate::types::{CapacityKind, EventId, Money};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-event capacity counters with an optimistic version.
///
/// Invariant: `available + reserved + confirmed == total` and every
/// counter is non-negative. A snapshot violating this is corrupted and
/// refuses all further arithmetic.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventAvailability {
    /// Catalog event these counters belong to.
    pub event_id: EventId,
    /// Capacity ceiling from the catalog.
    pub total_capacity: u32,
    /// Units free to reserve.
    pub available_capacity: u32,
    /// Units held by pending bookings and notified waitlist entries.
    pub reserved_capacity: u32,
    /// Units consumed by confirmed bookings.
    pub confirmed_capacity: u32,
    /// Price per unit, copied from the catalog at materialization.
    pub price: Money,
    /// Incremented on every mutation; compare-and-swap key.
    pub version: i64,
    /// Instant of the last mutation.
    pub last_updated: DateTime<Utc>,
}

impl EventAvailability {
    /// Materializes a fresh ledger row from catalog capacity.
    #[must_use]
    pub const fn materialize(
        event_id: EventId,
        total_capacity: u32,
        price: Money,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id,
            total_capacity,
            available_capacity: total_capacity,
            reserved_capacity: 0,
            confirmed_capacity: 0,
            price,
            version: 1,
            last_updated: now,
        }
    }

    /// Checks the ledger invariant.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::LedgerCorrupted`] if the counters no
    /// longer sum to the total capacity.
    pub fn verify(&self) -> Result<()> {
        let sum = u64::from(self.available_capacity)
            + u64::from(self.reserved_capacity)
            + u64::from(self.confirmed_capacity);
        if sum == u64::from(self.total_capacity) {
            Ok(())
        } else {
            Err(BookingError::LedgerCorrupted {
                event_id: self.event_id,
            })
        }
    }

    /// Debits `quantity` units from available into reserved.
    ///
    /// Never partially grants: either the full quantity fits or the call
    /// fails.
    ///
    /// # Errors
    ///
    /// [`BookingError::InsufficientCapacity`] if fewer than `quantity`
    /// units are available; [`BookingError::LedgerCorrupted`] if the
    /// snapshot is already inconsistent.
    pub fn try_reserve(&self, quantity: u32, now: DateTime<Utc>) -> Result<Self> {
        self.verify()?;
        if self.available_capacity < quantity {
            return Err(BookingError::InsufficientCapacity {
                event_id: self.event_id,
                requested: quantity,
                available: self.available_capacity,
            });
        }
        Ok(Self {
            available_capacity: self.available_capacity - quantity,
            reserved_capacity: self.reserved_capacity + quantity,
            version: self.version + 1,
            last_updated: now,
            ..self.clone()
        })
    }

    /// Transfers `quantity` units from reserved into confirmed.
    ///
    /// This is not a fresh reservation and cannot fail for capacity
    /// reasons, only for "no such reservation".
    ///
    /// # Errors
    ///
    /// [`BookingError::InvalidTransition`] if fewer than `quantity` units
    /// are currently reserved; [`BookingError::LedgerCorrupted`] if the
    /// snapshot is already inconsistent.
    pub fn confirm_reserved(&self, quantity: u32, now: DateTime<Utc>) -> Result<Self> {
        self.verify()?;
        if self.reserved_capacity < quantity {
            return Err(BookingError::InvalidTransition {
                from: format!("reserved={}", self.reserved_capacity),
                action: "confirm reservation",
            });
        }
        Ok(Self {
            reserved_capacity: self.reserved_capacity - quantity,
            confirmed_capacity: self.confirmed_capacity + quantity,
            version: self.version + 1,
            last_updated: now,
            ..self.clone()
        })
    }

    /// Credits `quantity` units from `kind` back into available.
    ///
    /// # Errors
    ///
    /// [`BookingError::InvalidTransition`] if the source bucket holds
    /// fewer than `quantity` units; [`BookingError::LedgerCorrupted`] if
    /// the snapshot is already inconsistent.
    pub fn release(&self, quantity: u32, kind: CapacityKind, now: DateTime<Utc>) -> Result<Self> {
        self.verify()?;
        let mut next = self.clone();
        match kind {
            CapacityKind::Reserved => {
                if self.reserved_capacity < quantity {
                    return Err(BookingError::InvalidTransition {
                        from: format!("reserved={}", self.reserved_capacity),
                        action: "release reserved capacity",
                    });
                }
                next.reserved_capacity -= quantity;
            }
            CapacityKind::Confirmed => {
                if self.confirmed_capacity < quantity {
                    return Err(BookingError::InvalidTransition {
                        from: format!("confirmed={}", self.confirmed_capacity),
                        action: "release confirmed capacity",
                    });
                }
                next.confirmed_capacity -= quantity;
            }
        }
        next.available_capacity += quantity;
        next.version += 1;
        next.last_updated = now;
        Ok(next)
    }

    /// Resizes the capacity ceiling, recomputing available units.
    ///
    /// # Errors
    ///
    /// [`BookingError::InvalidTransition`] if the new total is smaller
    /// than the units already reserved or confirmed (shrinking must not
    /// strand held units); [`BookingError::LedgerCorrupted`] if the
    /// snapshot is already inconsistent.
    pub fn resize(&self, new_total: u32, now: DateTime<Utc>) -> Result<Self> {
        self.verify()?;
        let in_use = self.reserved_capacity + self.confirmed_capacity;
        if new_total < in_use {
            return Err(BookingError::InvalidTransition {
                from: format!("in_use={in_use}"),
                action: "shrink capacity below held units",
            });
        }
        Ok(Self {
            total_capacity: new_total,
            available_capacity: new_total - in_use,
            version: self.version + 1,
            last_updated: now,
            ..self.clone()
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn ledger(total: u32) -> EventAvailability {
        EventAvailability::materialize(EventId::new(), total, Money::from_cents(5000), Utc::now())
    }

    #[test]
    fn reserve_then_confirm_then_release_preserves_invariant() {
        let now = Utc::now();
        let l0 = ledger(10);
        let l1 = l0.try_reserve(4, now).unwrap();
        assert_eq!((l1.available_capacity, l1.reserved_capacity), (6, 4));
        let l2 = l1.confirm_reserved(4, now).unwrap();
        assert_eq!((l2.reserved_capacity, l2.confirmed_capacity), (0, 4));
        let l3 = l2.release(4, CapacityKind::Confirmed, now).unwrap();
        assert_eq!(l3.available_capacity, 10);
        for l in [&l1, &l2, &l3] {
            l.verify().unwrap();
        }
        assert_eq!(l3.version, 4);
    }

    #[test]
    fn reserve_never_partially_grants() {
        let l = ledger(3);
        let err = l.try_reserve(5, Utc::now()).unwrap_err();
        assert!(matches!(
            err,
            BookingError::InsufficientCapacity {
                requested: 5,
                available: 3,
                ..
            }
        ));
        // Untouched on failure.
        assert_eq!(l.available_capacity, 3);
        assert_eq!(l.version, 1);
    }

    #[test]
    fn confirm_more_than_reserved_is_rejected() {
        let now = Utc::now();
        let l = ledger(10).try_reserve(2, now).unwrap();
        assert!(matches!(
            l.confirm_reserved(3, now),
            Err(BookingError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn corrupted_ledger_refuses_arithmetic() {
        let mut l = ledger(10);
        l.available_capacity = 9; // sum no longer matches total
        assert!(matches!(
            l.try_reserve(1, Utc::now()),
            Err(BookingError::LedgerCorrupted { .. })
        ));
        assert!(matches!(
            l.release(1, CapacityKind::Reserved, Utc::now()),
            Err(BookingError::LedgerCorrupted { .. })
        ));
    }

    #[test]
    fn resize_rejects_stranding_held_units() {
        let now = Utc::now();
        let l = ledger(10).try_reserve(6, now).unwrap();
        assert!(matches!(
            l.resize(5, now),
            Err(BookingError::InvalidTransition { .. })
        ));
        let grown = l.resize(20, now).unwrap();
        assert_eq!(grown.available_capacity, 14);
        grown.verify().unwrap();
    }
}
