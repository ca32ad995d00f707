//! Read-only collaborator: the event catalog.
//!
//! The catalog owns event metadata (capacity ceiling, publication status,
//! price). This engine consumes it by reference to lazily materialize
//! availability ledgers and to reject bookings on non-published events.
//! Catalog failures fail the booking path closed.

use crate::error::Result;
use crate::types::{EventId, Money};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Publication status of a catalog event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CatalogEventStatus {
    /// Not yet open for booking.
    Draft,
    /// Open for booking.
    Published,
    /// Withdrawn by the organizer.
    Cancelled,
    /// The event already took place.
    Completed,
}

impl CatalogEventStatus {
    /// Stable lowercase name for logs and error messages.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Published => "published",
            Self::Cancelled => "cancelled",
            Self::Completed => "completed",
        }
    }
}

/// Capacity metadata for one event, as the catalog reports it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventCapacityInfo {
    /// Capacity ceiling.
    pub total_capacity: u32,
    /// Publication status.
    pub status: CatalogEventStatus,
    /// Price per unit.
    pub price: Money,
}

/// The event catalog collaborator.
#[async_trait]
pub trait EventCatalog: Send + Sync {
    /// Fetches capacity metadata for one event.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::BookingError::EventNotFound`] for unknown
    /// events and
    /// [`crate::error::BookingError::CollaboratorUnavailable`] when the
    /// catalog cannot be reached.
    async fn capacity_info(&self, event_id: EventId) -> Result<EventCapacityInfo>;
}
