//! Catalog doubles.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Lock poisoning aborts the test anyway

use async_trait::async_trait;
use evently_core::catalog::{CatalogEventStatus, EventCapacityInfo, EventCatalog};
use evently_core::error::{BookingError, Result};
use evently_core::types::{EventId, Money};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Catalog backed by a fixed map of events.
#[derive(Clone, Default)]
pub struct StaticCatalog {
    events: Arc<RwLock<HashMap<EventId, EventCapacityInfo>>>,
}

impl StaticCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a published event and returns its id.
    #[must_use]
    pub fn publish(&self, total_capacity: u32, price: Money) -> EventId {
        let event_id = EventId::new();
        self.events.write().unwrap().insert(
            event_id,
            EventCapacityInfo {
                total_capacity,
                status: CatalogEventStatus::Published,
                price,
            },
        );
        event_id
    }

    /// Registers an event in an arbitrary status.
    pub fn insert(&self, event_id: EventId, info: EventCapacityInfo) {
        self.events.write().unwrap().insert(event_id, info);
    }
}

#[async_trait]
impl EventCatalog for StaticCatalog {
    async fn capacity_info(&self, event_id: EventId) -> Result<EventCapacityInfo> {
        self.events
            .read()
            .unwrap()
            .get(&event_id)
            .copied()
            .ok_or(BookingError::EventNotFound(event_id))
    }
}

/// Catalog that is always down, for fail-closed tests.
#[derive(Clone, Copy, Debug, Default)]
pub struct UnavailableCatalog;

#[async_trait]
impl EventCatalog for UnavailableCatalog {
    async fn capacity_info(&self, _event_id: EventId) -> Result<EventCapacityInfo> {
        Err(BookingError::CollaboratorUnavailable {
            collaborator: "catalog",
            reason: "connection refused".to_string(),
        })
    }
}
