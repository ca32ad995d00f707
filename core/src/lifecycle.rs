//! Lifecycle event publishing for downstream collaborators.
//!
//! One message per committed transition, consumed independently by the
//! notification and analytics collaborators. Delivery is best-effort and
//! never transactional with the state change: a failed publish is logged
//! and dropped, so consumers needing durability must poll state directly.

use crate::error::Result;
use crate::types::EventId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Entity kind a lifecycle event describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleEntity {
    /// A booking transitioned.
    Booking,
    /// A waitlist entry transitioned.
    Waitlist,
}

impl fmt::Display for LifecycleEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Booking => "booking",
            Self::Waitlist => "waitlist",
        };
        f.write_str(name)
    }
}

/// One committed state transition, as seen by downstream consumers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    /// Entity kind.
    pub entity_type: LifecycleEntity,
    /// Identifier of the transitioned row.
    pub entity_id: Uuid,
    /// Event the entity belongs to.
    pub event_id: EventId,
    /// Status before the transition; `None` for creation.
    pub old_status: Option<String>,
    /// Status after the transition.
    pub new_status: String,
    /// Row version after the transition.
    pub version: i64,
    /// Instant the transition committed.
    pub occurred_at: DateTime<Utc>,
}

impl LifecycleEvent {
    /// Builds a lifecycle event for a transition.
    #[must_use]
    pub fn new(
        entity_type: LifecycleEntity,
        entity_id: Uuid,
        event_id: EventId,
        old_status: Option<&str>,
        new_status: &str,
        version: i64,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            entity_type,
            entity_id,
            event_id,
            old_status: old_status.map(str::to_string),
            new_status: new_status.to_string(),
            version,
            occurred_at,
        }
    }
}

/// Best-effort publisher of lifecycle events.
#[async_trait]
pub trait LifecyclePublisher: Send + Sync {
    /// Publishes one lifecycle event.
    ///
    /// Callers treat failures as non-fatal: the error is logged and the
    /// triggering transaction is never rolled back.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport rejects the message.
    async fn publish(&self, event: &LifecycleEvent) -> Result<()>;
}
