//! Redis pub/sub lifecycle publisher.
//!
//! One JSON message per committed transition, published on
//! `evently:bookings:<transition>` channels. Fire-and-forget: there is
//! no delivery guarantee and no retry; the engine logs failed publishes
//! and drops them, and downstream consumers needing durability poll
//! state directly.

use async_trait::async_trait;
use evently_core::error::{BookingError, Result};
use evently_core::lifecycle::{LifecycleEntity, LifecycleEvent, LifecyclePublisher};
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use redis::Client;

/// Default channel prefix, shared with the other platform services.
pub const DEFAULT_CHANNEL_PREFIX: &str = "evently:bookings";

/// Publishes lifecycle events on Redis pub/sub channels.
#[derive(Clone)]
pub struct RedisLifecyclePublisher {
    conn_manager: ConnectionManager,
    channel_prefix: String,
}

impl RedisLifecyclePublisher {
    /// Connects to Redis with the default channel prefix.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub async fn new(redis_url: &str) -> Result<Self> {
        Self::with_prefix(redis_url, DEFAULT_CHANNEL_PREFIX).await
    }

    /// Connects to Redis with a custom channel prefix.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub async fn with_prefix(redis_url: &str, channel_prefix: &str) -> Result<Self> {
        let client = Client::open(redis_url)
            .map_err(|e| BookingError::Store(format!("failed to create Redis client: {e}")))?;
        let conn_manager = ConnectionManager::new(client).await.map_err(|e| {
            BookingError::Store(format!("failed to create Redis connection manager: {e}"))
        })?;
        Ok(Self {
            conn_manager,
            channel_prefix: channel_prefix.to_string(),
        })
    }

    /// Channel for one transition.
    #[must_use]
    pub fn channel_for(&self, event: &LifecycleEvent) -> String {
        format!("{}:{}", self.channel_prefix, channel_suffix(event))
    }
}

/// Channel suffix for one transition.
///
/// Booking creations land on `created`, later booking transitions on
/// their new status, and waitlist transitions on
/// `waitlist_<new_status>` (`waitlist_pending` for joins).
#[must_use]
pub fn channel_suffix(event: &LifecycleEvent) -> String {
    match (event.entity_type, event.old_status.as_deref()) {
        (LifecycleEntity::Booking, None) => "created".to_string(),
        (LifecycleEntity::Booking, Some(_)) => event.new_status.clone(),
        (LifecycleEntity::Waitlist, _) => format!("waitlist_{}", event.new_status),
    }
}

#[async_trait]
impl LifecyclePublisher for RedisLifecyclePublisher {
    async fn publish(&self, event: &LifecycleEvent) -> Result<()> {
        let channel = self.channel_for(event);
        let payload = serde_json::to_string(event)
            .map_err(|e| BookingError::Serialization(e.to_string()))?;

        let mut conn = self.conn_manager.clone();
        let receivers: i64 = conn
            .publish(&channel, payload)
            .await
            .map_err(|e| BookingError::CollaboratorUnavailable {
                collaborator: "lifecycle publisher",
                reason: e.to_string(),
            })?;

        tracing::debug!(
            %channel,
            receivers,
            entity = %event.entity_type,
            entity_id = %event.entity_id,
            new_status = %event.new_status,
            "lifecycle event published"
        );
        Ok(())
    }
}
