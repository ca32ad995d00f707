//! Redis-backed lease lock, one key per event.
//!
//! Acquisition is `SET key token NX PX lease`: one holder per key, and
//! the lease expires the key on its own if the holder crashes, so a dead
//! process can never deadlock an event. Release and renew go through
//! small Lua scripts that compare the stored token first, so a holder
//! whose lease already ran out cannot release or extend a lock that has
//! since been granted to someone else.

use async_trait::async_trait;
use evently_core::error::{BookingError, Result};
use evently_core::lock::{EventLock, LockHandle, availability_lock_key};
use evently_core::types::EventId;
use redis::aio::ConnectionManager;
use redis::{Client, Script};
use std::time::{Duration, Instant};
use uuid::Uuid;

const ACQUIRE_POLL_INTERVAL: Duration = Duration::from_millis(100);

const RELEASE_SCRIPT: &str = r"
if redis.call('get', KEYS[1]) == ARGV[1] then
    return redis.call('del', KEYS[1])
else
    return 0
end
";

const RENEW_SCRIPT: &str = r"
if redis.call('get', KEYS[1]) == ARGV[1] then
    return redis.call('pexpire', KEYS[1], ARGV[2])
else
    return 0
end
";

/// Distributed lease lock on Redis.
#[derive(Clone)]
pub struct RedisEventLock {
    conn_manager: ConnectionManager,
}

impl RedisEventLock {
    /// Connects to Redis.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub async fn new(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)
            .map_err(|e| BookingError::Store(format!("failed to create Redis client: {e}")))?;
        let conn_manager = ConnectionManager::new(client).await.map_err(|e| {
            BookingError::Store(format!("failed to create Redis connection manager: {e}"))
        })?;
        Ok(Self { conn_manager })
    }

    async fn try_take(&self, key: &str, token: &str, lease: Duration) -> Result<bool> {
        let mut conn = self.conn_manager.clone();
        let granted: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(token)
            .arg("NX")
            .arg("PX")
            .arg(lease.as_millis() as u64)
            .query_async(&mut conn)
            .await
            .map_err(|e| BookingError::Store(format!("lock acquire failed: {e}")))?;
        Ok(granted.is_some())
    }
}

#[async_trait]
impl EventLock for RedisEventLock {
    async fn acquire(
        &self,
        event_id: EventId,
        timeout: Duration,
        lease: Duration,
    ) -> Result<LockHandle> {
        let key = availability_lock_key(event_id);
        let token = Uuid::new_v4().to_string();
        let deadline = Instant::now() + timeout;

        loop {
            if self.try_take(&key, &token, lease).await? {
                tracing::debug!(%key, "event lock acquired");
                return Ok(LockHandle { key, token });
            }
            if Instant::now() >= deadline {
                tracing::debug!(%key, ?timeout, "event lock stayed busy for the whole timeout");
                return Err(BookingError::LockContended { key });
            }
            tokio::time::sleep(ACQUIRE_POLL_INTERVAL).await;
        }
    }

    async fn renew(&self, handle: &LockHandle, lease: Duration) -> Result<()> {
        let mut conn = self.conn_manager.clone();
        let extended: i64 = Script::new(RENEW_SCRIPT)
            .key(&handle.key)
            .arg(&handle.token)
            .arg(lease.as_millis() as u64)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| BookingError::Store(format!("lock renew failed: {e}")))?;
        if extended == 1 {
            Ok(())
        } else {
            Err(BookingError::LockContended {
                key: handle.key.clone(),
            })
        }
    }

    async fn release(&self, handle: LockHandle) -> Result<()> {
        let mut conn = self.conn_manager.clone();
        let released: i64 = Script::new(RELEASE_SCRIPT)
            .key(&handle.key)
            .arg(&handle.token)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| BookingError::Store(format!("lock release failed: {e}")))?;
        if released == 1 {
            tracing::debug!(key = %handle.key, "event lock released");
        }
        // released == 0 means the lease already expired; nothing to do.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    // Note: These tests require a running Redis instance
    // Run with: docker run -d -p 6379:6379 redis:7-alpine

    const REDIS_URL: &str = "redis://127.0.0.1:6379";

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn lock_lifecycle() {
        let lock = RedisEventLock::new(REDIS_URL).await.unwrap();
        let event_id = EventId::new();

        let handle = lock
            .acquire(event_id, Duration::from_secs(1), Duration::from_secs(5))
            .await
            .unwrap();

        // A second contender times out while the lock is held.
        let contended = lock
            .acquire(event_id, Duration::from_millis(250), Duration::from_secs(5))
            .await;
        assert!(matches!(contended, Err(BookingError::LockContended { .. })));

        lock.renew(&handle, Duration::from_secs(5)).await.unwrap();
        lock.release(handle).await.unwrap();

        // Released: the next acquire succeeds immediately.
        let handle = lock
            .acquire(event_id, Duration::from_secs(1), Duration::from_secs(5))
            .await
            .unwrap();
        lock.release(handle).await.unwrap();
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn expired_lease_cannot_release_the_next_holder() {
        let lock = RedisEventLock::new(REDIS_URL).await.unwrap();
        let event_id = EventId::new();

        let stale = lock
            .acquire(event_id, Duration::from_secs(1), Duration::from_millis(100))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        // Lease ran out; a second holder takes over.
        let fresh = lock
            .acquire(event_id, Duration::from_secs(1), Duration::from_secs(5))
            .await
            .unwrap();

        // The stale handle can neither renew nor release the fresh lock.
        assert!(lock.renew(&stale, Duration::from_secs(5)).await.is_err());
        lock.release(stale).await.unwrap();
        let still_contended = lock
            .acquire(event_id, Duration::from_millis(250), Duration::from_secs(5))
            .await;
        assert!(matches!(
            still_contended,
            Err(BookingError::LockContended { .. })
        ));

        lock.release(fresh).await.unwrap();
    }
}
