//! In-process lease lock with the same semantics as the Redis lock.
//!
//! `SET NX PX`-equivalent behavior: one holder per key, leases expire on
//! their own, release and renew are token-checked. Concurrency tests run
//! against this double to prove lock-ordering properties without Redis.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Lock poisoning aborts the test anyway

use async_trait::async_trait;
use evently_core::error::{BookingError, Result};
use evently_core::lock::{EventLock, LockHandle, availability_lock_key};
use evently_core::types::EventId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use uuid::Uuid;

const ACQUIRE_POLL_INTERVAL: Duration = Duration::from_millis(5);

struct HeldLock {
    token: String,
    expires_at: Instant,
}

/// In-memory lease-based lock keyed by event.
#[derive(Clone, Default)]
pub struct MemoryEventLock {
    held: Arc<Mutex<HashMap<String, HeldLock>>>,
}

impl MemoryEventLock {
    /// Creates an unlocked instance.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the key is currently held by an unexpired lease.
    #[must_use]
    pub fn is_held(&self, event_id: EventId) -> bool {
        let key = availability_lock_key(event_id);
        let held = self.held.lock().unwrap();
        held.get(&key).is_some_and(|l| l.expires_at > Instant::now())
    }

    fn try_take(&self, key: &str, lease: Duration) -> Option<LockHandle> {
        let mut held = self.held.lock().unwrap();
        let now = Instant::now();
        let free = match held.get(key) {
            Some(existing) => existing.expires_at <= now,
            None => true,
        };
        if !free {
            return None;
        }
        let token = Uuid::new_v4().to_string();
        held.insert(
            key.to_string(),
            HeldLock {
                token: token.clone(),
                expires_at: now + lease,
            },
        );
        Some(LockHandle {
            key: key.to_string(),
            token,
        })
    }
}

#[async_trait]
impl EventLock for MemoryEventLock {
    async fn acquire(
        &self,
        event_id: EventId,
        timeout: Duration,
        lease: Duration,
    ) -> Result<LockHandle> {
        let key = availability_lock_key(event_id);
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(handle) = self.try_take(&key, lease) {
                return Ok(handle);
            }
            if Instant::now() >= deadline {
                return Err(BookingError::LockContended { key });
            }
            tokio::time::sleep(ACQUIRE_POLL_INTERVAL).await;
        }
    }

    async fn renew(&self, handle: &LockHandle, lease: Duration) -> Result<()> {
        let mut held = self.held.lock().unwrap();
        match held.get_mut(&handle.key) {
            Some(current) if current.token == handle.token => {
                current.expires_at = Instant::now() + lease;
                Ok(())
            }
            _ => Err(BookingError::LockContended {
                key: handle.key.clone(),
            }),
        }
    }

    async fn release(&self, handle: LockHandle) -> Result<()> {
        let mut held = self.held.lock().unwrap();
        if held
            .get(&handle.key)
            .is_some_and(|current| current.token == handle.token)
        {
            held.remove(&handle.key);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_acquire_waits_for_release() {
        let lock = MemoryEventLock::new();
        let event_id = EventId::new();
        let lease = Duration::from_secs(5);

        let handle = lock
            .acquire(event_id, Duration::from_millis(50), lease)
            .await
            .unwrap();
        let contended = lock
            .acquire(event_id, Duration::from_millis(20), lease)
            .await;
        assert!(matches!(
            contended,
            Err(BookingError::LockContended { .. })
        ));

        lock.release(handle).await.unwrap();
        lock.acquire(event_id, Duration::from_millis(50), lease)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn expired_lease_is_reclaimable() {
        let lock = MemoryEventLock::new();
        let event_id = EventId::new();

        let stale = lock
            .acquire(event_id, Duration::from_millis(10), Duration::from_millis(10))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Lease ran out: a new holder gets in and the stale release is a no-op.
        let fresh = lock
            .acquire(event_id, Duration::from_millis(50), Duration::from_secs(5))
            .await
            .unwrap();
        assert!(lock.renew(&stale, Duration::from_secs(1)).await.is_err());
        lock.release(stale).await.unwrap();
        assert!(lock.is_held(event_id));
        lock.release(fresh).await.unwrap();
        assert!(!lock.is_held(event_id));
    }
}
