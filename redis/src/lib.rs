//! # Evently Redis
//!
//! Redis-backed implementations of the engine's coordination seams:
//!
//! - [`RedisEventLock`]: the distributed mutual-exclusion lock
//!   serializing ledger mutations per event across process instances.
//!   `SET NX PX` acquisition with a per-holder token, lease-based
//!   auto-expiry, token-checked release and renew.
//! - [`RedisLifecyclePublisher`]: best-effort pub/sub fan-out of
//!   lifecycle transitions to the notification and analytics
//!   collaborators.

#![forbid(unsafe_code)]

pub mod lock;
pub mod publisher;

pub use lock::RedisEventLock;
pub use publisher::{DEFAULT_CHANNEL_PREFIX, RedisLifecyclePublisher, channel_suffix};
