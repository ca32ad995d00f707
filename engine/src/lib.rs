//! # Evently Engine
//!
//! The availability & booking concurrency engine: tracks per-event
//! capacity, arbitrates concurrent reservation attempts, advances
//! bookings through their lifecycle, and promotes waitlisted requests
//! when capacity frees up.
//!
//! # Guarantees
//!
//! - For every event, `available + reserved + confirmed ==
//!   total_capacity` at all times; the sum of units held by pending and
//!   confirmed bookings never exceeds the ceiling, no matter how many
//!   workers race.
//! - All ledger mutations for one event are totally ordered by a
//!   lease-based distributed lock; mutations to different events are
//!   independent.
//! - Booking and waitlist rows carry optimistic versions: callers supply
//!   the version they last read and treat a conflict as a request to
//!   re-read and retry.
//!
//! # Composition
//!
//! The engine is generic over its collaborators via `Arc<dyn ...>`
//! seams defined in `evently-core`. Wire it with the Postgres stores and
//! the Redis lock in production, or with the in-memory doubles from
//! `evently-testing`:
//!
//! ```ignore
//! let engine = Arc::new(BookingEngine::new(
//!     availability, bookings, waitlist, audit,
//!     lock, catalog, publisher, clock,
//!     EngineConfig::from_env(),
//! ));
//! let (sweeper_task, shutdown) = Sweeper::new(Arc::clone(&engine)).spawn();
//! ```

#![forbid(unsafe_code)]

mod booking;
mod engine;
mod waitlist;

pub mod config;
pub mod metrics;
pub mod retry;
pub mod sweeper;

pub use config::EngineConfig;
pub use engine::BookingEngine;
pub use retry::RetryPolicy;
pub use sweeper::{SweepReport, Sweeper};
