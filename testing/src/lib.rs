//! # Evently Testing
//!
//! In-memory doubles for every trait seam of the booking engine:
//!
//! - [`stores`]: HashMap-backed stores with real compare-and-swap
//!   version semantics
//! - [`lock::MemoryEventLock`]: lease lock with `SET NX PX`-equivalent
//!   behavior
//! - [`catalog::StaticCatalog`] / [`catalog::UnavailableCatalog`]:
//!   catalog doubles
//! - [`publisher::RecordingPublisher`]: captures lifecycle events,
//!   optionally failing to prove best-effort publishing
//! - [`clock::FixedClock`]: steppable time for deadline tests
//!
//! Unit, property, and concurrency tests compose a full engine from
//! these doubles; the contracts match the Postgres and Redis
//! implementations, so what passes here holds there modulo I/O faults.

#![forbid(unsafe_code)]

pub mod catalog;
pub mod clock;
pub mod lock;
pub mod publisher;
pub mod stores;

pub use catalog::{StaticCatalog, UnavailableCatalog};
pub use clock::FixedClock;
pub use lock::MemoryEventLock;
pub use publisher::RecordingPublisher;
pub use stores::{
    MemoryAuditStore, MemoryAvailabilityStore, MemoryBookingStore, MemoryWaitlistStore,
};
