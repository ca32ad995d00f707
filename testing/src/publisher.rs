//! Lifecycle publisher double that records every published event.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Lock poisoning aborts the test anyway

use async_trait::async_trait;
use evently_core::error::{BookingError, Result};
use evently_core::lifecycle::{LifecycleEvent, LifecyclePublisher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

/// Captures published lifecycle events for assertions.
///
/// Can be switched into a failing mode to prove publishes are
/// best-effort: operations must still commit when every publish errors.
#[derive(Clone, Default)]
pub struct RecordingPublisher {
    events: Arc<RwLock<Vec<LifecycleEvent>>>,
    failing: Arc<AtomicBool>,
}

impl RecordingPublisher {
    /// Creates a publisher that accepts everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent publish fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Returns every event published so far, in publish order.
    #[must_use]
    pub fn published(&self) -> Vec<LifecycleEvent> {
        self.events.read().unwrap().clone()
    }

    /// Returns the `new_status` sequence published so far.
    #[must_use]
    pub fn statuses(&self) -> Vec<String> {
        self.events
            .read()
            .unwrap()
            .iter()
            .map(|e| e.new_status.clone())
            .collect()
    }
}

#[async_trait]
impl LifecyclePublisher for RecordingPublisher {
    async fn publish(&self, event: &LifecycleEvent) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(BookingError::CollaboratorUnavailable {
                collaborator: "lifecycle publisher",
                reason: "injected failure".to_string(),
            });
        }
        self.events.write().unwrap().push(event.clone());
        Ok(())
    }
}
