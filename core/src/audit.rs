//! Append-only audit trail of every state transition.
//!
//! Audit rows are write-once: this engine never mutates or deletes them.
//! External compliance tooling reads them by entity and timestamp.

use crate::error::Result;
use crate::types::UserId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Which entity an audit record describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditEntity {
    /// A booking row.
    Booking,
    /// An availability ledger row.
    Availability,
    /// A waitlist entry row.
    Waitlist,
}

impl fmt::Display for AuditEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Booking => "booking",
            Self::Availability => "availability",
            Self::Waitlist => "waitlist",
        };
        f.write_str(name)
    }
}

/// One committed state transition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Unique identifier of the record itself.
    pub id: Uuid,
    /// Entity kind this record describes.
    pub entity: AuditEntity,
    /// Identifier of the mutated row.
    pub entity_id: Uuid,
    /// Action name, e.g. `CREATE`, `CONFIRM`, `CANCEL`, `EXPIRE`, `NOTIFY`.
    pub action: String,
    /// Field that changed, when the action targets one field.
    pub field: Option<String>,
    /// Value before the transition.
    pub old_value: Option<String>,
    /// Value after the transition.
    pub new_value: Option<String>,
    /// User who triggered the change; `None` for system actions.
    pub changed_by: Option<UserId>,
    /// Free-form reason supplied by the caller.
    pub reason: Option<String>,
    /// Instant the transition committed.
    pub occurred_at: DateTime<Utc>,
}

impl AuditRecord {
    /// Builds a record for a status transition on `entity_id`.
    #[must_use]
    pub fn status_change(
        entity: AuditEntity,
        entity_id: Uuid,
        action: &str,
        old_status: Option<&str>,
        new_status: &str,
        changed_by: Option<UserId>,
        reason: Option<String>,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            entity,
            entity_id,
            action: action.to_string(),
            field: Some("status".to_string()),
            old_value: old_status.map(str::to_string),
            new_value: Some(new_status.to_string()),
            changed_by,
            reason,
            occurred_at,
        }
    }
}

/// Append-only audit storage.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Appends one record.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend write fails.
    async fn append(&self, record: &AuditRecord) -> Result<()>;

    /// Returns every record for one entity, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend read fails.
    async fn for_entity(&self, entity: AuditEntity, entity_id: Uuid) -> Result<Vec<AuditRecord>>;
}
