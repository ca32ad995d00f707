//! PostgreSQL audit store.
//!
//! Append-only: this store exposes no update or delete path; compliance
//! tooling reads the table directly.

use crate::db_err;
use async_trait::async_trait;
use evently_core::audit::{AuditEntity, AuditRecord, AuditStore};
use evently_core::error::{BookingError, Result};
use evently_core::types::UserId;
use sqlx::{PgPool, Row};
use uuid::Uuid;

/// Audit rows in `audit_log`.
#[derive(Clone)]
pub struct PostgresAuditStore {
    pool: PgPool,
}

impl PostgresAuditStore {
    /// Creates a store over the given pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_record(row: &sqlx::postgres::PgRow) -> Result<AuditRecord> {
        Ok(AuditRecord {
            id: row.try_get("id").map_err(db_err)?,
            entity: parse_entity(&row.try_get::<String, _>("entity").map_err(db_err)?)?,
            entity_id: row.try_get("entity_id").map_err(db_err)?,
            action: row.try_get("action").map_err(db_err)?,
            field: row.try_get("field").map_err(db_err)?,
            old_value: row.try_get("old_value").map_err(db_err)?,
            new_value: row.try_get("new_value").map_err(db_err)?,
            changed_by: row
                .try_get::<Option<Uuid>, _>("changed_by")
                .map_err(db_err)?
                .map(UserId::from_uuid),
            reason: row.try_get("reason").map_err(db_err)?,
            occurred_at: row.try_get("occurred_at").map_err(db_err)?,
        })
    }
}

#[async_trait]
impl AuditStore for PostgresAuditStore {
    async fn append(&self, record: &AuditRecord) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO audit_log (
                id, entity, entity_id, action, field, old_value, new_value,
                changed_by, reason, occurred_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ",
        )
        .bind(record.id)
        .bind(record.entity.to_string())
        .bind(record.entity_id)
        .bind(&record.action)
        .bind(&record.field)
        .bind(&record.old_value)
        .bind(&record.new_value)
        .bind(record.changed_by.map(|id| *id.as_uuid()))
        .bind(&record.reason)
        .bind(record.occurred_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn for_entity(&self, entity: AuditEntity, entity_id: Uuid) -> Result<Vec<AuditRecord>> {
        let rows = sqlx::query(
            r"
            SELECT * FROM audit_log
            WHERE entity = $1 AND entity_id = $2
            ORDER BY occurred_at ASC
            ",
        )
        .bind(entity.to_string())
        .bind(entity_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(Self::row_to_record).collect()
    }
}

fn parse_entity(value: &str) -> Result<AuditEntity> {
    match value {
        "booking" => Ok(AuditEntity::Booking),
        "availability" => Ok(AuditEntity::Availability),
        "waitlist" => Ok(AuditEntity::Waitlist),
        other => Err(BookingError::Store(format!(
            "unknown audit entity in store: {other}"
        ))),
    }
}
