//! PostgreSQL waitlist store.

use crate::{db_count, db_err, parse_count, version_conflict_or};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use evently_core::error::{BookingError, Result};
use evently_core::store::WaitlistStore;
use evently_core::types::{BookingId, EventId, UserId, WaitlistEntryId, WaitlistStatus};
use evently_core::waitlist::WaitlistEntry;
use sqlx::{PgPool, Row};
use uuid::Uuid;

/// Waitlist rows in `waitlist_entries`, ordered by
/// `(priority, joined_at)`.
///
/// A partial unique index keeps at most one active entry per
/// (user, event); updates are compare-and-swap on the version column.
#[derive(Clone)]
pub struct PostgresWaitlistStore {
    pool: PgPool,
}

impl PostgresWaitlistStore {
    /// Creates a store over the given pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_entry(row: &sqlx::postgres::PgRow) -> Result<WaitlistEntry> {
        Ok(WaitlistEntry {
            id: WaitlistEntryId::from_uuid(row.try_get("id").map_err(db_err)?),
            user_id: UserId::from_uuid(row.try_get("user_id").map_err(db_err)?),
            event_id: EventId::from_uuid(row.try_get("event_id").map_err(db_err)?),
            quantity: parse_count(row.try_get("quantity").map_err(db_err)?)?,
            priority: row.try_get("priority").map_err(db_err)?,
            status: parse_waitlist_status(&row.try_get::<String, _>("status").map_err(db_err)?)?,
            joined_at: row.try_get("joined_at").map_err(db_err)?,
            notified_at: row.try_get("notified_at").map_err(db_err)?,
            expires_at: row.try_get("expires_at").map_err(db_err)?,
            booked_at: row.try_get("booked_at").map_err(db_err)?,
            cancelled_at: row.try_get("cancelled_at").map_err(db_err)?,
            booking_id: row
                .try_get::<Option<Uuid>, _>("booking_id")
                .map_err(db_err)?
                .map(BookingId::from_uuid),
            updated_at: row.try_get("updated_at").map_err(db_err)?,
            version: row.try_get("version").map_err(db_err)?,
        })
    }
}

#[async_trait]
impl WaitlistStore for PostgresWaitlistStore {
    async fn insert(&self, entry: &WaitlistEntry) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO waitlist_entries (
                id, user_id, event_id, quantity, priority, status, joined_at,
                notified_at, expires_at, booked_at, cancelled_at, booking_id,
                updated_at, version
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ",
        )
        .bind(entry.id.as_uuid())
        .bind(entry.user_id.as_uuid())
        .bind(entry.event_id.as_uuid())
        .bind(db_count(entry.quantity)?)
        .bind(entry.priority)
        .bind(entry.status.as_str())
        .bind(entry.joined_at)
        .bind(entry.notified_at)
        .bind(entry.expires_at)
        .bind(entry.booked_at)
        .bind(entry.cancelled_at)
        .bind(entry.booking_id.map(|id| *id.as_uuid()))
        .bind(entry.updated_at)
        .bind(entry.version)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn get(&self, id: WaitlistEntryId) -> Result<Option<WaitlistEntry>> {
        let row = sqlx::query("SELECT * FROM waitlist_entries WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.as_ref().map(Self::row_to_entry).transpose()
    }

    async fn update(&self, entry: &WaitlistEntry, expected_version: i64) -> Result<()> {
        let result = sqlx::query(
            r"
            UPDATE waitlist_entries
            SET status = $1, notified_at = $2, expires_at = $3, booked_at = $4,
                cancelled_at = $5, booking_id = $6, updated_at = $7, version = $8
            WHERE id = $9 AND version = $10
            ",
        )
        .bind(entry.status.as_str())
        .bind(entry.notified_at)
        .bind(entry.expires_at)
        .bind(entry.booked_at)
        .bind(entry.cancelled_at)
        .bind(entry.booking_id.map(|id| *id.as_uuid()))
        .bind(entry.updated_at)
        .bind(entry.version)
        .bind(entry.id.as_uuid())
        .bind(expected_version)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            let actual = self.get(entry.id).await?.map(|e| e.version);
            return Err(version_conflict_or(
                actual,
                expected_version,
                BookingError::WaitlistEntryNotFound(entry.id),
            ));
        }
        Ok(())
    }

    async fn active_for_user(
        &self,
        user_id: UserId,
        event_id: EventId,
    ) -> Result<Option<WaitlistEntry>> {
        let row = sqlx::query(
            r"
            SELECT * FROM waitlist_entries
            WHERE user_id = $1 AND event_id = $2 AND status IN ('pending', 'notified')
            ",
        )
        .bind(user_id.as_uuid())
        .bind(event_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.as_ref().map(Self::row_to_entry).transpose()
    }

    async fn pending_for_event(&self, event_id: EventId) -> Result<Vec<WaitlistEntry>> {
        let rows = sqlx::query(
            r"
            SELECT * FROM waitlist_entries
            WHERE event_id = $1 AND status = 'pending'
            ORDER BY priority ASC, joined_at ASC
            ",
        )
        .bind(event_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(Self::row_to_entry).collect()
    }

    async fn active_for_event(&self, event_id: EventId) -> Result<Vec<WaitlistEntry>> {
        let rows = sqlx::query(
            r"
            SELECT * FROM waitlist_entries
            WHERE event_id = $1 AND status IN ('pending', 'notified')
            ORDER BY priority ASC, joined_at ASC
            ",
        )
        .bind(event_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(Self::row_to_entry).collect()
    }

    async fn expired_notifications(&self, now: DateTime<Utc>) -> Result<Vec<WaitlistEntry>> {
        let rows = sqlx::query(
            r"
            SELECT * FROM waitlist_entries
            WHERE status = 'notified' AND expires_at < $1
            ORDER BY priority ASC, joined_at ASC
            ",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(Self::row_to_entry).collect()
    }
}

pub(crate) fn parse_waitlist_status(value: &str) -> Result<WaitlistStatus> {
    match value {
        "pending" => Ok(WaitlistStatus::Pending),
        "notified" => Ok(WaitlistStatus::Notified),
        "booked" => Ok(WaitlistStatus::Booked),
        "expired" => Ok(WaitlistStatus::Expired),
        "cancelled" => Ok(WaitlistStatus::Cancelled),
        other => Err(BookingError::Store(format!(
            "unknown waitlist status in store: {other}"
        ))),
    }
}
