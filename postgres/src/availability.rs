//! PostgreSQL availability ledger store.

use crate::{db_cents, db_count, db_err, parse_cents, parse_count, version_conflict_or};
use async_trait::async_trait;
use evently_core::error::{BookingError, Result};
use evently_core::ledger::EventAvailability;
use evently_core::store::{AvailabilityStats, AvailabilityStore};
use evently_core::types::EventId;
use sqlx::{PgPool, Row};

/// Availability ledger rows in `event_availability`.
///
/// Updates are compare-and-swap on the version column; the ledger sum
/// invariant is additionally enforced by a table CHECK constraint, so a
/// corrupted write can never commit.
#[derive(Clone)]
pub struct PostgresAvailabilityStore {
    pool: PgPool,
}

impl PostgresAvailabilityStore {
    /// Creates a store over the given pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_availability(row: &sqlx::postgres::PgRow) -> Result<EventAvailability> {
        Ok(EventAvailability {
            event_id: EventId::from_uuid(row.try_get("event_id").map_err(db_err)?),
            total_capacity: parse_count(row.try_get("total_capacity").map_err(db_err)?)?,
            available_capacity: parse_count(row.try_get("available_capacity").map_err(db_err)?)?,
            reserved_capacity: parse_count(row.try_get("reserved_capacity").map_err(db_err)?)?,
            confirmed_capacity: parse_count(row.try_get("confirmed_capacity").map_err(db_err)?)?,
            price: parse_cents(row.try_get("price_cents").map_err(db_err)?)?,
            version: row.try_get("version").map_err(db_err)?,
            last_updated: row.try_get("last_updated").map_err(db_err)?,
        })
    }
}

#[async_trait]
impl AvailabilityStore for PostgresAvailabilityStore {
    async fn get(&self, event_id: EventId) -> Result<Option<EventAvailability>> {
        let row = sqlx::query(
            r"
            SELECT event_id, total_capacity, available_capacity, reserved_capacity,
                   confirmed_capacity, price_cents, version, last_updated
            FROM event_availability
            WHERE event_id = $1
            ",
        )
        .bind(event_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.as_ref().map(Self::row_to_availability).transpose()
    }

    async fn insert(&self, availability: &EventAvailability) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO event_availability (
                event_id, total_capacity, available_capacity, reserved_capacity,
                confirmed_capacity, price_cents, version, last_updated
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ",
        )
        .bind(availability.event_id.as_uuid())
        .bind(db_count(availability.total_capacity)?)
        .bind(db_count(availability.available_capacity)?)
        .bind(db_count(availability.reserved_capacity)?)
        .bind(db_count(availability.confirmed_capacity)?)
        .bind(db_cents(availability.price)?)
        .bind(availability.version)
        .bind(availability.last_updated)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn update(&self, availability: &EventAvailability, expected_version: i64) -> Result<()> {
        let result = sqlx::query(
            r"
            UPDATE event_availability
            SET total_capacity = $1, available_capacity = $2, reserved_capacity = $3,
                confirmed_capacity = $4, price_cents = $5, version = $6, last_updated = $7
            WHERE event_id = $8 AND version = $9
            ",
        )
        .bind(db_count(availability.total_capacity)?)
        .bind(db_count(availability.available_capacity)?)
        .bind(db_count(availability.reserved_capacity)?)
        .bind(db_count(availability.confirmed_capacity)?)
        .bind(db_cents(availability.price)?)
        .bind(availability.version)
        .bind(availability.last_updated)
        .bind(availability.event_id.as_uuid())
        .bind(expected_version)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            let actual = self.get(availability.event_id).await?.map(|a| a.version);
            return Err(version_conflict_or(
                actual,
                expected_version,
                BookingError::EventNotFound(availability.event_id),
            ));
        }
        Ok(())
    }

    async fn stats(&self) -> Result<AvailabilityStats> {
        let row = sqlx::query(
            r"
            SELECT
                COUNT(*) AS total_events,
                COUNT(*) FILTER (WHERE available_capacity > 0) AS available_events,
                COUNT(*) FILTER (WHERE available_capacity = 0) AS sold_out_events,
                COALESCE(SUM(total_capacity), 0)::BIGINT AS total_capacity,
                COALESCE(SUM(available_capacity), 0)::BIGINT AS total_available,
                COALESCE(SUM(reserved_capacity), 0)::BIGINT AS total_reserved,
                COALESCE(SUM(confirmed_capacity), 0)::BIGINT AS total_confirmed
            FROM event_availability
            ",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        let aggregate = |name: &str| -> Result<u64> {
            let value: i64 = row.try_get(name).map_err(db_err)?;
            u64::try_from(value)
                .map_err(|e| BookingError::Store(format!("negative aggregate {name}: {e}")))
        };
        Ok(AvailabilityStats {
            total_events: aggregate("total_events")?,
            available_events: aggregate("available_events")?,
            sold_out_events: aggregate("sold_out_events")?,
            total_capacity: aggregate("total_capacity")?,
            total_available: aggregate("total_available")?,
            total_reserved: aggregate("total_reserved")?,
            total_confirmed: aggregate("total_confirmed")?,
        })
    }
}
