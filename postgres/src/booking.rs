//! PostgreSQL booking store.

use crate::{db_cents, db_count, db_err, parse_cents, parse_count, version_conflict_or};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use evently_core::booking::Booking;
use evently_core::error::{BookingError, Result};
use evently_core::store::BookingStore;
use evently_core::types::{
    BookingId, BookingReference, BookingStatus, EventId, PaymentStatus, UserId,
};
use sqlx::{PgPool, Row};

/// Booking rows in `bookings`.
///
/// The booking reference carries a UNIQUE constraint; an insert that
/// trips it surfaces as [`BookingError::DuplicateReference`] so the
/// engine can regenerate. Updates are compare-and-swap on the version
/// column.
#[derive(Clone)]
pub struct PostgresBookingStore {
    pool: PgPool,
}

impl PostgresBookingStore {
    /// Creates a store over the given pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_booking(row: &sqlx::postgres::PgRow) -> Result<Booking> {
        Ok(Booking {
            id: BookingId::from_uuid(row.try_get("id").map_err(db_err)?),
            user_id: UserId::from_uuid(row.try_get("user_id").map_err(db_err)?),
            event_id: EventId::from_uuid(row.try_get("event_id").map_err(db_err)?),
            booking_reference: BookingReference::from_string(
                row.try_get("booking_reference").map_err(db_err)?,
            ),
            quantity: parse_count(row.try_get("quantity").map_err(db_err)?)?,
            total_amount: parse_cents(row.try_get("total_amount_cents").map_err(db_err)?)?,
            currency: row.try_get("currency").map_err(db_err)?,
            status: parse_booking_status(&row.try_get::<String, _>("status").map_err(db_err)?)?,
            payment_status: parse_payment_status(
                &row.try_get::<String, _>("payment_status").map_err(db_err)?,
            )?,
            expires_at: row.try_get("expires_at").map_err(db_err)?,
            confirmed_at: row.try_get("confirmed_at").map_err(db_err)?,
            cancelled_at: row.try_get("cancelled_at").map_err(db_err)?,
            created_at: row.try_get("created_at").map_err(db_err)?,
            updated_at: row.try_get("updated_at").map_err(db_err)?,
            version: row.try_get("version").map_err(db_err)?,
        })
    }
}

#[async_trait]
impl BookingStore for PostgresBookingStore {
    async fn insert(&self, booking: &Booking) -> Result<()> {
        let result = sqlx::query(
            r"
            INSERT INTO bookings (
                id, user_id, event_id, booking_reference, quantity,
                total_amount_cents, currency, status, payment_status,
                expires_at, confirmed_at, cancelled_at, created_at, updated_at, version
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            ",
        )
        .bind(booking.id.as_uuid())
        .bind(booking.user_id.as_uuid())
        .bind(booking.event_id.as_uuid())
        .bind(booking.booking_reference.as_str())
        .bind(db_count(booking.quantity)?)
        .bind(db_cents(booking.total_amount)?)
        .bind(&booking.currency)
        .bind(booking.status.as_str())
        .bind(booking.payment_status.as_str())
        .bind(booking.expires_at)
        .bind(booking.confirmed_at)
        .bind(booking.cancelled_at)
        .bind(booking.created_at)
        .bind(booking.updated_at)
        .bind(booking.version)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(error))
                if error.constraint() == Some("bookings_reference_unique") =>
            {
                Err(BookingError::DuplicateReference(
                    booking.booking_reference.as_str().to_string(),
                ))
            }
            Err(error) => Err(db_err(error)),
        }
    }

    async fn get(&self, id: BookingId) -> Result<Option<Booking>> {
        let row = sqlx::query("SELECT * FROM bookings WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.as_ref().map(Self::row_to_booking).transpose()
    }

    async fn update(&self, booking: &Booking, expected_version: i64) -> Result<()> {
        let result = sqlx::query(
            r"
            UPDATE bookings
            SET status = $1, payment_status = $2, expires_at = $3, confirmed_at = $4,
                cancelled_at = $5, updated_at = $6, version = $7
            WHERE id = $8 AND version = $9
            ",
        )
        .bind(booking.status.as_str())
        .bind(booking.payment_status.as_str())
        .bind(booking.expires_at)
        .bind(booking.confirmed_at)
        .bind(booking.cancelled_at)
        .bind(booking.updated_at)
        .bind(booking.version)
        .bind(booking.id.as_uuid())
        .bind(expected_version)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            let actual = self.get(booking.id).await?.map(|b| b.version);
            return Err(version_conflict_or(
                actual,
                expected_version,
                BookingError::BookingNotFound(booking.id),
            ));
        }
        Ok(())
    }

    async fn for_user(
        &self,
        user_id: UserId,
        page: u32,
        page_size: u32,
    ) -> Result<(Vec<Booking>, u64)> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM bookings WHERE user_id = $1")
            .bind(user_id.as_uuid())
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;

        let offset = i64::from(page.saturating_sub(1)) * i64::from(page_size);
        let rows = sqlx::query(
            r"
            SELECT * FROM bookings
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            ",
        )
        .bind(user_id.as_uuid())
        .bind(i64::from(page_size))
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let bookings = rows
            .iter()
            .map(Self::row_to_booking)
            .collect::<Result<Vec<_>>>()?;
        let total = u64::try_from(total)
            .map_err(|e| BookingError::Store(format!("negative booking count: {e}")))?;
        Ok((bookings, total))
    }

    async fn expired_pending(&self, now: DateTime<Utc>) -> Result<Vec<Booking>> {
        let rows = sqlx::query(
            r"
            SELECT * FROM bookings
            WHERE status = 'pending' AND expires_at < $1
            ORDER BY expires_at ASC
            ",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(Self::row_to_booking).collect()
    }

    async fn confirmed_for_event(&self, event_id: EventId) -> Result<Vec<Booking>> {
        let rows = sqlx::query(
            r"
            SELECT * FROM bookings
            WHERE event_id = $1 AND status = 'confirmed'
            ORDER BY created_at ASC
            ",
        )
        .bind(event_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(Self::row_to_booking).collect()
    }
}

pub(crate) fn parse_booking_status(value: &str) -> Result<BookingStatus> {
    match value {
        "pending" => Ok(BookingStatus::Pending),
        "confirmed" => Ok(BookingStatus::Confirmed),
        "cancelled" => Ok(BookingStatus::Cancelled),
        "expired" => Ok(BookingStatus::Expired),
        "refunded" => Ok(BookingStatus::Refunded),
        "completed" => Ok(BookingStatus::Completed),
        other => Err(BookingError::Store(format!(
            "unknown booking status in store: {other}"
        ))),
    }
}

pub(crate) fn parse_payment_status(value: &str) -> Result<PaymentStatus> {
    match value {
        "pending" => Ok(PaymentStatus::Pending),
        "processing" => Ok(PaymentStatus::Processing),
        "completed" => Ok(PaymentStatus::Completed),
        "failed" => Ok(PaymentStatus::Failed),
        "refunded" => Ok(PaymentStatus::Refunded),
        other => Err(BookingError::Store(format!(
            "unknown payment status in store: {other}"
        ))),
    }
}
