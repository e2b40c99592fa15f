// ABOUTME: Booking database operations including the race-safe slot insert
// ABOUTME: Conflict check and insert share one conditional statement so one writer wins

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

use super::Database;
use crate::models::{Booking, BookingStatus, PaymentStatus};

const BOOKING_COLUMNS: &str = "id, customer_id, store_id, store_service_id, employee_id, \
     booking_date, start_time, end_time, total_price_minor, paid_minor, \
     payment_status, status, notes, created_at, updated_at";

impl Database {
    /// Create booking tables
    ///
    /// # Errors
    ///
    /// Returns an error if table or index creation fails
    pub(super) async fn migrate_bookings(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS bookings (
                id TEXT PRIMARY KEY,
                customer_id TEXT NOT NULL,
                store_id TEXT NOT NULL REFERENCES stores(id),
                store_service_id TEXT NOT NULL REFERENCES store_services(id),
                employee_id TEXT,
                booking_date DATE NOT NULL,
                start_time TIME NOT NULL,
                end_time TIME NOT NULL,
                total_price_minor INTEGER NOT NULL CHECK (total_price_minor >= 0),
                paid_minor INTEGER NOT NULL DEFAULT 0
                    CHECK (paid_minor >= 0 AND paid_minor <= total_price_minor),
                payment_status TEXT NOT NULL DEFAULT 'pending'
                    CHECK (payment_status IN ('pending', 'partial', 'full', 'refunded')),
                status TEXT NOT NULL DEFAULT 'pending'
                    CHECK (status IN ('pending', 'confirmed', 'completed', 'cancelled')),
                notes TEXT,
                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            ",
        )
        .execute(self.pool())
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_bookings_slot_lookup
             ON bookings(store_id, booking_date, status)",
        )
        .execute(self.pool())
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_bookings_customer ON bookings(customer_id)",
        )
        .execute(self.pool())
        .await?;

        Ok(())
    }

    /// Insert a booking unless a conflicting one exists
    ///
    /// Conflict checking and the insert are one conditional statement, so the
    /// overlap predicate is re-evaluated under the write lock: of N racing
    /// inserts for the same slot exactly one row lands. Conflicts are
    /// non-cancelled bookings at the same store and date whose half-open
    /// interval overlaps. Store-level rows (NULL `employee_id`) hold the whole
    /// store, so they conflict with every request; a request naming an
    /// employee otherwise contends only with that employee's bookings.
    ///
    /// Times encode as fixed-width `HH:MM:SS` text, so the range comparisons
    /// are lexicographic.
    ///
    /// Returns `false` when the slot was already taken.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails
    pub async fn try_insert_booking_tx(
        conn: &mut SqliteConnection,
        booking: &Booking,
    ) -> Result<bool> {
        let result = sqlx::query(
            r"
            INSERT INTO bookings
                (id, customer_id, store_id, store_service_id, employee_id,
                 booking_date, start_time, end_time, total_price_minor, paid_minor,
                 payment_status, status, notes, created_at, updated_at)
            SELECT $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15
            WHERE NOT EXISTS (
                SELECT 1 FROM bookings
                WHERE store_id = $3
                  AND booking_date = $6
                  AND status != 'cancelled'
                  AND ($5 IS NULL OR employee_id IS NULL OR employee_id = $5)
                  AND start_time < $8
                  AND end_time > $7
            )
            ",
        )
        .bind(booking.id.to_string())
        .bind(booking.customer_id.to_string())
        .bind(booking.store_id.to_string())
        .bind(booking.store_service_id.to_string())
        .bind(booking.employee_id.map(|id| id.to_string()))
        .bind(booking.booking_date)
        .bind(booking.start_time)
        .bind(booking.end_time)
        .bind(booking.total_price_minor)
        .bind(booking.paid_minor)
        .bind(booking.payment_status.as_str())
        .bind(booking.status.as_str())
        .bind(&booking.notes)
        .bind(booking.created_at)
        .bind(booking.updated_at)
        .execute(conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Get a booking by ID
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails
    pub async fn get_booking(&self, booking_id: Uuid) -> Result<Option<Booking>> {
        let row = sqlx::query(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1"
        ))
        .bind(booking_id.to_string())
        .fetch_optional(self.pool())
        .await?;

        row.as_ref().map(row_to_booking).transpose()
    }

    /// Get a booking by ID inside a transaction
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails
    pub async fn get_booking_tx(
        conn: &mut SqliteConnection,
        booking_id: Uuid,
    ) -> Result<Option<Booking>> {
        let row = sqlx::query(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1"
        ))
        .bind(booking_id.to_string())
        .fetch_optional(conn)
        .await?;

        row.as_ref().map(row_to_booking).transpose()
    }

    /// Update a booking's lifecycle status inside a transaction
    ///
    /// # Errors
    ///
    /// Returns an error if the database update fails
    pub async fn update_booking_status_tx(
        conn: &mut SqliteConnection,
        booking_id: Uuid,
        status: BookingStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<u64> {
        let result = sqlx::query("UPDATE bookings SET status = $2, updated_at = $3 WHERE id = $1")
            .bind(booking_id.to_string())
            .bind(status.as_str())
            .bind(updated_at)
            .execute(conn)
            .await?;

        Ok(result.rows_affected())
    }

    /// Update a booking's materialized payment state inside a transaction
    ///
    /// Callers recompute `paid_minor` from the ledger in the same transaction
    /// that appended the entry; this is the only writer of that column.
    ///
    /// # Errors
    ///
    /// Returns an error if the database update fails
    pub async fn update_booking_payment_tx(
        conn: &mut SqliteConnection,
        booking_id: Uuid,
        paid_minor: i64,
        payment_status: PaymentStatus,
        status: BookingStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r"
            UPDATE bookings
            SET paid_minor = $2, payment_status = $3, status = $4, updated_at = $5
            WHERE id = $1
            ",
        )
        .bind(booking_id.to_string())
        .bind(paid_minor)
        .bind(payment_status.as_str())
        .bind(status.as_str())
        .bind(updated_at)
        .execute(conn)
        .await?;

        Ok(())
    }

    /// Non-cancelled bookings of a store on one date, ordered by start time
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails
    pub async fn bookings_for_day(
        &self,
        store_id: Uuid,
        date: chrono::NaiveDate,
    ) -> Result<Vec<Booking>> {
        let rows = sqlx::query(&format!(
            r"
            SELECT {BOOKING_COLUMNS} FROM bookings
            WHERE store_id = $1 AND booking_date = $2 AND status != 'cancelled'
            ORDER BY start_time
            "
        ))
        .bind(store_id.to_string())
        .bind(date)
        .fetch_all(self.pool())
        .await?;

        rows.iter().map(row_to_booking).collect()
    }
}

fn row_to_booking(row: &sqlx::sqlite::SqliteRow) -> Result<Booking> {
    let id: String = row.get("id");
    let customer_id: String = row.get("customer_id");
    let store_id: String = row.get("store_id");
    let store_service_id: String = row.get("store_service_id");
    let employee_id: Option<String> = row.get("employee_id");
    let payment_status: String = row.get("payment_status");
    let status: String = row.get("status");

    Ok(Booking {
        id: Uuid::parse_str(&id)?,
        customer_id: Uuid::parse_str(&customer_id)?,
        store_id: Uuid::parse_str(&store_id)?,
        store_service_id: Uuid::parse_str(&store_service_id)?,
        employee_id: employee_id.map(|s| Uuid::parse_str(&s)).transpose()?,
        booking_date: row.get("booking_date"),
        start_time: row.get("start_time"),
        end_time: row.get("end_time"),
        total_price_minor: row.get("total_price_minor"),
        paid_minor: row.get("paid_minor"),
        payment_status: payment_status.parse()?,
        status: status.parse()?,
        notes: row.get("notes"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}
