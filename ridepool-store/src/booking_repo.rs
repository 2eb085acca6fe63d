use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use ridepool_domain::{Booking, BookingStatus, LedgerRef};
use ridepool_engine::{BookingStore, StoreError, TransitionOutcome};

use crate::on_unique_violation;

pub struct PgBookingStore {
    pool: PgPool,
}

impl PgBookingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const BOOKING_COLUMNS: &str = "id, ledger_booking_id, ride_id, passenger_id, seats, status, \
     ledger_reference, created_at, updated_at";

fn booking_from_row(row: &PgRow) -> Result<Booking, StoreError> {
    let status: String = row.try_get("status").map_err(StoreError::backend)?;
    let status: BookingStatus = status.parse().map_err(StoreError::backend)?;
    let reference: String = row
        .try_get("ledger_reference")
        .map_err(StoreError::backend)?;
    let ledger_reference = LedgerRef::parse(&reference).map_err(StoreError::backend)?;

    Ok(Booking {
        id: row.try_get("id").map_err(StoreError::backend)?,
        ledger_booking_id: row
            .try_get("ledger_booking_id")
            .map_err(StoreError::backend)?,
        ride_id: row.try_get("ride_id").map_err(StoreError::backend)?,
        passenger_id: row.try_get("passenger_id").map_err(StoreError::backend)?,
        seats: row.try_get("seats").map_err(StoreError::backend)?,
        status,
        ledger_reference,
        created_at: row.try_get("created_at").map_err(StoreError::backend)?,
        updated_at: row.try_get("updated_at").map_err(StoreError::backend)?,
    })
}

#[async_trait]
impl BookingStore for PgBookingStore {
    async fn insert_booking(&self, booking: &Booking) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(StoreError::backend)?;

        // Claim the ledger reference in the same transaction as the row,
        // so the uniqueness guarantee and the booking are atomic.
        sqlx::query(
            "INSERT INTO ledger_references (reference, record_type, record_id) VALUES ($1, 'BOOKING', $2)",
        )
        .bind(booking.ledger_reference.as_str())
        .bind(booking.id)
        .execute(&mut *tx)
        .await
        .map_err(|err| on_unique_violation(err, StoreError::ReferenceClaimed))?;

        sqlx::query(
            r#"
            INSERT INTO bookings (id, ledger_booking_id, ride_id, passenger_id, seats, status,
                                  ledger_reference, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(booking.id)
        .bind(booking.ledger_booking_id)
        .bind(booking.ride_id)
        .bind(booking.passenger_id)
        .bind(booking.seats)
        .bind(booking.status.as_str())
        .bind(booking.ledger_reference.as_str())
        .bind(booking.created_at)
        .bind(booking.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|err| on_unique_violation(err, StoreError::DuplicateLedgerId))?;

        tx.commit().await.map_err(StoreError::backend)?;
        Ok(())
    }

    async fn get_booking(&self, id: Uuid) -> Result<Option<Booking>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::backend)?;
        row.as_ref().map(booking_from_row).transpose()
    }

    async fn list_bookings_for_passenger(
        &self,
        passenger_id: Uuid,
    ) -> Result<Vec<Booking>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE passenger_id = $1 ORDER BY created_at DESC"
        ))
        .bind(passenger_id)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::backend)?;
        rows.iter().map(booking_from_row).collect()
    }

    async fn cancel_booking(&self, booking_id: Uuid) -> Result<TransitionOutcome, StoreError> {
        let result = sqlx::query(
            "UPDATE bookings SET status = 'CANCELLED', updated_at = NOW() WHERE id = $1 AND status = 'CONFIRMED'",
        )
        .bind(booking_id)
        .execute(&self.pool)
        .await
        .map_err(StoreError::backend)?;

        if result.rows_affected() == 1 {
            return Ok(TransitionOutcome::Applied);
        }
        match self.get_booking(booking_id).await? {
            None => Ok(TransitionOutcome::NotFound),
            Some(_) => Ok(TransitionOutcome::AlreadyTerminal),
        }
    }

    async fn is_reference_used(&self, reference: &LedgerRef) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT EXISTS(SELECT 1 FROM ledger_references WHERE reference = $1) AS used")
            .bind(reference.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::backend)?;
        row.try_get("used").map_err(StoreError::backend)
    }
}
