use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use ridepool_domain::{LedgerRef, Ride, RideStatus};
use ridepool_engine::{
    ReleaseOutcome, ReserveOutcome, RideFilter, RideStore, StoreError, TransitionOutcome,
};

use crate::on_unique_violation;

pub struct PgRideStore {
    pool: PgPool,
}

impl PgRideStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const RIDE_COLUMNS: &str = "id, ledger_ride_id, driver_id, origin, destination, departure_time, \
     total_seats, available_seats, price_per_seat, status, completion_reference, completed_at, \
     created_at, updated_at";

fn ride_from_row(row: &PgRow) -> Result<Ride, StoreError> {
    let status: String = row.try_get("status").map_err(StoreError::backend)?;
    let status: RideStatus = status.parse().map_err(StoreError::backend)?;
    let completion_reference: Option<String> = row
        .try_get("completion_reference")
        .map_err(StoreError::backend)?;
    let completion_reference = completion_reference
        .as_deref()
        .map(LedgerRef::parse)
        .transpose()
        .map_err(StoreError::backend)?;

    Ok(Ride {
        id: row.try_get("id").map_err(StoreError::backend)?,
        ledger_ride_id: row.try_get("ledger_ride_id").map_err(StoreError::backend)?,
        driver_id: row.try_get("driver_id").map_err(StoreError::backend)?,
        origin: row.try_get("origin").map_err(StoreError::backend)?,
        destination: row.try_get("destination").map_err(StoreError::backend)?,
        departure_time: row.try_get("departure_time").map_err(StoreError::backend)?,
        total_seats: row.try_get("total_seats").map_err(StoreError::backend)?,
        available_seats: row.try_get("available_seats").map_err(StoreError::backend)?,
        price_per_seat: row.try_get("price_per_seat").map_err(StoreError::backend)?,
        status,
        completion_reference,
        completed_at: row.try_get("completed_at").map_err(StoreError::backend)?,
        created_at: row.try_get("created_at").map_err(StoreError::backend)?,
        updated_at: row.try_get("updated_at").map_err(StoreError::backend)?,
    })
}

#[async_trait]
impl RideStore for PgRideStore {
    async fn insert_ride(&self, ride: &Ride) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO rides (id, ledger_ride_id, driver_id, origin, destination, departure_time,
                               total_seats, available_seats, price_per_seat, status,
                               created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(ride.id)
        .bind(ride.ledger_ride_id)
        .bind(ride.driver_id)
        .bind(&ride.origin)
        .bind(&ride.destination)
        .bind(ride.departure_time)
        .bind(ride.total_seats)
        .bind(ride.available_seats)
        .bind(ride.price_per_seat)
        .bind(ride.status.as_str())
        .bind(ride.created_at)
        .bind(ride.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|err| on_unique_violation(err, StoreError::DuplicateLedgerId))?;
        Ok(())
    }

    async fn get_ride(&self, id: Uuid) -> Result<Option<Ride>, StoreError> {
        let row = sqlx::query(&format!("SELECT {RIDE_COLUMNS} FROM rides WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::backend)?;
        row.as_ref().map(ride_from_row).transpose()
    }

    async fn list_open_rides(&self) -> Result<Vec<Ride>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {RIDE_COLUMNS} FROM rides WHERE status = 'OPEN' ORDER BY departure_time"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::backend)?;
        rows.iter().map(ride_from_row).collect()
    }

    async fn search_rides(&self, filter: &RideFilter) -> Result<Vec<Ride>, StoreError> {
        // ILIKE substring matching, mirroring the case-insensitive search
        // the listing UI expects. NULL parameters disable their clause.
        let day_start = filter
            .departure_date
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|naive| naive.and_utc());
        let day_end = day_start.map(|start| start + chrono::Duration::days(1));

        let rows = sqlx::query(&format!(
            r#"
            SELECT {RIDE_COLUMNS} FROM rides
            WHERE status = 'OPEN'
              AND ($1::text IS NULL OR origin ILIKE '%' || $1 || '%')
              AND ($2::text IS NULL OR destination ILIKE '%' || $2 || '%')
              AND ($3::timestamptz IS NULL OR (departure_time >= $3 AND departure_time < $4))
            ORDER BY departure_time
            "#
        ))
        .bind(filter.origin.as_deref())
        .bind(filter.destination.as_deref())
        .bind(day_start)
        .bind(day_end)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::backend)?;
        rows.iter().map(ride_from_row).collect()
    }

    async fn try_reserve_seats(
        &self,
        ride_id: Uuid,
        seats: i32,
    ) -> Result<ReserveOutcome, StoreError> {
        // Single conditional update: the WHERE predicate and the decrement
        // are atomic, so concurrent callers serialize on the row and can
        // never both spend the same seats.
        let row = sqlx::query(
            r#"
            UPDATE rides
            SET available_seats = available_seats - $2, updated_at = NOW()
            WHERE id = $1 AND status = 'OPEN' AND available_seats >= $2
            RETURNING available_seats
            "#,
        )
        .bind(ride_id)
        .bind(seats)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::backend)?;

        if let Some(row) = row {
            let available: i32 = row.try_get("available_seats").map_err(StoreError::backend)?;
            return Ok(ReserveOutcome::Reserved { available });
        }

        // The predicate failed; classify why.
        match self.get_ride(ride_id).await? {
            None => Ok(ReserveOutcome::NotFound),
            Some(ride) if ride.status != RideStatus::Open => Ok(ReserveOutcome::NotOpen),
            Some(ride) => Ok(ReserveOutcome::Insufficient {
                available: ride.available_seats,
            }),
        }
    }

    async fn release_seats(
        &self,
        ride_id: Uuid,
        seats: i32,
    ) -> Result<ReleaseOutcome, StoreError> {
        // Row lock so the clamp decision and the write are one atomic step
        // with respect to concurrent reserves on the same ride.
        let mut tx = self.pool.begin().await.map_err(StoreError::backend)?;

        let row = sqlx::query(
            "SELECT available_seats, total_seats FROM rides WHERE id = $1 FOR UPDATE",
        )
        .bind(ride_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(StoreError::backend)?;

        let Some(row) = row else {
            return Ok(ReleaseOutcome::NotFound);
        };
        let available: i32 = row.try_get("available_seats").map_err(StoreError::backend)?;
        let total: i32 = row.try_get("total_seats").map_err(StoreError::backend)?;

        let clamped = available + seats > total;
        let next = (available + seats).min(total);

        sqlx::query("UPDATE rides SET available_seats = $2, updated_at = NOW() WHERE id = $1")
            .bind(ride_id)
            .bind(next)
            .execute(&mut *tx)
            .await
            .map_err(StoreError::backend)?;
        tx.commit().await.map_err(StoreError::backend)?;

        if clamped {
            Ok(ReleaseOutcome::Clamped {
                available: next,
                total,
            })
        } else {
            Ok(ReleaseOutcome::Released { available: next })
        }
    }

    async fn close_ride(&self, ride_id: Uuid) -> Result<TransitionOutcome, StoreError> {
        let result = sqlx::query(
            "UPDATE rides SET status = 'CLOSED', updated_at = NOW() WHERE id = $1 AND status = 'OPEN'",
        )
        .bind(ride_id)
        .execute(&self.pool)
        .await
        .map_err(StoreError::backend)?;

        if result.rows_affected() == 1 {
            return Ok(TransitionOutcome::Applied);
        }
        match self.get_ride(ride_id).await? {
            None => Ok(TransitionOutcome::NotFound),
            Some(_) => Ok(TransitionOutcome::AlreadyTerminal),
        }
    }

    async fn complete_ride(
        &self,
        ride_id: Uuid,
        reference: &LedgerRef,
        completed_at: DateTime<Utc>,
    ) -> Result<TransitionOutcome, StoreError> {
        let mut tx = self.pool.begin().await.map_err(StoreError::backend)?;

        // Claim the reference first; the primary key is the uniqueness
        // authority across every off-chain record type.
        sqlx::query(
            "INSERT INTO ledger_references (reference, record_type, record_id) VALUES ($1, 'RIDE_COMPLETION', $2)",
        )
        .bind(reference.as_str())
        .bind(ride_id)
        .execute(&mut *tx)
        .await
        .map_err(|err| on_unique_violation(err, StoreError::ReferenceClaimed))?;

        let result = sqlx::query(
            r#"
            UPDATE rides
            SET status = 'COMPLETED', completion_reference = $2, completed_at = $3, updated_at = NOW()
            WHERE id = $1 AND status = 'OPEN'
            "#,
        )
        .bind(ride_id)
        .bind(reference.as_str())
        .bind(completed_at)
        .execute(&mut *tx)
        .await
        .map_err(StoreError::backend)?;

        if result.rows_affected() == 1 {
            tx.commit().await.map_err(StoreError::backend)?;
            return Ok(TransitionOutcome::Applied);
        }

        // Dropping the transaction rolls the reference claim back.
        drop(tx);
        match self.get_ride(ride_id).await? {
            None => Ok(TransitionOutcome::NotFound),
            Some(_) => Ok(TransitionOutcome::AlreadyTerminal),
        }
    }
}
