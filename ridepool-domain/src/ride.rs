use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::LifecycleError;
use crate::ledger::LedgerRef;

/// Ride lifecycle. Closed and Completed are terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RideStatus {
    Open,
    Closed,
    Completed,
}

impl RideStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RideStatus::Open => "OPEN",
            RideStatus::Closed => "CLOSED",
            RideStatus::Completed => "COMPLETED",
        }
    }
}

impl std::str::FromStr for RideStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OPEN" => Ok(RideStatus::Open),
            "CLOSED" => Ok(RideStatus::Closed),
            "COMPLETED" => Ok(RideStatus::Completed),
            other => Err(format!("unknown ride status: {other}")),
        }
    }
}

/// A ride offered by a driver. Owns the authoritative `available_seats`
/// counter; only the seat inventory mutates it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ride {
    pub id: Uuid,
    /// Identifier of this ride on the external ledger. Immutable once set.
    pub ledger_ride_id: i64,
    pub driver_id: Uuid,
    pub origin: String,
    pub destination: String,
    pub departure_time: DateTime<Utc>,
    pub total_seats: i32,
    pub available_seats: i32,
    /// Price in minor units of the settlement currency.
    pub price_per_seat: i32,
    pub status: RideStatus,
    /// Ledger transaction that released the driver payment. Set exactly
    /// once, on completion.
    pub completion_reference: Option<LedgerRef>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Ride {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        driver_id: Uuid,
        ledger_ride_id: i64,
        origin: String,
        destination: String,
        departure_time: DateTime<Utc>,
        total_seats: i32,
        price_per_seat: i32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            ledger_ride_id,
            driver_id,
            origin,
            destination,
            departure_time,
            total_seats,
            available_seats: total_seats,
            price_per_seat,
            status: RideStatus::Open,
            completion_reference: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Transition: Open → Closed. Driver withdraws the ride; no seat or
    /// ledger effect.
    pub fn close(&mut self) -> Result<(), LifecycleError> {
        if self.status != RideStatus::Open {
            return Err(LifecycleError::AlreadyTerminal {
                from: self.status.as_str().to_string(),
                to: RideStatus::Closed.as_str().to_string(),
            });
        }
        self.status = RideStatus::Closed;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Transition: Open → Completed. Requires the departure time to have
    /// passed and a ledger reference for the payment release. Does not
    /// touch already-Confirmed bookings.
    pub fn complete(
        &mut self,
        reference: LedgerRef,
        now: DateTime<Utc>,
    ) -> Result<(), LifecycleError> {
        if self.status != RideStatus::Open {
            return Err(LifecycleError::AlreadyTerminal {
                from: self.status.as_str().to_string(),
                to: RideStatus::Completed.as_str().to_string(),
            });
        }
        if now < self.departure_time {
            return Err(LifecycleError::DepartureNotReached);
        }
        self.status = RideStatus::Completed;
        self.completion_reference = Some(reference);
        self.completed_at = Some(now);
        self.updated_at = now;
        Ok(())
    }
}
