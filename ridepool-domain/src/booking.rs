use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::LifecycleError;
use crate::ledger::LedgerRef;

/// Booking lifecycle. A booking is only ever persisted Confirmed; the
/// requested phase is transient inside the coordinator. Cancelled is
/// terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Confirmed,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Confirmed => "CONFIRMED",
            BookingStatus::Cancelled => "CANCELLED",
        }
    }
}

impl std::str::FromStr for BookingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CONFIRMED" => Ok(BookingStatus::Confirmed),
            "CANCELLED" => Ok(BookingStatus::Cancelled),
            other => Err(format!("unknown booking status: {other}")),
        }
    }
}

/// Seats held by a passenger on a ride, correlated to the ledger payment
/// that funded them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    /// Identifier of this booking on the external ledger. Immutable.
    pub ledger_booking_id: i64,
    pub ride_id: Uuid,
    pub passenger_id: Uuid,
    pub seats: i32,
    pub status: BookingStatus,
    pub ledger_reference: LedgerRef,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    pub fn new(
        ledger_booking_id: i64,
        ride_id: Uuid,
        passenger_id: Uuid,
        seats: i32,
        ledger_reference: LedgerRef,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            ledger_booking_id,
            ride_id,
            passenger_id,
            seats,
            status: BookingStatus::Confirmed,
            ledger_reference,
            created_at: now,
            updated_at: now,
        }
    }

    /// Transition: Confirmed → Cancelled. There is no way back.
    pub fn cancel(&mut self) -> Result<(), LifecycleError> {
        if self.status != BookingStatus::Confirmed {
            return Err(LifecycleError::AlreadyTerminal {
                from: self.status.as_str().to_string(),
                to: BookingStatus::Cancelled.as_str().to_string(),
            });
        }
        self.status = BookingStatus::Cancelled;
        self.updated_at = Utc::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn booking() -> Booking {
        Booking::new(
            7,
            Uuid::new_v4(),
            Uuid::new_v4(),
            2,
            LedgerRef::parse(&format!("0x{}", "cd".repeat(32))).unwrap(),
        )
    }

    #[test]
    fn test_new_booking_is_confirmed() {
        assert_eq!(booking().status, BookingStatus::Confirmed);
    }

    #[test]
    fn test_cancel_is_terminal() {
        let mut booking = booking();
        booking.cancel().unwrap();
        assert_eq!(booking.status, BookingStatus::Cancelled);

        let result = booking.cancel();
        assert!(matches!(result, Err(LifecycleError::AlreadyTerminal { .. })));
        assert_eq!(booking.status, BookingStatus::Cancelled);
    }
}
