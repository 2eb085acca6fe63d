use std::sync::Arc;

use tracing::error;
use uuid::Uuid;

use crate::store::{ReleaseOutcome, ReserveOutcome, RideStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum InventoryError {
    #[error("ride not found")]
    NotFound,

    #[error("not enough seats available: requested {requested}, available {available}")]
    InsufficientSeats { requested: i32, available: i32 },

    #[error("ride is no longer open for booking")]
    NotOpen,

    /// A release overshot capacity. The store keeps the clamped value; the
    /// off-chain counter has drifted from the bookings that fund it.
    #[error("seat release on ride {ride_id} overshot capacity, clamped to {total}")]
    InvariantViolation { ride_id: Uuid, total: i32 },

    #[error("seat count must be at least 1, got {0}")]
    InvalidSeatCount(i32),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Per-ride seat accounting. Every mutation goes through the store's
/// conditional-update primitives, so concurrent callers serialize on the
/// ride's counter and lost updates cannot occur.
pub struct SeatInventory {
    rides: Arc<dyn RideStore>,
}

impl SeatInventory {
    pub fn new(rides: Arc<dyn RideStore>) -> Self {
        Self { rides }
    }

    /// Debit `seats` from the ride, or fail with no mutation at all.
    pub async fn reserve(&self, ride_id: Uuid, seats: i32) -> Result<i32, InventoryError> {
        if seats < 1 {
            return Err(InventoryError::InvalidSeatCount(seats));
        }
        match self.rides.try_reserve_seats(ride_id, seats).await? {
            ReserveOutcome::Reserved { available } => Ok(available),
            ReserveOutcome::Insufficient { available } => Err(InventoryError::InsufficientSeats {
                requested: seats,
                available,
            }),
            ReserveOutcome::NotOpen => Err(InventoryError::NotOpen),
            ReserveOutcome::NotFound => Err(InventoryError::NotFound),
        }
    }

    /// Credit `seats` back to the ride. A clamp means bookkeeping drifted:
    /// the clamped value stands and the fault is surfaced for manual
    /// reconciliation, never panicked on.
    pub async fn release(&self, ride_id: Uuid, seats: i32) -> Result<i32, InventoryError> {
        if seats < 1 {
            return Err(InventoryError::InvalidSeatCount(seats));
        }
        match self.rides.release_seats(ride_id, seats).await? {
            ReleaseOutcome::Released { available } => Ok(available),
            ReleaseOutcome::Clamped { total, .. } => {
                error!(
                    %ride_id,
                    total,
                    "seat release clamped: off-chain inventory drifted from ledger, reconciliation needed"
                );
                Err(InventoryError::InvariantViolation { ride_id, total })
            }
            ReleaseOutcome::NotFound => Err(InventoryError::NotFound),
        }
    }
}
