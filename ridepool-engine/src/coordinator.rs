use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

use ridepool_domain::{Booking, LifecycleError, ReferenceRole, Ride};

use crate::inventory::{InventoryError, SeatInventory};
use crate::store::{BookingStore, RideStore, StoreError, TransitionOutcome};
use crate::validator::{LedgerService, ReferenceValidator, ValidationError};

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("caller is not the {0} of this record")]
    Forbidden(&'static str),

    #[error("not enough seats available: requested {requested}, available {available}")]
    InsufficientSeats { requested: i32, available: i32 },

    #[error("invalid ledger reference: {0:?}")]
    InvalidReference(String),

    #[error("ledger reference already correlates to another record")]
    ReferenceAlreadyUsed,

    /// Inventory overshoot detected and clamped. Indicates off-chain/ledger
    /// drift; logged for operational follow-up wherever it is raised.
    #[error("inventory invariant violated on ride {ride_id}")]
    InvariantViolation { ride_id: Uuid },

    #[error("record is already terminal ({state})")]
    AlreadyTerminal { state: String },

    #[error("ride cannot be completed before its departure time")]
    DepartureNotReached,

    #[error("seat count must be at least 1")]
    InvalidSeatCount,

    #[error("storage failure: {0}")]
    Store(#[from] StoreError),
}

impl From<ValidationError> for EngineError {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::InvalidReference(raw) => EngineError::InvalidReference(raw),
            ValidationError::ReferenceAlreadyUsed => EngineError::ReferenceAlreadyUsed,
            ValidationError::Store(err) => EngineError::Store(err),
        }
    }
}

impl From<LifecycleError> for EngineError {
    fn from(err: LifecycleError) -> Self {
        match err {
            LifecycleError::AlreadyTerminal { from, .. } => {
                EngineError::AlreadyTerminal { state: from }
            }
            LifecycleError::DepartureNotReached => EngineError::DepartureNotReached,
        }
    }
}

/// Parameters for opening a ride.
#[derive(Debug, Clone, Deserialize)]
pub struct NewRide {
    pub ledger_ride_id: i64,
    pub origin: String,
    pub destination: String,
    pub departure_time: DateTime<Utc>,
    pub seats: i32,
    pub price_per_seat: i32,
}

/// Parameters for booking seats on a ride.
#[derive(Debug, Clone, Deserialize)]
pub struct NewBooking {
    pub ride_id: Uuid,
    pub seats: i32,
    pub ledger_booking_id: i64,
    /// Raw ledger transaction reference for the on-chain payment.
    pub transaction_hash: String,
}

/// Result of a cancellation. The cancellation itself always stands once
/// reported; `inventory_fault` carries a seat-release failure that needs
/// operational follow-up.
#[derive(Debug, Clone, Serialize)]
pub struct CancelSummary {
    pub booking_id: Uuid,
    pub seats_released: i32,
    pub inventory_fault: Option<String>,
}

/// Orchestrates validator, seat inventory and the lifecycle machines so
/// each logical operation is all-or-nothing from the caller's view: a
/// failed sub-step rolls back anything already applied before the error
/// is reported.
pub struct Coordinator {
    rides: Arc<dyn RideStore>,
    bookings: Arc<dyn BookingStore>,
    inventory: SeatInventory,
    validator: ReferenceValidator,
}

impl Coordinator {
    pub fn new(
        rides: Arc<dyn RideStore>,
        bookings: Arc<dyn BookingStore>,
        ledger: Arc<dyn LedgerService>,
    ) -> Self {
        Self {
            inventory: SeatInventory::new(rides.clone()),
            validator: ReferenceValidator::new(bookings.clone(), ledger),
            rides,
            bookings,
        }
    }

    pub async fn create_ride(&self, driver_id: Uuid, spec: NewRide) -> Result<Ride, EngineError> {
        if spec.seats < 1 {
            return Err(EngineError::InvalidSeatCount);
        }
        let ride = Ride::new(
            driver_id,
            spec.ledger_ride_id,
            spec.origin,
            spec.destination,
            spec.departure_time,
            spec.seats,
            spec.price_per_seat,
        );
        match self.rides.insert_ride(&ride).await {
            Ok(()) => {
                info!(ride_id = %ride.id, ledger_ride_id = ride.ledger_ride_id, "ride created");
                Ok(ride)
            }
            Err(StoreError::DuplicateLedgerId) => Err(EngineError::ReferenceAlreadyUsed),
            Err(err) => Err(err.into()),
        }
    }

    /// Book seats: validate the reference, debit the inventory, persist the
    /// Confirmed booking. The persist claims the reference under the
    /// store's uniqueness constraint, so a timed-out-and-retried call with
    /// the same reference loses that claim and its debit is rolled back —
    /// it can never double-debit.
    pub async fn create_booking(
        &self,
        passenger_id: Uuid,
        req: NewBooking,
    ) -> Result<Booking, EngineError> {
        let reference = self
            .validator
            .validate(&req.transaction_hash, ReferenceRole::BookingCreation)
            .await?;

        match self.inventory.reserve(req.ride_id, req.seats).await {
            Ok(_) => {}
            Err(InventoryError::InsufficientSeats { requested, available }) => {
                return Err(EngineError::InsufficientSeats { requested, available })
            }
            Err(InventoryError::NotFound) => return Err(EngineError::NotFound("ride")),
            Err(InventoryError::NotOpen) => {
                return Err(EngineError::AlreadyTerminal {
                    state: self.ride_state(req.ride_id).await,
                })
            }
            Err(InventoryError::InvalidSeatCount(_)) => return Err(EngineError::InvalidSeatCount),
            Err(InventoryError::InvariantViolation { ride_id, .. }) => {
                return Err(EngineError::InvariantViolation { ride_id })
            }
            Err(InventoryError::Store(err)) => return Err(err.into()),
        }

        let booking = Booking::new(
            req.ledger_booking_id,
            req.ride_id,
            passenger_id,
            req.seats,
            reference,
        );
        if let Err(err) = self.bookings.insert_booking(&booking).await {
            // Roll the debit back before reporting, so no seat stays
            // reserved without a booking record behind it.
            if let Err(release_err) = self.inventory.release(req.ride_id, req.seats).await {
                error!(
                    ride_id = %req.ride_id,
                    error = %release_err,
                    "failed to roll back seat reservation after booking persist error"
                );
            }
            return Err(match err {
                StoreError::ReferenceClaimed | StoreError::DuplicateLedgerId => {
                    EngineError::ReferenceAlreadyUsed
                }
                other => other.into(),
            });
        }

        info!(booking_id = %booking.id, ride_id = %booking.ride_id, seats = booking.seats, "booking confirmed");
        Ok(booking)
    }

    /// Cancel a Confirmed booking and credit its seats back. The booking is
    /// marked Cancelled first; a seat-release fault is logged and surfaced
    /// in the summary but never blocks the passenger-facing cancellation.
    pub async fn cancel_booking(
        &self,
        caller: Uuid,
        booking_id: Uuid,
    ) -> Result<CancelSummary, EngineError> {
        let booking = self
            .bookings
            .get_booking(booking_id)
            .await?
            .ok_or(EngineError::NotFound("booking"))?;
        if booking.passenger_id != caller {
            return Err(EngineError::Forbidden("passenger"));
        }

        match self.bookings.cancel_booking(booking_id).await? {
            TransitionOutcome::Applied => {}
            TransitionOutcome::AlreadyTerminal => {
                return Err(EngineError::AlreadyTerminal {
                    state: "CANCELLED".to_string(),
                })
            }
            TransitionOutcome::NotFound => return Err(EngineError::NotFound("booking")),
        }

        let inventory_fault = match self.inventory.release(booking.ride_id, booking.seats).await {
            Ok(_) => None,
            Err(err) => {
                error!(
                    %booking_id,
                    ride_id = %booking.ride_id,
                    error = %err,
                    "cancellation applied but seat release failed"
                );
                Some(err.to_string())
            }
        };

        info!(%booking_id, seats = booking.seats, "booking cancelled");
        Ok(CancelSummary {
            booking_id,
            seats_released: booking.seats,
            inventory_fault,
        })
    }

    /// Close a ride without payment implication. Driver only; no seat or
    /// ledger effect.
    pub async fn close_ride(&self, caller: Uuid, ride_id: Uuid) -> Result<Ride, EngineError> {
        let mut ride = self
            .rides
            .get_ride(ride_id)
            .await?
            .ok_or(EngineError::NotFound("ride"))?;
        if ride.driver_id != caller {
            return Err(EngineError::Forbidden("driver"));
        }
        ride.close()?;

        match self.rides.close_ride(ride_id).await? {
            TransitionOutcome::Applied => {
                info!(%ride_id, "ride closed");
                Ok(ride)
            }
            TransitionOutcome::AlreadyTerminal => Err(EngineError::AlreadyTerminal {
                state: self.ride_state(ride_id).await,
            }),
            TransitionOutcome::NotFound => Err(EngineError::NotFound("ride")),
        }
    }

    /// Complete a ride, recording the payment-release reference. Requires
    /// the departure time to have passed. Already-Confirmed bookings are
    /// left untouched; completion only marks the ride side of the
    /// correlation.
    pub async fn complete_ride(
        &self,
        caller: Uuid,
        ride_id: Uuid,
        transaction_hash: &str,
    ) -> Result<Ride, EngineError> {
        let mut ride = self
            .rides
            .get_ride(ride_id)
            .await?
            .ok_or(EngineError::NotFound("ride"))?;
        if ride.driver_id != caller {
            return Err(EngineError::Forbidden("driver"));
        }

        let reference = self
            .validator
            .validate(transaction_hash, ReferenceRole::RideCompletion)
            .await?;

        let now = Utc::now();
        ride.complete(reference.clone(), now)?;

        match self.rides.complete_ride(ride_id, &reference, now).await {
            Ok(TransitionOutcome::Applied) => {
                info!(%ride_id, %reference, "ride completed, payment released");
                Ok(ride)
            }
            Ok(TransitionOutcome::AlreadyTerminal) => Err(EngineError::AlreadyTerminal {
                state: self.ride_state(ride_id).await,
            }),
            Ok(TransitionOutcome::NotFound) => Err(EngineError::NotFound("ride")),
            Err(StoreError::ReferenceClaimed) => Err(EngineError::ReferenceAlreadyUsed),
            Err(err) => Err(err.into()),
        }
    }

    /// Current stored state of a ride, for error reporting after a lost
    /// transition race.
    async fn ride_state(&self, ride_id: Uuid) -> String {
        match self.rides.get_ride(ride_id).await {
            Ok(Some(ride)) => ride.status.as_str().to_string(),
            _ => "UNKNOWN".to_string(),
        }
    }
}
