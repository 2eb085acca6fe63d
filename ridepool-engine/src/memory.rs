use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use ridepool_domain::{Booking, BookingStatus, LedgerRef, Ride, RideStatus};

use crate::store::{
    BookingStore, ReleaseOutcome, ReserveOutcome, RideFilter, RideStore, StoreError,
    TransitionOutcome,
};

#[derive(Default)]
struct Tables {
    rides: HashMap<Uuid, Ride>,
    bookings: HashMap<Uuid, Booking>,
    references: HashSet<String>,
    ledger_ride_ids: HashSet<i64>,
    ledger_booking_ids: HashSet<i64>,
}

/// In-memory store used by tests and local development. A single mutex
/// over all tables makes every operation linearizable by construction,
/// matching the contract the Postgres implementation meets with
/// conditional updates and row locks.
pub struct MemoryStore {
    inner: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Tables::default()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RideStore for MemoryStore {
    async fn insert_ride(&self, ride: &Ride) -> Result<(), StoreError> {
        let mut tables = self.inner.lock().await;
        if !tables.ledger_ride_ids.insert(ride.ledger_ride_id) {
            return Err(StoreError::DuplicateLedgerId);
        }
        tables.rides.insert(ride.id, ride.clone());
        Ok(())
    }

    async fn get_ride(&self, id: Uuid) -> Result<Option<Ride>, StoreError> {
        let tables = self.inner.lock().await;
        Ok(tables.rides.get(&id).cloned())
    }

    async fn list_open_rides(&self) -> Result<Vec<Ride>, StoreError> {
        let tables = self.inner.lock().await;
        let mut rides: Vec<Ride> = tables
            .rides
            .values()
            .filter(|ride| ride.status == RideStatus::Open)
            .cloned()
            .collect();
        rides.sort_by_key(|ride| ride.departure_time);
        Ok(rides)
    }

    async fn search_rides(&self, filter: &RideFilter) -> Result<Vec<Ride>, StoreError> {
        let tables = self.inner.lock().await;
        let origin = filter.origin.as_deref().map(str::to_lowercase);
        let destination = filter.destination.as_deref().map(str::to_lowercase);

        let mut rides: Vec<Ride> = tables
            .rides
            .values()
            .filter(|ride| ride.status == RideStatus::Open)
            .filter(|ride| match &origin {
                Some(o) => ride.origin.to_lowercase().contains(o),
                None => true,
            })
            .filter(|ride| match &destination {
                Some(d) => ride.destination.to_lowercase().contains(d),
                None => true,
            })
            .filter(|ride| match filter.departure_date {
                Some(date) => ride.departure_time.date_naive() == date,
                None => true,
            })
            .cloned()
            .collect();
        rides.sort_by_key(|ride| ride.departure_time);
        Ok(rides)
    }

    async fn try_reserve_seats(
        &self,
        ride_id: Uuid,
        seats: i32,
    ) -> Result<ReserveOutcome, StoreError> {
        let mut tables = self.inner.lock().await;
        let Some(ride) = tables.rides.get_mut(&ride_id) else {
            return Ok(ReserveOutcome::NotFound);
        };
        if ride.status != RideStatus::Open {
            return Ok(ReserveOutcome::NotOpen);
        }
        if ride.available_seats < seats {
            return Ok(ReserveOutcome::Insufficient {
                available: ride.available_seats,
            });
        }
        ride.available_seats -= seats;
        ride.updated_at = Utc::now();
        Ok(ReserveOutcome::Reserved {
            available: ride.available_seats,
        })
    }

    async fn release_seats(
        &self,
        ride_id: Uuid,
        seats: i32,
    ) -> Result<ReleaseOutcome, StoreError> {
        let mut tables = self.inner.lock().await;
        let Some(ride) = tables.rides.get_mut(&ride_id) else {
            return Ok(ReleaseOutcome::NotFound);
        };
        let headroom = ride.total_seats - ride.available_seats;
        ride.updated_at = Utc::now();
        if seats > headroom {
            ride.available_seats = ride.total_seats;
            Ok(ReleaseOutcome::Clamped {
                available: ride.total_seats,
                total: ride.total_seats,
            })
        } else {
            ride.available_seats += seats;
            Ok(ReleaseOutcome::Released {
                available: ride.available_seats,
            })
        }
    }

    async fn close_ride(&self, ride_id: Uuid) -> Result<TransitionOutcome, StoreError> {
        let mut tables = self.inner.lock().await;
        let Some(ride) = tables.rides.get_mut(&ride_id) else {
            return Ok(TransitionOutcome::NotFound);
        };
        if ride.status != RideStatus::Open {
            return Ok(TransitionOutcome::AlreadyTerminal);
        }
        ride.status = RideStatus::Closed;
        ride.updated_at = Utc::now();
        Ok(TransitionOutcome::Applied)
    }

    async fn complete_ride(
        &self,
        ride_id: Uuid,
        reference: &LedgerRef,
        completed_at: DateTime<Utc>,
    ) -> Result<TransitionOutcome, StoreError> {
        let mut tables = self.inner.lock().await;
        if tables.references.contains(reference.as_str()) {
            return Err(StoreError::ReferenceClaimed);
        }
        {
            let Some(ride) = tables.rides.get_mut(&ride_id) else {
                return Ok(TransitionOutcome::NotFound);
            };
            if ride.status != RideStatus::Open {
                return Ok(TransitionOutcome::AlreadyTerminal);
            }
            ride.status = RideStatus::Completed;
            ride.completion_reference = Some(reference.clone());
            ride.completed_at = Some(completed_at);
            ride.updated_at = completed_at;
        }
        tables.references.insert(reference.as_str().to_string());
        Ok(TransitionOutcome::Applied)
    }
}

#[async_trait]
impl BookingStore for MemoryStore {
    async fn insert_booking(&self, booking: &Booking) -> Result<(), StoreError> {
        let mut tables = self.inner.lock().await;
        if tables.references.contains(booking.ledger_reference.as_str()) {
            return Err(StoreError::ReferenceClaimed);
        }
        if !tables.ledger_booking_ids.insert(booking.ledger_booking_id) {
            return Err(StoreError::DuplicateLedgerId);
        }
        tables
            .references
            .insert(booking.ledger_reference.as_str().to_string());
        tables.bookings.insert(booking.id, booking.clone());
        Ok(())
    }

    async fn get_booking(&self, id: Uuid) -> Result<Option<Booking>, StoreError> {
        let tables = self.inner.lock().await;
        Ok(tables.bookings.get(&id).cloned())
    }

    async fn list_bookings_for_passenger(
        &self,
        passenger_id: Uuid,
    ) -> Result<Vec<Booking>, StoreError> {
        let tables = self.inner.lock().await;
        let mut bookings: Vec<Booking> = tables
            .bookings
            .values()
            .filter(|booking| booking.passenger_id == passenger_id)
            .cloned()
            .collect();
        bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(bookings)
    }

    async fn cancel_booking(&self, booking_id: Uuid) -> Result<TransitionOutcome, StoreError> {
        let mut tables = self.inner.lock().await;
        let Some(booking) = tables.bookings.get_mut(&booking_id) else {
            return Ok(TransitionOutcome::NotFound);
        };
        if booking.status != BookingStatus::Confirmed {
            return Ok(TransitionOutcome::AlreadyTerminal);
        }
        booking.status = BookingStatus::Cancelled;
        booking.updated_at = Utc::now();
        Ok(TransitionOutcome::Applied)
    }

    async fn is_reference_used(&self, reference: &LedgerRef) -> Result<bool, StoreError> {
        let tables = self.inner.lock().await;
        Ok(tables.references.contains(reference.as_str()))
    }
}
