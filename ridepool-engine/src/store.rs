use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use ridepool_domain::{Booking, LedgerRef, Ride};
use uuid::Uuid;

/// Storage failures the engine distinguishes. Uniqueness rejections get
/// their own variants because the coordinator's rollback paths depend on
/// telling them apart from backend faults.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The uniqueness constraint on ledger references rejected the write:
    /// another off-chain record already carries this reference.
    #[error("ledger reference already claimed by another record")]
    ReferenceClaimed,

    /// The uniqueness constraint on an external ledger identifier
    /// (ride or booking id) rejected the write.
    #[error("external ledger identifier already registered")]
    DuplicateLedgerId,

    #[error("storage backend failure: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl StoreError {
    pub fn backend<E>(err: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        StoreError::Backend(err.into())
    }
}

/// Outcome of a conditional seat decrement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReserveOutcome {
    /// Seats debited; `available` is the post-decrement count.
    Reserved { available: i32 },
    /// Not enough seats; nothing was mutated.
    Insufficient { available: i32 },
    /// Ride is Closed or Completed; nothing was mutated.
    NotOpen,
    NotFound,
}

/// Outcome of a clamped seat increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    Released { available: i32 },
    /// The increment would have pushed `available` past `total`; the store
    /// wrote the clamped value instead.
    Clamped { available: i32, total: i32 },
    NotFound,
}

/// Outcome of a conditional lifecycle update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    Applied,
    /// The row had already left its source state when the predicate ran.
    AlreadyTerminal,
    NotFound,
}

/// Filter for the ride search projection.
#[derive(Debug, Clone, Default)]
pub struct RideFilter {
    pub origin: Option<String>,
    pub destination: Option<String>,
    pub departure_date: Option<NaiveDate>,
}

/// Ride persistence. The seat and lifecycle mutations are conditional
/// updates: per ride they must be linearizable, so two concurrent calls
/// never act on the same observed counter value.
#[async_trait]
pub trait RideStore: Send + Sync {
    async fn insert_ride(&self, ride: &Ride) -> Result<(), StoreError>;

    async fn get_ride(&self, id: Uuid) -> Result<Option<Ride>, StoreError>;

    /// Open rides ordered by departure time.
    async fn list_open_rides(&self) -> Result<Vec<Ride>, StoreError>;

    async fn search_rides(&self, filter: &RideFilter) -> Result<Vec<Ride>, StoreError>;

    /// Decrement `available_seats` by `seats` iff the ride is Open and has
    /// at least `seats` available, atomically.
    async fn try_reserve_seats(
        &self,
        ride_id: Uuid,
        seats: i32,
    ) -> Result<ReserveOutcome, StoreError>;

    /// Increment `available_seats` by `seats`, clamped to `total_seats`,
    /// atomically.
    async fn release_seats(&self, ride_id: Uuid, seats: i32)
        -> Result<ReleaseOutcome, StoreError>;

    /// Open → Closed iff the row is still Open.
    async fn close_ride(&self, ride_id: Uuid) -> Result<TransitionOutcome, StoreError>;

    /// Open → Completed iff the row is still Open, claiming `reference`
    /// under the store's uniqueness constraint in the same transaction.
    async fn complete_ride(
        &self,
        ride_id: Uuid,
        reference: &LedgerRef,
        completed_at: DateTime<Utc>,
    ) -> Result<TransitionOutcome, StoreError>;
}

/// Booking persistence.
#[async_trait]
pub trait BookingStore: Send + Sync {
    /// Persist a Confirmed booking, claiming its ledger reference under
    /// the store's uniqueness constraint in the same transaction.
    async fn insert_booking(&self, booking: &Booking) -> Result<(), StoreError>;

    async fn get_booking(&self, id: Uuid) -> Result<Option<Booking>, StoreError>;

    /// A passenger's bookings, newest first.
    async fn list_bookings_for_passenger(
        &self,
        passenger_id: Uuid,
    ) -> Result<Vec<Booking>, StoreError>;

    /// Confirmed → Cancelled iff the row is still Confirmed.
    async fn cancel_booking(&self, booking_id: Uuid) -> Result<TransitionOutcome, StoreError>;

    /// Whether `reference` is already claimed by any off-chain record.
    async fn is_reference_used(&self, reference: &LedgerRef) -> Result<bool, StoreError>;
}
