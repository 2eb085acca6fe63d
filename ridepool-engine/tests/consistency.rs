use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use ridepool_domain::{BookingStatus, LedgerRef, Ride, RideStatus};
use ridepool_engine::{
    BookingStore, Coordinator, EngineError, MemoryStore, NewBooking, NewRide, NoopLedger,
    ReleaseOutcome, ReserveOutcome, RideFilter, RideStore, StoreError, TransitionOutcome,
};

fn hash(tag: u8) -> String {
    format!("0x{}", format!("{:02x}", tag).repeat(32))
}

fn setup() -> (Arc<MemoryStore>, Coordinator) {
    let store = Arc::new(MemoryStore::new());
    let coordinator = Coordinator::new(store.clone(), store.clone(), Arc::new(NoopLedger));
    (store, coordinator)
}

fn ride_spec(seats: i32, departed: bool) -> NewRide {
    let offset = if departed {
        -Duration::hours(1)
    } else {
        Duration::hours(6)
    };
    NewRide {
        ledger_ride_id: rand_id(),
        origin: "Madrid".to_string(),
        destination: "Valencia".to_string(),
        departure_time: Utc::now() + offset,
        seats,
        price_per_seat: 2500,
    }
}

fn rand_id() -> i64 {
    // Uuid-derived pseudo-random id, good enough for test uniqueness.
    Uuid::new_v4().as_u128() as i64 & i64::MAX
}

fn booking_req(ride_id: Uuid, seats: i32, tag: u8) -> NewBooking {
    NewBooking {
        ride_id,
        seats,
        ledger_booking_id: rand_id(),
        transaction_hash: hash(tag),
    }
}

#[tokio::test]
async fn test_booking_debits_and_cancellation_credits() {
    let (store, coordinator) = setup();
    let driver = Uuid::new_v4();
    let passenger = Uuid::new_v4();

    let ride = coordinator
        .create_ride(driver, ride_spec(4, false))
        .await
        .unwrap();

    let booking = coordinator
        .create_booking(passenger, booking_req(ride.id, 3, 1))
        .await
        .unwrap();
    assert_eq!(booking.status, BookingStatus::Confirmed);
    assert_eq!(
        store.get_ride(ride.id).await.unwrap().unwrap().available_seats,
        1
    );

    let summary = coordinator
        .cancel_booking(passenger, booking.id)
        .await
        .unwrap();
    assert_eq!(summary.seats_released, 3);
    assert!(summary.inventory_fault.is_none());
    assert_eq!(
        store.get_ride(ride.id).await.unwrap().unwrap().available_seats,
        4
    );
    assert_eq!(
        store.get_booking(booking.id).await.unwrap().unwrap().status,
        BookingStatus::Cancelled
    );
}

#[tokio::test]
async fn test_overbooking_rejected_without_mutation() {
    let (store, coordinator) = setup();
    let driver = Uuid::new_v4();

    let ride = coordinator
        .create_ride(driver, ride_spec(4, false))
        .await
        .unwrap();

    // A reserves 3 of 4, B asks for 2, A cancels, availability recovers.
    let booking_a = coordinator
        .create_booking(Uuid::new_v4(), booking_req(ride.id, 3, 1))
        .await
        .unwrap();

    let passenger_b = Uuid::new_v4();
    let err = coordinator
        .create_booking(passenger_b, booking_req(ride.id, 2, 2))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::InsufficientSeats { requested: 2, available: 1 }
    ));
    assert_eq!(
        store.get_ride(ride.id).await.unwrap().unwrap().available_seats,
        1
    );

    coordinator
        .cancel_booking(booking_a.passenger_id, booking_a.id)
        .await
        .unwrap();
    assert_eq!(
        store.get_ride(ride.id).await.unwrap().unwrap().available_seats,
        4
    );
}

#[tokio::test]
async fn test_concurrent_bookings_exactly_one_wins() {
    // Two 3-seat requests against 4 available: exactly one concurrent call
    // must succeed, the other must fail with no inventory change.
    let (store, coordinator) = setup();
    let coordinator = Arc::new(coordinator);
    let driver = Uuid::new_v4();

    let ride = coordinator
        .create_ride(driver, ride_spec(4, false))
        .await
        .unwrap();

    let first = {
        let coordinator = coordinator.clone();
        let req = booking_req(ride.id, 3, 1);
        tokio::spawn(async move { coordinator.create_booking(Uuid::new_v4(), req).await })
    };
    let second = {
        let coordinator = coordinator.clone();
        let req = booking_req(ride.id, 3, 2);
        tokio::spawn(async move { coordinator.create_booking(Uuid::new_v4(), req).await })
    };

    let results = [first.await.unwrap(), second.await.unwrap()];
    let successes = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1, "exactly one booking must win the race");

    let failure = results.iter().find(|r| r.is_err()).unwrap();
    assert!(matches!(
        failure.as_ref().unwrap_err(),
        EngineError::InsufficientSeats { .. }
    ));

    assert_eq!(
        store.get_ride(ride.id).await.unwrap().unwrap().available_seats,
        1
    );
}

#[tokio::test]
async fn test_reused_reference_rejected_and_debit_rolled_back() {
    let (store, coordinator) = setup();
    let driver = Uuid::new_v4();

    let ride = coordinator
        .create_ride(driver, ride_spec(4, false))
        .await
        .unwrap();

    coordinator
        .create_booking(Uuid::new_v4(), booking_req(ride.id, 2, 9))
        .await
        .unwrap();

    // A retry after timeout re-presents the same transaction hash. It must
    // not debit a second time.
    let err = coordinator
        .create_booking(Uuid::new_v4(), booking_req(ride.id, 2, 9))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::ReferenceAlreadyUsed));
    assert_eq!(
        store.get_ride(ride.id).await.unwrap().unwrap().available_seats,
        2
    );
}

#[tokio::test]
async fn test_malformed_reference_rejected_before_any_mutation() {
    let (store, coordinator) = setup();
    let ride = coordinator
        .create_ride(Uuid::new_v4(), ride_spec(4, false))
        .await
        .unwrap();

    let err = coordinator
        .create_booking(
            Uuid::new_v4(),
            NewBooking {
                ride_id: ride.id,
                seats: 1,
                ledger_booking_id: rand_id(),
                transaction_hash: "bogus".to_string(),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidReference(_)));
    assert_eq!(
        store.get_ride(ride.id).await.unwrap().unwrap().available_seats,
        4
    );
}

#[tokio::test]
async fn test_cancel_requires_the_booking_passenger() {
    let (_, coordinator) = setup();
    let ride = coordinator
        .create_ride(Uuid::new_v4(), ride_spec(4, false))
        .await
        .unwrap();
    let booking = coordinator
        .create_booking(Uuid::new_v4(), booking_req(ride.id, 1, 3))
        .await
        .unwrap();

    let err = coordinator
        .cancel_booking(Uuid::new_v4(), booking.id)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Forbidden("passenger")));
}

#[tokio::test]
async fn test_cancel_twice_is_terminal() {
    let (store, coordinator) = setup();
    let ride = coordinator
        .create_ride(Uuid::new_v4(), ride_spec(4, false))
        .await
        .unwrap();
    let booking = coordinator
        .create_booking(Uuid::new_v4(), booking_req(ride.id, 2, 4))
        .await
        .unwrap();

    coordinator
        .cancel_booking(booking.passenger_id, booking.id)
        .await
        .unwrap();
    let err = coordinator
        .cancel_booking(booking.passenger_id, booking.id)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::AlreadyTerminal { .. }));

    // Second cancel must not double-credit.
    assert_eq!(
        store.get_ride(ride.id).await.unwrap().unwrap().available_seats,
        4
    );
}

#[tokio::test]
async fn test_close_is_driver_only_and_terminal() {
    let (store, coordinator) = setup();
    let driver = Uuid::new_v4();
    let ride = coordinator
        .create_ride(driver, ride_spec(4, false))
        .await
        .unwrap();

    let err = coordinator
        .close_ride(Uuid::new_v4(), ride.id)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Forbidden("driver")));

    let closed = coordinator.close_ride(driver, ride.id).await.unwrap();
    assert_eq!(closed.status, RideStatus::Closed);

    let err = coordinator.close_ride(driver, ride.id).await.unwrap_err();
    assert!(matches!(err, EngineError::AlreadyTerminal { .. }));

    // Closed rides take no new bookings.
    let err = coordinator
        .create_booking(Uuid::new_v4(), booking_req(ride.id, 1, 5))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::AlreadyTerminal { .. }));
    assert_eq!(
        store.get_ride(ride.id).await.unwrap().unwrap().available_seats,
        4
    );
}

#[tokio::test]
async fn test_complete_gated_on_departure_time() {
    let (_, coordinator) = setup();
    let driver = Uuid::new_v4();
    let ride = coordinator
        .create_ride(driver, ride_spec(4, false))
        .await
        .unwrap();

    let err = coordinator
        .complete_ride(driver, ride.id, &hash(6))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::DepartureNotReached));
}

#[tokio::test]
async fn test_complete_records_reference_once() {
    let (store, coordinator) = setup();
    let driver = Uuid::new_v4();
    let ride = coordinator
        .create_ride(driver, ride_spec(4, true))
        .await
        .unwrap();

    let completed = coordinator
        .complete_ride(driver, ride.id, &hash(7))
        .await
        .unwrap();
    assert_eq!(completed.status, RideStatus::Completed);
    assert!(completed.completed_at.is_some());

    let stored = store.get_ride(ride.id).await.unwrap().unwrap();
    assert_eq!(stored.status, RideStatus::Completed);
    assert_eq!(
        stored.completion_reference.unwrap().as_str(),
        hash(7).as_str()
    );

    // The reference is now claimed: no booking may reuse it.
    let other = coordinator
        .create_ride(driver, ride_spec(2, false))
        .await
        .unwrap();
    let err = coordinator
        .create_booking(Uuid::new_v4(), booking_req(other.id, 1, 7))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::ReferenceAlreadyUsed));
}

#[tokio::test]
async fn test_completion_is_terminal() {
    let (_, coordinator) = setup();
    let driver = Uuid::new_v4();
    let ride = coordinator
        .create_ride(driver, ride_spec(4, true))
        .await
        .unwrap();

    coordinator
        .complete_ride(driver, ride.id, &hash(8))
        .await
        .unwrap();
    let err = coordinator
        .complete_ride(driver, ride.id, &hash(9))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::AlreadyTerminal { .. }));
}

#[tokio::test]
async fn test_duplicate_ledger_ride_id_rejected() {
    let (_, coordinator) = setup();
    let mut spec = ride_spec(4, false);
    spec.ledger_ride_id = 42;
    coordinator
        .create_ride(Uuid::new_v4(), spec.clone())
        .await
        .unwrap();

    let err = coordinator
        .create_ride(Uuid::new_v4(), spec)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::ReferenceAlreadyUsed));
}

/// RideStore wrapper whose seat credits always land on an already-full
/// ride, as if the counter had drifted upward behind the engine's back.
struct DriftedRides {
    inner: Arc<MemoryStore>,
}

#[async_trait]
impl RideStore for DriftedRides {
    async fn insert_ride(&self, ride: &Ride) -> Result<(), StoreError> {
        self.inner.insert_ride(ride).await
    }

    async fn get_ride(&self, id: Uuid) -> Result<Option<Ride>, StoreError> {
        self.inner.get_ride(id).await
    }

    async fn list_open_rides(&self) -> Result<Vec<Ride>, StoreError> {
        self.inner.list_open_rides().await
    }

    async fn search_rides(&self, filter: &RideFilter) -> Result<Vec<Ride>, StoreError> {
        self.inner.search_rides(filter).await
    }

    async fn try_reserve_seats(
        &self,
        ride_id: Uuid,
        seats: i32,
    ) -> Result<ReserveOutcome, StoreError> {
        self.inner.try_reserve_seats(ride_id, seats).await
    }

    async fn release_seats(
        &self,
        ride_id: Uuid,
        _seats: i32,
    ) -> Result<ReleaseOutcome, StoreError> {
        let ride = self.inner.get_ride(ride_id).await?.unwrap();
        Ok(ReleaseOutcome::Clamped {
            available: ride.total_seats,
            total: ride.total_seats,
        })
    }

    async fn close_ride(&self, ride_id: Uuid) -> Result<TransitionOutcome, StoreError> {
        self.inner.close_ride(ride_id).await
    }

    async fn complete_ride(
        &self,
        ride_id: Uuid,
        reference: &LedgerRef,
        completed_at: DateTime<Utc>,
    ) -> Result<TransitionOutcome, StoreError> {
        self.inner.complete_ride(ride_id, reference, completed_at).await
    }
}

#[tokio::test]
async fn test_cancellation_stands_when_seat_release_faults() {
    // A clamped release means the inventory drifted; the fault is reported
    // in the summary but the booking must still end up Cancelled.
    let store = Arc::new(MemoryStore::new());
    let rides = Arc::new(DriftedRides {
        inner: store.clone(),
    });
    let coordinator = Coordinator::new(rides, store.clone(), Arc::new(NoopLedger));

    let ride = coordinator
        .create_ride(Uuid::new_v4(), ride_spec(4, false))
        .await
        .unwrap();
    let booking = coordinator
        .create_booking(Uuid::new_v4(), booking_req(ride.id, 2, 30))
        .await
        .unwrap();

    let summary = coordinator
        .cancel_booking(booking.passenger_id, booking.id)
        .await
        .unwrap();
    assert_eq!(summary.seats_released, 2);
    let fault = summary
        .inventory_fault
        .expect("release fault must be surfaced in the summary");
    assert!(fault.contains("clamped"), "unexpected fault: {fault}");

    // The passenger-facing cancellation is not blocked by the fault.
    assert_eq!(
        store.get_booking(booking.id).await.unwrap().unwrap().status,
        BookingStatus::Cancelled
    );
    let err = coordinator
        .cancel_booking(booking.passenger_id, booking.id)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::AlreadyTerminal { .. }));
}

#[tokio::test]
async fn test_concurrent_cancellations_each_credit_exactly_their_seats() {
    let (store, coordinator) = setup();
    let coordinator = Arc::new(coordinator);
    let ride = coordinator
        .create_ride(Uuid::new_v4(), ride_spec(8, false))
        .await
        .unwrap();

    let booking_a = coordinator
        .create_booking(Uuid::new_v4(), booking_req(ride.id, 3, 40))
        .await
        .unwrap();
    let booking_b = coordinator
        .create_booking(Uuid::new_v4(), booking_req(ride.id, 2, 41))
        .await
        .unwrap();
    assert_eq!(
        store.get_ride(ride.id).await.unwrap().unwrap().available_seats,
        3
    );

    let first = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move {
            coordinator
                .cancel_booking(booking_a.passenger_id, booking_a.id)
                .await
        })
    };
    let second = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move {
            coordinator
                .cancel_booking(booking_b.passenger_id, booking_b.id)
                .await
        })
    };

    let summary_a = first.await.unwrap().unwrap();
    let summary_b = second.await.unwrap().unwrap();
    assert_eq!(summary_a.seats_released, 3);
    assert_eq!(summary_b.seats_released, 2);
    assert!(summary_a.inventory_fault.is_none() && summary_b.inventory_fault.is_none());

    assert_eq!(
        store.get_ride(ride.id).await.unwrap().unwrap().available_seats,
        8
    );
}

#[tokio::test]
async fn test_availability_accounting_identity_under_churn() {
    // available + Σ(seats of Confirmed bookings) == total, at every step.
    let (store, coordinator) = setup();
    let driver = Uuid::new_v4();
    let passenger = Uuid::new_v4();
    let ride = coordinator
        .create_ride(driver, ride_spec(8, false))
        .await
        .unwrap();

    let mut confirmed = Vec::new();
    for (i, seats) in [3, 2, 1].into_iter().enumerate() {
        let booking = coordinator
            .create_booking(passenger, booking_req(ride.id, seats, 20 + i as u8))
            .await
            .unwrap();
        confirmed.push(booking);

        let stored = store.get_ride(ride.id).await.unwrap().unwrap();
        let booked: i32 = store
            .list_bookings_for_passenger(passenger)
            .await
            .unwrap()
            .iter()
            .filter(|b| b.status == BookingStatus::Confirmed)
            .map(|b| b.seats)
            .sum();
        assert_eq!(stored.available_seats + booked, stored.total_seats);
    }

    for booking in confirmed {
        coordinator
            .cancel_booking(passenger, booking.id)
            .await
            .unwrap();

        let stored = store.get_ride(ride.id).await.unwrap().unwrap();
        let booked: i32 = store
            .list_bookings_for_passenger(passenger)
            .await
            .unwrap()
            .iter()
            .filter(|b| b.status == BookingStatus::Confirmed)
            .map(|b| b.seats)
            .sum();
        assert_eq!(stored.available_seats + booked, stored.total_seats);
        assert!(stored.available_seats >= 0 && stored.available_seats <= stored.total_seats);
    }
}
