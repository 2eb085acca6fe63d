use std::sync::Arc;

use ridepool_engine::{BookingStore, Coordinator, RideStore};

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
}

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<Coordinator>,
    pub rides: Arc<dyn RideStore>,
    pub bookings: Arc<dyn BookingStore>,
    pub auth: AuthConfig,
}
