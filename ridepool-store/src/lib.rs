pub mod app_config;
pub mod booking_repo;
pub mod database;
pub mod ride_repo;

pub use app_config::Config;
pub use booking_repo::PgBookingStore;
pub use database::DbClient;
pub use ride_repo::PgRideStore;

/// Postgres unique_violation, used to map constraint rejections onto the
/// engine's store error variants.
pub(crate) const UNIQUE_VIOLATION: &str = "23505";

pub(crate) fn on_unique_violation(
    err: sqlx::Error,
    mapped: ridepool_engine::StoreError,
) -> ridepool_engine::StoreError {
    match &err {
        sqlx::Error::Database(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION) => mapped,
        _ => ridepool_engine::StoreError::backend(err),
    }
}
