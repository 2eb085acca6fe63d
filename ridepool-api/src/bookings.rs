use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{post, put},
    Json, Router,
};
use axum_extra::headers::{authorization::Bearer, Authorization};
use axum_extra::TypedHeader;
use uuid::Uuid;

use ridepool_domain::Booking;
use ridepool_engine::{CancelSummary, NewBooking};

use crate::auth;
use crate::error::AppError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/bookings", post(create_booking).get(list_bookings))
        .route("/api/bookings/{id}/cancel", put(cancel_booking))
}

async fn create_booking(
    State(state): State<AppState>,
    TypedHeader(bearer): TypedHeader<Authorization<Bearer>>,
    Json(req): Json<NewBooking>,
) -> Result<(StatusCode, Json<Booking>), AppError> {
    let passenger_id = auth::verify_bearer(&state.auth, &bearer)?;
    let booking = state.coordinator.create_booking(passenger_id, req).await?;
    Ok((StatusCode::CREATED, Json(booking)))
}

async fn list_bookings(
    State(state): State<AppState>,
    TypedHeader(bearer): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<Vec<Booking>>, AppError> {
    let passenger_id = auth::verify_bearer(&state.auth, &bearer)?;
    let bookings = state
        .bookings
        .list_bookings_for_passenger(passenger_id)
        .await?;
    Ok(Json(bookings))
}

async fn cancel_booking(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    TypedHeader(bearer): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<CancelSummary>, AppError> {
    let caller = auth::verify_bearer(&state.auth, &bearer)?;
    let summary = state.coordinator.cancel_booking(caller, id).await?;
    Ok(Json(summary))
}
